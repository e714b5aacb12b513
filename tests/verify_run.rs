//! End-to-end verification through the file store.

use std::fs;
use std::path::Path;

use tempfile::{tempdir, TempDir};

use rally_sim::{
    verify_stored_run, DirStore, RunRecord, RunStatus, RunStore, StorageError, TrackConfig,
    VehicleConfig, Verifier, VerifierSettings, VerifyError,
};

const CAR: &str = include_str!("fixtures/car.json");
const FLAT_TRACK: &str = include_str!("fixtures/flat_track.json");
const THROTTLE_RUN: &str = include_str!("fixtures/run_throttle.json");
const ABUSIVE_RUN: &str = include_str!("fixtures/run_abusive.json");

struct Store {
    dir: TempDir,
    store: DirStore,
}

impl Store {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        put(dir.path(), "cars", "hatch", CAR);
        put(dir.path(), "tracks", "flat", FLAT_TRACK);
        Self { store: DirStore::new(dir.path()), dir }
    }

    fn with_run(self, id: &str, text: &str) -> Self {
        put(self.dir.path(), "runs", id, text);
        self
    }
}

fn put(root: &Path, kind: &str, id: &str, text: &str) {
    let dir = root.join(kind);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{id}.json")), text).unwrap();
}

#[test]
fn stored_throttle_run_is_verified_and_saved() {
    let s = Store::new().with_run("r1", THROTTLE_RUN);
    let run = verify_stored_run(&s.store, "r1", &VerifierSettings::default()).unwrap();

    assert_eq!(run.status, RunStatus::Verified, "{:?}", run.failure);
    let time = run.time.unwrap();
    // 30 idle ticks before the throttle opens
    assert!(time > 0.5 && time < 20.0, "time {time}");

    let saved = s.store.load_run("r1").unwrap();
    let playback = saved.playback.unwrap();
    assert_eq!(playback.schema, 1);
    assert_eq!(playback.interval, 20);
    assert_eq!(playback.snapshots.len(), 1230 / 20 + 1);
    assert_eq!(playback.snapshots.last().unwrap().next_checkpoint, 2);
}

#[test]
fn abusive_run_is_marked_error_without_playback() {
    let s = Store::new().with_run("r2", ABUSIVE_RUN);
    let run = verify_stored_run(&s.store, "r2", &VerifierSettings::default()).unwrap();

    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.time, None);
    assert!(run.playback.is_none());
    assert!(run.failure.unwrap().contains("200050"));
}

#[test]
fn lower_ceiling_from_settings_applies() {
    let s = Store::new().with_run("r3", THROTTLE_RUN);
    let settings = VerifierSettings::from_json(r#"{ "maxTicks": 1000 }"#).unwrap();
    let run = verify_stored_run(&s.store, "r3", &settings).unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert!(run.failure.unwrap().contains("limit is 1000"));
}

#[test]
fn missing_run_is_a_storage_error() {
    let s = Store::new();
    let err = verify_stored_run(&s.store, "ghost", &VerifierSettings::default()).unwrap_err();
    assert!(matches!(err, VerifyError::Storage(StorageError::NotFound { kind: "runs", .. })));
}

#[test]
fn invalid_car_marks_the_run_as_error() {
    let mut car: serde_json::Value = serde_json::from_str(CAR).unwrap();
    car["mass"] = serde_json::json!(-5.0);
    let s = Store::new().with_run("r4", THROTTLE_RUN);
    put(s.dir.path(), "cars", "hatch", &car.to_string());

    let run = verify_stored_run(&s.store, "r4", &VerifierSettings::default()).unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert!(run.failure.unwrap().contains("mass"));
}

#[test]
fn replays_are_reproducible() {
    let car = VehicleConfig::from_json(CAR).unwrap();
    let track = TrackConfig::from_json(FLAT_TRACK).unwrap();
    let stored: serde_json::Value = serde_json::from_str(THROTTLE_RUN).unwrap();
    let record: RunRecord = serde_json::from_value(stored["input"].clone()).unwrap();

    let verifier = Verifier::new(VerifierSettings::default());
    let a = verifier.verify(&car, &track, &record);
    let b = verifier.verify(&car, &track, &record);
    assert_eq!(a, b);
    assert_eq!(a.status, RunStatus::Verified);
}
