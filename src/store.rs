//! Run storage.
//!
//! `DirStore` lays documents out as `<root>/{cars,tracks,runs}/<id>.json`.
//! Saves go to a temp file in the same directory and are renamed into place,
//! so a failed save leaves the previous document untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::VehicleConfig;
use crate::error::{StorageError, VerifyError};
use crate::recorder::{Playback, RunRecord};
use crate::track::TrackConfig;
use crate::verify::{RunStatus, Verification, Verifier, VerifierSettings};

/// A submitted run and, once verified, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRun {
    pub car: String,
    pub track: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub time: Option<f32>,
    pub input: RunRecord,
    #[serde(default)]
    pub playback: Option<Playback>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl StoredRun {
    pub fn apply(&mut self, verification: Verification) {
        self.status = verification.status;
        self.time = verification.time;
        self.playback = verification.playback;
        self.failure = verification.failure;
    }
}

pub trait RunStore {
    fn load_car(&self, id: &str) -> Result<VehicleConfig, StorageError>;
    fn load_track(&self, id: &str) -> Result<TrackConfig, StorageError>;
    fn load_run(&self, id: &str) -> Result<StoredRun, StorageError>;
    fn save_run(&self, id: &str, run: &StoredRun) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{id}.json"))
    }

    fn load<T: DeserializeOwned>(&self, kind: &'static str, id: &str) -> Result<T, StorageError> {
        let path = self.path(kind, id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { kind, id: id.to_string() });
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| StorageError::Parse { path, source })
    }
}

impl RunStore for DirStore {
    fn load_car(&self, id: &str) -> Result<VehicleConfig, StorageError> {
        self.load("cars", id)
    }

    fn load_track(&self, id: &str) -> Result<TrackConfig, StorageError> {
        self.load("tracks", id)
    }

    fn load_run(&self, id: &str) -> Result<StoredRun, StorageError> {
        self.load("runs", id)
    }

    fn save_run(&self, id: &str, run: &StoredRun) -> Result<(), StorageError> {
        let path = self.path("runs", id);
        let tmp = path.with_extension("json.tmp");
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::Io { path, source }
        };

        let text = serde_json::to_string_pretty(run)
            .map_err(|source| StorageError::Parse { path: path.clone(), source })?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io(dir))?;
        }
        fs::write(&tmp, text).map_err(io(tmp.as_path()))?;
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::Io { path, source });
        }
        debug!(path = %path.display(), "run saved");
        Ok(())
    }
}

/// Loads a run with its car and track, verifies it and writes the outcome
/// back. A missing or unparsable car or track marks the run as Error. I/O
/// failures and failures on the run document itself are returned and nothing
/// is saved.
pub fn verify_stored_run(
    store: &dyn RunStore,
    run_id: &str,
    settings: &VerifierSettings,
) -> Result<StoredRun, VerifyError> {
    let mut run = store.load_run(run_id)?;
    let configs = store
        .load_car(&run.car)
        .and_then(|car| Ok((car, store.load_track(&run.track)?)));

    let verification = match configs {
        Ok((car, track)) => {
            info!(run = run_id, car = %run.car, track = %run.track, "verifying run");
            Verifier::new(settings.clone()).verify(&car, &track, &run.input)
        }
        Err(err @ (StorageError::NotFound { .. } | StorageError::Parse { .. })) => {
            warn!(run = run_id, error = %err, "car or track unusable");
            Verification::failed(&VerifyError::Storage(err))
        }
        Err(err) => return Err(err.into()),
    };
    run.apply(verification);
    store.save_run(run_id, &run)?;
    Ok(run)
}
