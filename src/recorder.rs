// ==============================================================================
// recorder.rs - RUN RECORDS (INPUT) AND STATE PLAYBACK (OUTPUT)
// ------------------------------------------------------------------------------
// RunRecord is what a client uploads:
//   { "keyMap":   { "<short key>": "<axis name>", ... },
//     "timeline": [ [durationTicks, { "<short key>": value, ... }], ... ] }
// Each segment changes only the axes it names, then holds all inputs for
// `durationTicks` ticks. Values are JSON numbers or numeric strings.
//
// Playback is what the server stores after verification: a snapshot of the
// session every `interval` observed ticks. The snapshot fields are listed
// explicitly and rounded to fixed precision; the schema carries a version.
// ==============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::controller::DriverInput;
use crate::session::Session;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub key_map: BTreeMap<String, String>,
    pub timeline: Vec<Segment>,
}

/// `[duration_ticks, {short_key: value}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment(pub u64, pub BTreeMap<String, InputValue>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    Text(String),
}

impl InputValue {
    pub fn as_f32(&self) -> Option<f32> {
        let value = match self {
            InputValue::Number(n) => *n as f32,
            InputValue::Text(s) => s.trim().parse::<f32>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl RunRecord {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Sum of all segment durations, saturating.
    pub fn total_ticks(&self) -> u64 {
        self.timeline.iter().fold(0u64, |acc, s| acc.saturating_add(s.0))
    }
}

#[inline]
fn round_to(value: f32, decimals: i32) -> f32 {
    let scale = 10f32.powi(decimals);
    (value * scale).round() / scale
}

fn round3(v: [f32; 3]) -> [f32; 3] {
    v.map(|c| round_to(c, 3))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    pub next_checkpoint: usize,
    pub pos: [f32; 3],
    pub ori: [f32; 4],              // x, y, z, w
    pub lin_vel: [f32; 3],
    pub ang_vel: [f32; 3],
    pub input: DriverInput,
    pub wheel_spin: Vec<f32>,
    pub engine_ang_vel: f32,
}

impl Snapshot {
    pub fn capture(session: &Session) -> Option<Self> {
        let body = session.body_state()?;
        let vehicle = session.vehicle();
        let q = body.ori.coords;
        Some(Self {
            tick: session.tick(),
            next_checkpoint: session.progress().next_checkpoint(),
            pos: round3(body.pos.coords.into()),
            ori: [q.x, q.y, q.z, q.w].map(|c| round_to(c, 3)),
            lin_vel: round3(body.lin_vel.into()),
            ang_vel: round3(body.ang_vel.into()),
            input: vehicle.controller.input,
            wheel_spin: vehicle.wheels().iter().map(|w| round_to(w.spin_vel, 1)).collect(),
            engine_ang_vel: round_to(vehicle.engine().ang_vel, 3),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    pub schema: u32,
    pub interval: u64,
    pub snapshots: Vec<Snapshot>,
}

/// Samples a session every `interval` observations.
#[derive(Debug)]
pub struct StateRecorder {
    interval: u64,
    observed: u64,
    snapshots: Vec<Snapshot>,
}

impl StateRecorder {
    pub fn new(interval: u64) -> Self {
        Self { interval: interval.max(1), observed: 0, snapshots: Vec::new() }
    }

    pub fn observe(&mut self, session: &Session) {
        if self.observed % self.interval == 0 {
            if let Some(snapshot) = Snapshot::capture(session) {
                self.snapshots.push(snapshot);
            }
        }
        self.observed += 1;
    }

    pub fn finish(self) -> Playback {
        Playback {
            schema: SNAPSHOT_SCHEMA_VERSION,
            interval: self.interval,
            snapshots: self.snapshots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn parses_mixed_value_types() {
        let json = r#"{
            "keyMap": { "f": "forward", "l": "left" },
            "timeline": [[10, { "f": 1 }], [5, { "f": "0.5", "l": "1" }], [3, {}]]
        }"#;
        let run = RunRecord::from_json(json).unwrap();
        assert_eq!(run.timeline.len(), 3);
        assert_eq!(run.total_ticks(), 18);
        assert_eq!(run.timeline[0].1["f"].as_f32(), Some(1.0));
        assert_eq!(run.timeline[1].1["f"].as_f32(), Some(0.5));
        assert!(run.timeline[2].1.is_empty());
    }

    #[test]
    fn non_numeric_text_is_rejected() {
        assert_eq!(InputValue::Text("fast".into()).as_f32(), None);
        assert_eq!(InputValue::Text("NaN".into()).as_f32(), None);
        assert_eq!(InputValue::Text(" 0.25 ".into()).as_f32(), Some(0.25));
    }

    #[test]
    fn total_ticks_saturates() {
        let run = RunRecord {
            key_map: BTreeMap::new(),
            timeline: vec![Segment(u64::MAX, BTreeMap::new()), Segment(5, BTreeMap::new())],
        };
        assert_eq!(run.total_ticks(), u64::MAX);
    }

    #[test]
    fn rounding_precision() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-7.26, 1), -7.3);
        assert_eq!(round3([0.0004, 2.0, -0.0006]), [0.0, 2.0, -0.001]);
    }

    #[test]
    fn snapshots_every_interval() {
        let mut session = Session::new(fixtures::car_model(), fixtures::flat_track(), 60.0);
        let mut recorder = StateRecorder::new(20);
        for _ in 0..45 {
            recorder.observe(&session);
            session.step();
        }
        let playback = recorder.finish();
        assert_eq!(playback.schema, SNAPSHOT_SCHEMA_VERSION);
        let ticks: Vec<u64> = playback.snapshots.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![0, 20, 40]);
        assert_eq!(playback.snapshots[0].wheel_spin.len(), 4);
    }

    #[test]
    fn snapshot_serializes_with_declared_keys() {
        let session = Session::new(fixtures::car_model(), fixtures::flat_track(), 60.0);
        let snapshot = Snapshot::capture(&session).unwrap();
        let value = serde_json::to_value(&snapshot).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["angVel", "engineAngVel", "input", "linVel", "nextCheckpoint", "ori", "pos", "tick", "wheelSpin"]
        );
        assert_eq!(snapshot.pos, [0.0, 0.55, 0.0]);
    }
}
