// ==============================================================================
// verify.rs - SERVER-SIDE REPLAY OF A RECORDED RUN
// ------------------------------------------------------------------------------
// replay():
//   - settings checked, timeline total checked against max_ticks up front
//   - fresh Session for the car + track, fresh StateRecorder
//   - per segment: target += duration, apply deltas
//   - per tick up to target: write input, observe, step
// Classification: every checkpoint crossed -> Verified, time measured from the
// countdown start tick to the last crossing. Anything else -> Error.
// ==============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{positive, VehicleConfig};
use crate::controller::{DriverInput, InputAxis};
use crate::error::{ConfigError, ConfigResult, VerifyError};
use crate::model::VehicleModel;
use crate::recorder::{Playback, RunRecord, StateRecorder};
use crate::session::Session;
use crate::track::{Progress, TrackConfig, TrackModel};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[default]
    Unverified,
    Verified,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifierSettings {
    pub tick_rate: f32,
    pub max_ticks: u64,
    pub observe_interval: u64,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self { tick_rate: 60.0, max_ticks: 100_000, observe_interval: 20 }
    }
}

impl VerifierSettings {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        positive("tickRate", self.tick_rate)?;
        if self.max_ticks == 0 {
            return Err(ConfigError::NotPositive { field: "maxTicks", value: 0.0 });
        }
        if self.observe_interval == 0 {
            return Err(ConfigError::NotPositive { field: "observeInterval", value: 0.0 });
        }
        Ok(())
    }
}

/// Outcome of a finished replay, before classification.
#[derive(Debug, Clone)]
pub struct Replay {
    pub ticks: u64,
    pub start_tick: u64,
    pub dt: f32,
    pub progress: Progress,
    pub finished: bool,
    pub expected: usize,
    pub playback: Playback,
}

impl Replay {
    /// Seconds from the start tick to the last checkpoint crossing.
    pub fn classify(&self) -> Result<f32, VerifyError> {
        if !self.finished {
            return Err(VerifyError::IncompleteRun {
                crossed: self.progress.crossed(),
                expected: self.expected,
            });
        }
        let last = self.progress.last_crossing_tick().unwrap_or(self.start_tick);
        Ok(last.saturating_sub(self.start_tick) as f32 * self.dt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub status: RunStatus,
    pub time: Option<f32>,
    pub checkpoints: usize,
    pub ticks: u64,
    pub playback: Option<Playback>,
    pub failure: Option<String>,
}

impl Verification {
    pub(crate) fn failed(err: &VerifyError) -> Self {
        Self {
            status: RunStatus::Error,
            time: None,
            checkpoints: 0,
            ticks: 0,
            playback: None,
            failure: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Verifier {
    settings: VerifierSettings,
}

impl Verifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// Short key -> axis, resolved once before any tick runs.
    fn resolve_keys(run: &RunRecord) -> Result<BTreeMap<&str, InputAxis>, VerifyError> {
        run.key_map
            .iter()
            .map(|(key, name)| {
                name.parse::<InputAxis>()
                    .map(|axis| (key.as_str(), axis))
                    .map_err(|e| VerifyError::MalformedRecord(format!("key '{key}': {e}")))
            })
            .collect()
    }

    pub fn replay(
        &self,
        model: Arc<VehicleModel>,
        track: Arc<TrackModel>,
        run: &RunRecord,
    ) -> Result<Replay, VerifyError> {
        self.settings.validate()?;
        let keys = Self::resolve_keys(run)?;

        let limit = self.settings.max_ticks;
        let requested = run.total_ticks();
        if requested > limit {
            warn!(requested, limit, "tick ceiling exceeded");
            return Err(VerifyError::AbuseLimitExceeded { requested, limit });
        }

        let mut session = Session::new(model, track, self.settings.tick_rate);
        let mut recorder = StateRecorder::new(self.settings.observe_interval);
        let mut input = DriverInput::default();
        let mut target: u64 = 0;

        for (index, segment) in run.timeline.iter().enumerate() {
            target = target.saturating_add(segment.0);

            for (key, value) in &segment.1 {
                let axis = keys.get(key.as_str()).copied().ok_or_else(|| {
                    VerifyError::MalformedRecord(format!("segment {index}: unmapped key '{key}'"))
                })?;
                let value = value.as_f32().ok_or_else(|| {
                    VerifyError::MalformedRecord(format!("segment {index}: non-numeric value for '{key}'"))
                })?;
                input.set(axis, value);
            }

            while session.tick() < target {
                session.set_input(input);
                recorder.observe(&session);
                session.step();
            }
        }

        debug!(ticks = session.tick(), crossed = session.progress().crossed(), "replay finished");

        Ok(Replay {
            ticks: session.tick(),
            start_tick: session.start_tick(),
            dt: session.dt(),
            progress: session.progress().clone(),
            finished: session.progress().is_finished(session.track()),
            expected: session.track().checkpoints.len(),
            playback: recorder.finish(),
        })
    }

    /// Builds both models, replays and classifies. Never panics on bad input:
    /// every failure becomes an `Error` verification with a reason.
    pub fn verify(&self, car: &VehicleConfig, track: &TrackConfig, run: &RunRecord) -> Verification {
        let replay = VehicleModel::new(car)
            .and_then(|m| Ok((m, TrackModel::new(track)?)))
            .map_err(VerifyError::from)
            .and_then(|(model, track)| self.replay(Arc::new(model), Arc::new(track), run));

        let replay = match replay {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "run rejected");
                return Verification::failed(&err);
            }
        };

        let (status, time, failure) = match replay.classify() {
            Ok(time) => {
                info!(time, ticks = replay.ticks, "run verified");
                (RunStatus::Verified, Some(time), None)
            }
            Err(err) => {
                info!(error = %err, ticks = replay.ticks, "run not verified");
                (RunStatus::Error, None, Some(err.to_string()))
            }
        };

        Verification {
            status,
            time,
            checkpoints: replay.progress.crossed(),
            ticks: replay.ticks,
            playback: Some(replay.playback),
            failure,
        }
    }
}
