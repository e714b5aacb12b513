// ==============================================================================
// track.rs - TRACK DOCUMENT, CHECKPOINTS AND RUN PROGRESS
// ------------------------------------------------------------------------------
// A track is:
// - gravity + start pose (position, yaw about +Y)
// - countdown before the vehicle is released
// - ordered checkpoints (sphere: position + radius)
// - static collision surfaces (cuboids, balls), turned into colliders by
//   PhysicsWorld
//
// Progress walks the checkpoints strictly in order. At most one checkpoint is
// crossed per tick, and a checkpoint counts once the body origin lies within
// its radius.
// ==============================================================================

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{finite, non_negative, positive};
use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_CHECKPOINT_RADIUS: f32 = 5.0;

fn default_gravity() -> [f32; 3] {
    [0.0, -9.81, 0.0]
}

fn default_radius() -> f32 {
    DEFAULT_CHECKPOINT_RADIUS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfig {
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    pub start: StartConfig,
    #[serde(default)]
    pub countdown: f32,         // s
    pub checkpoints: Vec<CheckpointConfig>,
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConfig {
    pub pos: [f32; 3],
    #[serde(default)]
    pub yaw: f32,               // rad about +Y
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub pos: [f32; 3],
    #[serde(default = "default_radius")]
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SurfaceConfig {
    Cuboid {
        center: [f32; 3],
        #[serde(rename = "halfExtents")]
        half_extents: [f32; 3],
        /// Scaled rotation axis (axis * angle), radians.
        #[serde(default)]
        rotation: [f32; 3],
    },
    Ball {
        center: [f32; 3],
        radius: f32,
    },
}

impl TrackConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.checkpoints.is_empty() {
            return Err(ConfigError::NoCheckpoints);
        }
        non_negative("countdown", self.countdown)?;
        finite("gravity", self.gravity)?;
        finite("start.pos", self.start.pos)?;
        if !self.start.yaw.is_finite() {
            return Err(ConfigError::NotFinite { field: "start.yaw" });
        }
        for cp in &self.checkpoints {
            finite("checkpoint.pos", cp.pos)?;
            positive("checkpoint.radius", cp.radius)?;
        }
        for surface in &self.surfaces {
            match surface {
                SurfaceConfig::Cuboid { center, half_extents, rotation } => {
                    finite("surface.center", *center)?;
                    finite("surface.rotation", *rotation)?;
                    for &h in half_extents {
                        positive("surface.halfExtents", h)?;
                    }
                }
                SurfaceConfig::Ball { center, radius } => {
                    finite("surface.center", *center)?;
                    positive("surface.radius", *radius)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub pos: Point3<f32>,
    pub radius: f32,
}

impl Checkpoint {
    pub fn contains(&self, p: &Point3<f32>) -> bool {
        nalgebra::distance_squared(&self.pos, p) <= self.radius * self.radius
    }
}

/// Validated track, shared read-only between sessions.
#[derive(Debug, Clone)]
pub struct TrackModel {
    pub gravity: Vector3<f32>,
    pub start_pos: Point3<f32>,
    pub start_ori: UnitQuaternion<f32>,
    pub countdown: f32,
    pub checkpoints: Vec<Checkpoint>,
    pub surfaces: Vec<SurfaceConfig>,
}

impl TrackModel {
    pub fn new(cfg: &TrackConfig) -> ConfigResult<Self> {
        cfg.validate()?;
        Ok(Self {
            gravity: Vector3::from(cfg.gravity),
            start_pos: Point3::from(cfg.start.pos),
            start_ori: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), cfg.start.yaw),
            countdown: cfg.countdown,
            checkpoints: cfg
                .checkpoints
                .iter()
                .map(|c| Checkpoint { pos: Point3::from(c.pos), radius: c.radius })
                .collect(),
            surfaces: cfg.surfaces.clone(),
        })
    }

    /// First tick on which the vehicle is released.
    pub fn start_tick(&self, dt: f32) -> u64 {
        (self.countdown / dt).round() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    crossings: Vec<u64>,        // tick of each crossing, in checkpoint order
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_checkpoint(&self) -> usize {
        self.crossings.len()
    }

    pub fn crossed(&self) -> usize {
        self.crossings.len()
    }

    pub fn crossing_ticks(&self) -> &[u64] {
        &self.crossings
    }

    pub fn last_crossing_tick(&self) -> Option<u64> {
        self.crossings.last().copied()
    }

    pub fn is_finished(&self, track: &TrackModel) -> bool {
        self.crossings.len() >= track.checkpoints.len()
    }

    /// Records a crossing of the next checkpoint if `pos` is inside it.
    /// Returns the index crossed.
    pub fn update(&mut self, track: &TrackModel, pos: &Point3<f32>, tick: u64) -> Option<usize> {
        let index = self.next_checkpoint();
        let cp = track.checkpoints.get(index)?;
        if cp.contains(pos) {
            self.crossings.push(tick);
            Some(index)
        } else {
            None
        }
    }
}
