//! Error types for configuration loading, run storage and verification.

use std::path::PathBuf;
use thiserror::Error;

/// A vehicle or track configuration that cannot be simulated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f32 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f32 },

    #[error("{field} must be finite")]
    NotFinite { field: &'static str },

    #[error("{field} must lie in [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f32 },

    #[error("powerband is empty")]
    EmptyPowerband,

    #[error("powerband rpm must be strictly increasing (breakpoint {index}: {rpm} rpm)")]
    PowerbandOrder { index: usize, rpm: f32 },

    #[error("redline {redline} rpm must exceed idle {idle} rpm")]
    RedlineBelowIdle { redline: f32, idle: f32 },

    #[error("transmission has no forward gears")]
    NoForwardGears,

    #[error("vehicle has no wheels")]
    NoWheels,

    #[error("total drive coefficient is zero; at least one wheel must be driven")]
    NoDrivenWheels,

    #[error("clip edge {edge} references clip {clip}, but only {count} clips exist")]
    ClipEdgeOutOfRange { edge: usize, clip: usize, count: usize },

    #[error("recover.releaseTime ({release}) must exceed recover.triggerTime ({trigger})")]
    RecoverWindow { trigger: f32, release: f32 },

    #[error("track has no checkpoints")]
    NoCheckpoints,
}

/// Failure to load or persist a stored document.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a run could not be verified.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("replay requested {requested} ticks, limit is {limit}")]
    AbuseLimitExceeded { requested: u64, limit: u64 },

    #[error("run crossed {crossed} of {expected} checkpoints")]
    IncompleteRun { crossed: usize, expected: usize },

    #[error("malformed run record: {0}")]
    MalformedRecord(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
