//! Deterministic rally-car simulation and server-side run verification.
//!
//! A recorded run (sparse input diffs per tick) is replayed against a car and
//! track on a fixed timestep; the run is verified when every checkpoint is
//! crossed in order.

pub mod config;
pub mod contact;
pub mod controller;
pub mod drivetrain;
pub mod error;
pub mod model;
pub mod physics;
pub mod recorder;
pub mod session;
pub mod store;
pub mod track;
pub mod vehicle;
pub mod verify;
pub mod wheel;

#[cfg(test)]
mod fixtures;

pub use config::VehicleConfig;
pub use error::{ConfigError, StorageError, VerifyError};
pub use recorder::{Playback, RunRecord};
pub use session::Session;
pub use store::{verify_stored_run, DirStore, RunStore, StoredRun};
pub use track::TrackConfig;
pub use verify::{RunStatus, Verification, Verifier, VerifierSettings};
