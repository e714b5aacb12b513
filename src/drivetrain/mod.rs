//! drivetrain - engine power curve, gear table, rev limiter and differential

pub mod powerband;
pub mod gearbox;
pub mod engine;
pub mod differential;

pub use powerband::{rpm_to_radps, Powerband};
pub use gearbox::{GearRatios, FIRST, NEUTRAL, REVERSE};
pub use engine::{Engine, RevState};
pub use differential::{differential_ang_vel, wheel_drive_torque};
