//! Viscous limited-slip differential.
//!
//! Driven wheels share the differential torque by their drive coefficient.
//! Each wheel spinning faster than the drive-weighted average loses torque in
//! proportion to its slip, which bleeds torque over to the slower wheels.

pub const LSD_VISCOUS_CONSTANT: f32 = 400.0;

/// Drive-weighted average of wheel spin rates.
pub fn differential_ang_vel<I>(wheels: I, total_drive: f32) -> f32
where
    I: IntoIterator<Item = (f32, f32)>, // (spin_vel, drive)
{
    let sum: f32 = wheels.into_iter().map(|(spin, drive)| spin * drive).sum();
    sum / total_drive
}

/// Torque fed to one wheel: its share of the differential torque minus the
/// viscous coupling term.
pub fn wheel_drive_torque(per_wheel_torque: f32, spin_vel: f32, differential: f32, drive: f32) -> f32 {
    let slip = spin_vel - differential;
    (per_wheel_torque - slip * LSD_VISCOUS_CONSTANT) * drive
}
