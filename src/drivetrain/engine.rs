// ==============================================================================
// engine.rs - ENGINE SPEED, REV LIMITER AND TORQUE
// ------------------------------------------------------------------------------
// Engine speed is either locked to the differential through the selected gear
// (clutch engaged, ratio != 0) or free-running on its flywheel. It never drops
// below idle.
//
// Rev limiter:
//   Normal    --(ang_vel > redline)----------> Overspeed   (throttle cut)
//   Overspeed --(ang_vel <= 0.98 * redline)--> Normal
// While in Overspeed the throttle is cut on every tick.
//
// Throttle is remapped to an "extended" range [-1, 1]: the lower half of the
// pedal is engine braking, the upper half drives the power curve.
// ==============================================================================

use crate::drivetrain::powerband::{rpm_to_radps, Powerband};

pub const ENGINE_BRAKE_REGION: f32 = 0.5;
pub const ENGINE_BRAKE_TORQUE: f32 = 0.1;
pub const REDLINE_RECOVER_FRACTION: f32 = 0.98;
/// Scales free-running torque into flywheel acceleration.
pub const FLYWHEEL_GAIN: f32 = 50_000.0;
const SMOOTHING_RATE: f32 = 20.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RevState {
    #[default]
    Normal,
    Overspeed,
}

pub fn update_rev_state(prev: RevState, ang_vel: f32, redline: f32, recover: f32) -> RevState {
    match prev {
        RevState::Normal if ang_vel > redline => RevState::Overspeed,
        RevState::Overspeed if ang_vel <= recover => RevState::Normal,
        state => state,
    }
}

/// Maps pedal position [0, 1] to [-1, 1] with the engine-braking region below
/// zero.
pub fn extended_throttle(throttle: f32) -> f32 {
    let t = throttle - ENGINE_BRAKE_REGION;
    if t >= 0.0 {
        t / (1.0 - ENGINE_BRAKE_REGION)
    } else {
        t / ENGINE_BRAKE_REGION
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub ang_vel: f32,           // rad/s
    pub ang_vel_smoothed: f32,  // rad/s, display only
    pub rev_state: RevState,
    idle: f32,
    redline: f32,
    recover: f32,
    power_scale: f32,           // W per powerband unit
    flywheel: f32,
}

impl Engine {
    pub fn new(idle: f32, redline_rpm: f32, powerscale_kw: f32, flywheel: f32) -> Self {
        let redline = rpm_to_radps(redline_rpm);
        Self {
            ang_vel: idle,
            ang_vel_smoothed: idle,
            rev_state: RevState::Normal,
            idle,
            redline,
            recover: redline * REDLINE_RECOVER_FRACTION,
            power_scale: powerscale_kw * 1000.0,
            flywheel,
        }
    }

    pub fn idle(&self) -> f32 {
        self.idle
    }

    pub fn redline(&self) -> f32 {
        self.redline
    }

    pub fn is_overspeed(&self) -> bool {
        self.rev_state == RevState::Overspeed
    }

    /// Locks the engine to the differential when a gear is engaged, then
    /// applies the idle floor.
    pub fn couple(&mut self, differential_ang_vel: f32, gear_ratio: f32, clutch: bool) {
        if gear_ratio != 0.0 && clutch {
            self.ang_vel = differential_ang_vel * gear_ratio;
        }
        self.floor_at_idle();
    }

    /// Runs the rev limiter. Returns true when the throttle must be cut this
    /// tick.
    pub fn limit_revs(&mut self) -> bool {
        self.rev_state = update_rev_state(self.rev_state, self.ang_vel, self.redline, self.recover);
        self.is_overspeed()
    }

    /// Crankshaft torque for the given pedal position.
    pub fn torque(&self, throttle: f32, powerband: &Powerband) -> f32 {
        let ext = extended_throttle(throttle);
        if ext >= 0.0 {
            let power = ext * self.power_scale * powerband.power_at(self.ang_vel);
            power / self.ang_vel
        } else {
            ENGINE_BRAKE_TORQUE * ext * (self.ang_vel - self.idle)
        }
    }

    /// Declutched: torque spins the flywheel instead of the wheels.
    pub fn spin_free(&mut self, torque: f32, dt: f32) {
        self.ang_vel += FLYWHEEL_GAIN * torque * dt / self.flywheel;
        self.floor_at_idle();
    }

    pub fn smooth(&mut self, dt: f32) {
        self.ang_vel_smoothed += (self.ang_vel - self.ang_vel_smoothed) * (SMOOTHING_RATE * dt).min(1.0);
    }

    fn floor_at_idle(&mut self) {
        if self.ang_vel < self.idle {
            self.ang_vel = self.idle;
        }
    }
}
