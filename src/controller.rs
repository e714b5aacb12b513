// ==============================================================================
// controller.rs - AUTOMATIC TRANSMISSION + PEDAL/STEER SMOOTHING
// ------------------------------------------------------------------------------
// Driver axes (all 0..1):
//   forward, back, left, right, handbrake
//
// Each tick:
//   1) gear selection, at most one shift per MIN_TIME_BETWEEN_SHIFTS
//      - in a forward gear: compare current wheel torque with the torque the
//        adjacent gears would give at the engine speed they would run at
//      - stationary + braking: select reverse
//      - in reverse: forward selects first gear, otherwise the pedals swap
//   2) first-order lag toward the (possibly swapped) targets
//   3) clutch opens while the smoothed handbrake is >= 0.5
// ==============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivetrain::{GearRatios, Powerband, FIRST, REVERSE};

pub const THROTTLE_RESPONSE: f32 = 8.0;
pub const BRAKE_RESPONSE: f32 = 5.0;
pub const HANDBRAKE_RESPONSE: f32 = 20.0;
pub const TURN_RESPONSE: f32 = 5.0;
pub const MIN_TIME_BETWEEN_SHIFTS: f32 = 0.2;   // s
const REVERSE_MAX_DIFF_SPEED: f32 = 1.0;        // rad/s

/// `value` moved toward `target` by the fraction `rate` (capped at 1).
#[inline]
pub fn pull_toward(value: f32, target: f32, rate: f32) -> f32 {
    value + (target - value) * rate.min(1.0)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputAxis {
    Forward,
    Back,
    Left,
    Right,
    Handbrake,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown input axis '{0}'")]
pub struct UnknownAxis(pub String);

impl FromStr for InputAxis {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "back" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "handbrake" => Ok(Self::Handbrake),
            other => Err(UnknownAxis(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInput {
    pub forward: f32,
    pub back: f32,
    pub left: f32,
    pub right: f32,
    pub handbrake: f32,
}

impl DriverInput {
    /// Sets one axis, clamped to [0, 1].
    pub fn set(&mut self, axis: InputAxis, value: f32) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        *self.axis_mut(axis) = value;
    }

    pub fn get(&self, axis: InputAxis) -> f32 {
        match axis {
            InputAxis::Forward => self.forward,
            InputAxis::Back => self.back,
            InputAxis::Left => self.left,
            InputAxis::Right => self.right,
            InputAxis::Handbrake => self.handbrake,
        }
    }

    fn axis_mut(&mut self, axis: InputAxis) -> &mut f32 {
        match axis {
            InputAxis::Forward => &mut self.forward,
            InputAxis::Back => &mut self.back,
            InputAxis::Left => &mut self.left,
            InputAxis::Right => &mut self.right,
            InputAxis::Handbrake => &mut self.handbrake,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerOutput {
    pub throttle: f32,
    pub clutch: bool,           // true = engaged
    pub gear: i32,              // -1 reverse, 0 neutral, 1.. forward
    pub brake: f32,
    pub handbrake: f32,
    pub desired_turn_pos: f32,  // -1..1, positive = left
}

impl Default for ControllerOutput {
    fn default() -> Self {
        Self {
            throttle: 0.0,
            clutch: true,
            gear: FIRST,
            brake: 0.0,
            handbrake: 0.0,
            desired_turn_pos: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutomaticController {
    pub input: DriverInput,
    pub output: ControllerOutput,
    shift_timer: f32,
}

impl AutomaticController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shift_timer(&self) -> f32 {
        self.shift_timer
    }

    pub fn tick(
        &mut self,
        dt: f32,
        engine_ang_vel: f32,
        differential_ang_vel: f32,
        powerband: &Powerband,
        ratios: &GearRatios,
    ) {
        let mut accel = self.input.forward;
        let mut brake = self.input.back;

        if self.shift_timer <= 0.0 {
            let out = &mut self.output;
            if out.clutch && out.gear >= FIRST {
                let current = out.gear;
                let current_ratio = ratios.ratio(current);
                let current_torque = powerband.torque_at(engine_ang_vel, current_ratio);
                let torque_in = |gear: i32| {
                    let ratio = ratios.ratio(gear);
                    powerband.torque_at(engine_ang_vel * ratio / current_ratio, ratio)
                };

                if current > FIRST && torque_in(current - 1) > current_torque {
                    self.shift_to(current - 1);
                } else if current < ratios.top_gear() && torque_in(current + 1) > current_torque {
                    self.shift_to(current + 1);
                } else if brake > 0.0 && differential_ang_vel < REVERSE_MAX_DIFF_SPEED {
                    self.shift_to(REVERSE);
                }
            } else if out.gear == REVERSE {
                if accel > 0.0 {
                    self.shift_to(FIRST);
                } else {
                    accel = brake;
                    brake = 0.0;
                }
            }
        } else {
            self.shift_timer -= dt;
        }

        let input = self.input;
        let out = &mut self.output;
        out.throttle = pull_toward(out.throttle, accel, dt * THROTTLE_RESPONSE);
        out.brake = pull_toward(out.brake, brake, dt * BRAKE_RESPONSE);
        out.handbrake = pull_toward(out.handbrake, input.handbrake, dt * HANDBRAKE_RESPONSE);
        out.desired_turn_pos =
            pull_toward(out.desired_turn_pos, input.left - input.right, dt * TURN_RESPONSE);

        out.clutch = out.handbrake < 0.5;
    }

    fn shift_to(&mut self, gear: i32) {
        self.output.gear = gear;
        self.shift_timer = MIN_TIME_BETWEEN_SHIFTS;
    }
}
