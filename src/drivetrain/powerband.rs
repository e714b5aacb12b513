//! Engine power curve: piecewise-linear power over angular velocity.

use std::f32::consts::TAU;

use crate::config::PowerbandPoint;
use crate::error::{ConfigError, ConfigResult};

#[inline]
pub fn rpm_to_radps(rpm: f32) -> f32 {
    rpm * TAU / 60.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    radps: f32,
    power: f32,
}

/// Breakpoints converted to rad/s, strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Powerband {
    points: Vec<Breakpoint>,
}

impl Powerband {
    pub fn new(points: &[PowerbandPoint]) -> ConfigResult<Self> {
        if points.is_empty() {
            return Err(ConfigError::EmptyPowerband);
        }
        let mut out: Vec<Breakpoint> = Vec::with_capacity(points.len());
        for (index, p) in points.iter().enumerate() {
            let radps = rpm_to_radps(p.rpm);
            let increasing = out.last().map_or(radps > 0.0, |last| radps > last.radps);
            if !increasing {
                return Err(ConfigError::PowerbandOrder { index, rpm: p.rpm });
            }
            out.push(Breakpoint { radps, power: p.power });
        }
        Ok(Self { points: out })
    }

    /// Angular velocity of the first breakpoint; the engine never turns slower.
    pub fn idle(&self) -> f32 {
        self.points[0].radps
    }

    /// Power at `ang_vel` (rad/s): zero at or below standstill, a linear ramp up
    /// to the first breakpoint, interpolated between breakpoints and held flat
    /// past the last one.
    pub fn power_at(&self, ang_vel: f32) -> f32 {
        if ang_vel <= 0.0 {
            return 0.0;
        }
        let first = self.points[0];
        if ang_vel <= first.radps {
            return first.power * ang_vel / first.radps;
        }
        for pair in self.points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if ang_vel <= hi.radps {
                let x = (ang_vel - lo.radps) / (hi.radps - lo.radps);
                return lo.power + (hi.power - lo.power) * x;
            }
        }
        self.points[self.points.len() - 1].power
    }

    /// Torque delivered at the wheels' side of `ratio` when the engine turns at
    /// `ang_vel`. Used to compare candidate gears.
    pub fn torque_at(&self, ang_vel: f32, ratio: f32) -> f32 {
        self.power_at(ang_vel) * ratio / ang_vel
    }
}
