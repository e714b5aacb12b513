//! Overall gear ratios (gearbox * final drive) keyed by signed gear number.
//!
//! Gear -1 is reverse, 0 is neutral, 1..=n are the forward gears.

use crate::config::TransmissionConfig;

pub const REVERSE: i32 = -1;
pub const NEUTRAL: i32 = 0;
pub const FIRST: i32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct GearRatios {
    // index = gear - REVERSE
    ratios: Vec<f32>,
}

impl GearRatios {
    pub fn new(cfg: &TransmissionConfig) -> Self {
        let fin = cfg.final_ratio;
        let mut ratios = Vec::with_capacity(cfg.forward.len() + 2);
        ratios.push(-cfg.reverse * fin);
        ratios.push(0.0);
        ratios.extend(cfg.forward.iter().map(|r| r * fin));
        Self { ratios }
    }

    fn index(gear: i32) -> Option<usize> {
        usize::try_from(gear - REVERSE).ok()
    }

    /// Ratio for `gear`; gears outside the box behave as neutral.
    pub fn ratio(&self, gear: i32) -> f32 {
        Self::index(gear)
            .and_then(|i| self.ratios.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn top_gear(&self) -> i32 {
        (self.ratios.len() as i32) - 2
    }
}
