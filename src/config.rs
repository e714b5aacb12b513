// ==============================================================================
// config.rs - PERSISTED VEHICLE CONFIGURATION (JSON)
// ------------------------------------------------------------------------------
// Mirrors the stored car document field-for-field (camelCase on disk):
// - chassis: mass, dimensions, center offset, clip points + clip edges
// - wheels: local position, radius, drive/brake/handbrake/turn coefficients
// - engine: powerband breakpoints, redline, flywheel, powerscale
// - transmission: forward ratios, reverse ratio, final drive
// - recover: flip recovery offset + timing
// - tuning: contact/suspension constants (optional, defaults below)
//
// VehicleConfig is a plain value. It is validated once and then turned into a
// VehicleModel (model.rs); nothing here is mutated after load.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleConfig {
    pub mass: f32,              // kg
    pub dimensions: [f32; 3],   // full extents, meters
    #[serde(default)]
    pub center: [f32; 3],       // subtracted from every clip/wheel position
    #[serde(default)]
    pub clips: Vec<ClipConfig>,
    #[serde(default)]
    pub clip_edges: Vec<[usize; 2]>,
    pub wheels: Vec<WheelConfig>,
    pub engine: EngineConfig,
    pub transmission: TransmissionConfig,
    pub recover: RecoverConfig,
    #[serde(default)]
    pub tuning: Tuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    pub pos: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    pub pos: [f32; 3],          // chassis local, before centering
    pub radius: f32,            // meters
    #[serde(default)]
    pub drive: f32,             // share of differential torque, 0..1
    #[serde(default)]
    pub brake: f32,             // 0..1
    #[serde(default)]
    pub handbrake: f32,         // 0..1
    #[serde(default)]
    pub turn: f32,              // steering authority, 0..1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerbandPoint {
    pub rpm: f32,
    pub power: f32,             // relative power, scaled by powerscale (kW)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub powerband: Vec<PowerbandPoint>,
    pub redline: f32,           // rpm
    pub flywheel: f32,          // inertia divisor when declutched
    pub powerscale: f32,        // kW
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionConfig {
    pub forward: Vec<f32>,
    pub reverse: f32,
    #[serde(rename = "final")]
    pub final_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverConfig {
    pub pos_offset: [f32; 3],   // meters, world space
    pub trigger_time: f32,      // s upside down before recovery starts
    pub release_time: f32,      // s (same timer) before control returns
}

/// Coulomb-style friction clamp for one family of contacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrictionModel {
    pub scale: f32,             // N per m/s of tangential slip
    pub static_coeff: f32,
    pub dynamic_coeff: f32,
}

/// Contact and suspension constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tuning {
    pub clip_constant: f32,     // N/m, chassis + bottomed-out wheel spring
    pub clip_damping: f32,      // N*s/m
    pub susp_constant: f32,     // N/m
    pub susp_damping: f32,      // 1/s, semi-implicit
    pub susp_max: f32,          // m of travel before hard clipping
    pub wheel_mass: f32,        // kg, unsprung
    pub brake_rate: f32,        // rad/s^2 of spin removed at brake coefficient 1
    pub chassis_friction: FrictionModel,
    pub wheel_friction: FrictionModel,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            clip_constant: 200_000.0,
            clip_damping: 8_000.0,
            susp_constant: 70_000.0,
            susp_damping: 50.0,
            susp_max: 0.13,
            wheel_mass: 15.0,
            brake_rate: 100.0,
            chassis_friction: FrictionModel {
                scale: 10_000.0,
                static_coeff: 1.2 * 0.9,
                dynamic_coeff: 0.9 * 0.9,
            },
            wheel_friction: FrictionModel {
                scale: 3_000.0,
                static_coeff: 1.2 * 1.2,
                dynamic_coeff: 0.9 * 1.2,
            },
        }
    }
}

pub(crate) fn positive(field: &'static str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f32) -> ConfigResult<()> {
    if !value.is_finite() {
        Err(ConfigError::NotFinite { field })
    } else if value < 0.0 {
        Err(ConfigError::Negative { field, value })
    } else {
        Ok(())
    }
}

pub(crate) fn finite(field: &'static str, v: [f32; 3]) -> ConfigResult<()> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field })
    }
}

fn unit(field: &'static str, value: f32) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { field, value })
    }
}

impl VehicleConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Sum of the per-wheel drive coefficients.
    pub fn total_drive(&self) -> f32 {
        self.wheels.iter().map(|w| w.drive).sum()
    }

    /// Checks every invariant the simulation divides by or indexes with.
    pub fn validate(&self) -> ConfigResult<()> {
        positive("mass", self.mass)?;
        for d in self.dimensions {
            positive("dimensions", d)?;
        }
        finite("center", self.center)?;
        for clip in &self.clips {
            finite("clip.pos", clip.pos)?;
        }

        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        for wheel in &self.wheels {
            finite("wheel.pos", wheel.pos)?;
            positive("wheel.radius", wheel.radius)?;
            unit("wheel.drive", wheel.drive)?;
            unit("wheel.brake", wheel.brake)?;
            unit("wheel.handbrake", wheel.handbrake)?;
            unit("wheel.turn", wheel.turn)?;
        }
        if self.total_drive() <= 0.0 {
            return Err(ConfigError::NoDrivenWheels);
        }

        for (edge, pair) in self.clip_edges.iter().enumerate() {
            for &clip in pair {
                if clip >= self.clips.len() {
                    return Err(ConfigError::ClipEdgeOutOfRange {
                        edge,
                        clip,
                        count: self.clips.len(),
                    });
                }
            }
        }

        self.engine.validate()?;
        self.transmission.validate()?;

        let recover = &self.recover;
        finite("recover.posOffset", recover.pos_offset)?;
        non_negative("recover.triggerTime", recover.trigger_time)?;
        non_negative("recover.releaseTime", recover.release_time)?;
        if recover.release_time <= recover.trigger_time {
            return Err(ConfigError::RecoverWindow {
                trigger: recover.trigger_time,
                release: recover.release_time,
            });
        }

        self.tuning.validate()
    }
}

impl Tuning {
    fn validate(&self) -> ConfigResult<()> {
        non_negative("tuning.clipConstant", self.clip_constant)?;
        non_negative("tuning.clipDamping", self.clip_damping)?;
        non_negative("tuning.suspConstant", self.susp_constant)?;
        non_negative("tuning.suspDamping", self.susp_damping)?;
        non_negative("tuning.brakeRate", self.brake_rate)?;
        positive("tuning.suspMax", self.susp_max)?;
        positive("tuning.wheelMass", self.wheel_mass)?;
        self.chassis_friction.validate("tuning.chassisFriction")?;
        self.wheel_friction.validate("tuning.wheelFriction")
    }
}

impl FrictionModel {
    fn validate(&self, field: &'static str) -> ConfigResult<()> {
        non_negative(field, self.scale)?;
        non_negative(field, self.static_coeff)?;
        non_negative(field, self.dynamic_coeff)
    }
}

impl EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        let Some(first) = self.powerband.first() else {
            return Err(ConfigError::EmptyPowerband);
        };
        positive("powerband.rpm", first.rpm)?;

        let mut last_rpm = 0.0;
        for (index, point) in self.powerband.iter().enumerate() {
            positive("powerband.rpm", point.rpm)?;
            if point.rpm <= last_rpm {
                return Err(ConfigError::PowerbandOrder { index, rpm: point.rpm });
            }
            non_negative("powerband.power", point.power)?;
            last_rpm = point.rpm;
        }

        positive("engine.redline", self.redline)?;
        if self.redline <= first.rpm {
            return Err(ConfigError::RedlineBelowIdle { redline: self.redline, idle: first.rpm });
        }
        positive("engine.flywheel", self.flywheel)?;
        positive("engine.powerscale", self.powerscale)
    }
}

impl TransmissionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.forward.is_empty() {
            return Err(ConfigError::NoForwardGears);
        }
        for &ratio in &self.forward {
            positive("transmission.forward", ratio)?;
        }
        positive("transmission.reverse", self.reverse)?;
        positive("transmission.final", self.final_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn parses_stored_car_document() {
        let cfg = fixtures::car_config();
        assert_eq!(cfg.wheels.len(), 4);
        assert_eq!(cfg.clip_edges.len(), 12);
        assert_eq!(cfg.transmission.forward.len(), 5);
        assert_eq!(cfg.tuning, Tuning::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn optional_wheel_coefficients_default_to_zero() {
        let json = r#"{ "pos": [0, 0, 0], "radius": 0.3 }"#;
        let wheel: WheelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(wheel.drive, 0.0);
        assert_eq!(wheel.turn, 0.0);
    }

    #[test]
    fn rejects_zero_total_drive() {
        let mut cfg = fixtures::car_config();
        for wheel in &mut cfg.wheels {
            wheel.drive = 0.0;
        }
        assert_eq!(cfg.validate(), Err(ConfigError::NoDrivenWheels));
    }

    #[test]
    fn rejects_unordered_powerband() {
        let mut cfg = fixtures::car_config();
        cfg.engine.powerband[2].rpm = cfg.engine.powerband[1].rpm;
        assert!(matches!(cfg.validate(), Err(ConfigError::PowerbandOrder { index: 2, .. })));
    }

    #[test]
    fn rejects_dangling_clip_edge() {
        let mut cfg = fixtures::car_config();
        cfg.clip_edges.push([0, 99]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ClipEdgeOutOfRange { clip: 99, .. })
        ));
    }

    #[test]
    fn rejects_release_before_trigger() {
        let mut cfg = fixtures::car_config();
        cfg.recover.release_time = cfg.recover.trigger_time;
        assert!(matches!(cfg.validate(), Err(ConfigError::RecoverWindow { .. })));
    }

    #[test]
    fn rejects_redline_at_idle() {
        let mut cfg = fixtures::car_config();
        cfg.engine.redline = cfg.engine.powerband[0].rpm;
        assert!(matches!(cfg.validate(), Err(ConfigError::RedlineBelowIdle { .. })));
    }

    #[test]
    fn rejects_non_finite_positions() {
        let mut cfg = fixtures::car_config();
        cfg.center[1] = f32::NAN;
        assert_eq!(cfg.validate(), Err(ConfigError::NotFinite { field: "center" }));

        let mut cfg = fixtures::car_config();
        cfg.wheels[2].pos[0] = f32::INFINITY;
        assert_eq!(cfg.validate(), Err(ConfigError::NotFinite { field: "wheel.pos" }));

        let mut cfg = fixtures::car_config();
        cfg.clips[0].pos[2] = f32::NAN;
        assert_eq!(cfg.validate(), Err(ConfigError::NotFinite { field: "clip.pos" }));

        let mut cfg = fixtures::car_config();
        cfg.recover.pos_offset[1] = f32::NAN;
        assert_eq!(cfg.validate(), Err(ConfigError::NotFinite { field: "recover.posOffset" }));
    }

    #[test]
    fn rejects_negative_tuning() {
        let dt = 1.0 / 60.0;
        let mut cfg = fixtures::car_config();
        cfg.tuning.susp_damping = -1.0 / dt;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { field: "tuning.suspDamping", .. })
        ));

        let mut cfg = fixtures::car_config();
        cfg.tuning.clip_constant = -1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { field: "tuning.clipConstant", .. })
        ));

        let mut cfg = fixtures::car_config();
        cfg.tuning.brake_rate = -100.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { field: "tuning.brakeRate", .. })
        ));
    }

    #[test]
    fn rejects_bad_friction_model() {
        let mut cfg = fixtures::car_config();
        cfg.tuning.wheel_friction.static_coeff = f32::NAN;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NotFinite { field: "tuning.wheelFriction" })
        );

        let mut cfg = fixtures::car_config();
        cfg.tuning.chassis_friction.scale = -1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Negative { field: "tuning.chassisFriction", .. })
        ));
    }

    #[test]
    fn rejects_infinite_engine_figures() {
        let mut cfg = fixtures::car_config();
        cfg.engine.redline = f32::INFINITY;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotPositive { field: "engine.redline", .. })
        ));

        let mut cfg = fixtures::car_config();
        let last = cfg.engine.powerband.len() - 1;
        cfg.engine.powerband[last].power = f32::INFINITY;
        assert_eq!(cfg.validate(), Err(ConfigError::NotFinite { field: "powerband.power" }));
    }

    #[test]
    fn rejects_coefficient_outside_unit_range() {
        let mut cfg = fixtures::car_config();
        cfg.wheels[0].turn = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfUnitRange { field: "wheel.turn", .. })
        ));
    }
}
