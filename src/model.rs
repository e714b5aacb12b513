// ==============================================================================
// model.rs - IMMUTABLE, SIMULATION-READY VEHICLE MODEL
// ------------------------------------------------------------------------------
// Built once from a validated VehicleConfig and shared (Arc) between every
// Vehicle instance that drives it:
// - clip and wheel positions with the chassis center already subtracted
// - powerband converted to rad/s
// - signed gear -> overall ratio table
// - chassis half extents (mass box)
//
// Per-run state (spin, ride position, engine speed, gear...) lives in the
// Vehicle, never here.
// ==============================================================================

use nalgebra::{Point3, Vector3};

use crate::config::{RecoverConfig, Tuning, VehicleConfig};
use crate::drivetrain::{Engine, GearRatios, Powerband};
use crate::error::ConfigResult;

#[derive(Debug, Clone)]
pub struct WheelModel {
    pub pos: Point3<f32>,       // chassis local, centered
    pub radius: f32,
    pub drive: f32,
    pub brake: f32,
    pub handbrake: f32,
    pub turn: f32,
}

#[derive(Debug, Clone)]
pub struct VehicleModel {
    pub mass: f32,
    pub half_extents: Vector3<f32>,
    pub clips: Vec<Point3<f32>>,
    pub clip_edges: Vec<[usize; 2]>,
    pub wheels: Vec<WheelModel>,
    pub powerband: Powerband,
    pub ratios: GearRatios,
    pub total_drive: f32,
    pub redline: f32,           // rpm
    pub flywheel: f32,
    pub powerscale: f32,        // kW
    pub recover: RecoverConfig,
    pub tuning: Tuning,
}

impl VehicleModel {
    pub fn new(cfg: &VehicleConfig) -> ConfigResult<Self> {
        cfg.validate()?;

        let center = Vector3::from(cfg.center);
        let local = |pos: [f32; 3]| Point3::from(pos) - center;

        let wheels = cfg
            .wheels
            .iter()
            .map(|w| WheelModel {
                pos: local(w.pos),
                radius: w.radius,
                drive: w.drive,
                brake: w.brake,
                handbrake: w.handbrake,
                turn: w.turn,
            })
            .collect();

        Ok(Self {
            mass: cfg.mass,
            half_extents: Vector3::from(cfg.dimensions) * 0.5,
            clips: cfg.clips.iter().map(|c| local(c.pos)).collect(),
            clip_edges: cfg.clip_edges.clone(),
            wheels,
            powerband: Powerband::new(&cfg.engine.powerband)?,
            ratios: GearRatios::new(&cfg.transmission),
            total_drive: cfg.total_drive(),
            redline: cfg.engine.redline,
            flywheel: cfg.engine.flywheel,
            powerscale: cfg.engine.powerscale,
            recover: cfg.recover.clone(),
            tuning: cfg.tuning,
        })
    }

    /// Fresh engine at idle.
    pub fn engine(&self) -> Engine {
        Engine::new(self.powerband.idle(), self.redline, self.powerscale, self.flywheel)
    }
}
