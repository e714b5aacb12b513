//! Shared test documents and collaborator doubles.

use std::sync::Arc;

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::config::VehicleConfig;
use crate::contact::{ChassisBody, CollisionQuery, Contact};
use crate::model::VehicleModel;
use crate::track::{TrackConfig, TrackModel};

pub const CAR_JSON: &str = include_str!("../tests/fixtures/car.json");
pub const FLAT_TRACK_JSON: &str = include_str!("../tests/fixtures/flat_track.json");

pub fn car_config() -> VehicleConfig {
    VehicleConfig::from_json(CAR_JSON).unwrap()
}

pub fn car_model() -> Arc<VehicleModel> {
    Arc::new(VehicleModel::new(&car_config()).unwrap())
}

pub fn flat_track_config() -> TrackConfig {
    TrackConfig::from_json(FLAT_TRACK_JSON).unwrap()
}

pub fn flat_track() -> Arc<TrackModel> {
    Arc::new(TrackModel::new(&flat_track_config()).unwrap())
}

/// Free rigid body that only records what is done to it.
#[derive(Debug, Clone)]
pub struct MockBody {
    pub pos: Point3<f32>,
    pub ori: UnitQuaternion<f32>,
    pub linvel: Vector3<f32>,
    pub angvel: Vector3<f32>,
    pub force: Vector3<f32>,
    pub torque: Vector3<f32>,
}

impl Default for MockBody {
    fn default() -> Self {
        Self {
            pos: Point3::origin(),
            ori: UnitQuaternion::identity(),
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }
}

impl ChassisBody for MockBody {
    fn position(&self) -> Point3<f32> {
        self.pos
    }

    fn orientation(&self) -> UnitQuaternion<f32> {
        self.ori
    }

    fn local_to_world(&self, local: &Point3<f32>) -> Point3<f32> {
        self.pos + self.ori * local.coords
    }

    fn velocity_at(&self, world: &Point3<f32>) -> Vector3<f32> {
        self.linvel + self.angvel.cross(&(*world - self.pos))
    }

    fn add_force_at(&mut self, force: Vector3<f32>, world: Point3<f32>) {
        self.force += force;
        self.torque += (world - self.pos).cross(&force);
    }

    fn set_pose(&mut self, position: Point3<f32>, orientation: UnitQuaternion<f32>) {
        self.pos = position;
        self.ori = orientation;
    }

    fn halt(&mut self) {
        self.linvel = Vector3::zeros();
        self.angvel = Vector3::zeros();
    }
}

/// Infinite ground plane at y = 0.
pub struct FlatGround;

impl CollisionQuery for FlatGround {
    fn collide_point(&self, p: &Point3<f32>) -> Vec<Contact> {
        if p.y >= 0.0 {
            return Vec::new();
        }
        vec![Contact {
            normal: Vector3::y(),
            depth: -p.y,
            surface_pos: Point3::new(p.x, 0.0, p.z),
        }]
    }

    fn collide_segment(&self, _a: &Point3<f32>, _b: &Point3<f32>) -> Vec<Contact> {
        Vec::new()
    }
}
