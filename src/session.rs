// ==============================================================================
// session.rs - ONE VEHICLE ON ONE TRACK, FIXED TIMESTEP
// ------------------------------------------------------------------------------
// step():
//   1) hold the vehicle until the countdown start tick
//   2) vehicle tick (controller, drivetrain, contacts -> forces on the body)
//   3) rapier step (integrates the body, clears user forces)
//   4) tick += 1, checkpoint progress from the new body position
//
// A session is single-threaded and fully deterministic: the same inputs in the
// same order give the same trajectory.
// ==============================================================================

use std::sync::Arc;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::{RigidBody, RigidBodyHandle};

use crate::contact::ChassisBody;
use crate::controller::DriverInput;
use crate::model::VehicleModel;
use crate::physics::PhysicsWorld;
use crate::track::{Progress, TrackModel};
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub pos: Point3<f32>,
    pub ori: UnitQuaternion<f32>,
    pub lin_vel: Vector3<f32>,
    pub ang_vel: Vector3<f32>,
}

impl BodyState {
    fn of(body: &RigidBody) -> Self {
        Self {
            pos: ChassisBody::position(body),
            ori: *body.rotation(),
            lin_vel: *body.linvel(),
            ang_vel: *body.angvel(),
        }
    }
}

pub struct Session {
    world: PhysicsWorld,
    chassis: RigidBodyHandle,
    vehicle: Vehicle,
    track: Arc<TrackModel>,
    progress: Progress,
    tick: u64,
    start_tick: u64,
}

impl Session {
    pub fn new(model: Arc<VehicleModel>, track: Arc<TrackModel>, tick_rate: f32) -> Self {
        let dt = 1.0 / tick_rate;
        let mut world = PhysicsWorld::for_track(&track, dt);
        let chassis = world.spawn_chassis(&model, track.start_pos, track.start_ori);
        Self {
            world,
            chassis,
            vehicle: Vehicle::new(model),
            start_tick: track.start_tick(dt),
            track,
            progress: Progress::new(),
            tick: 0,
        }
    }

    pub fn dt(&self) -> f32 {
        self.world.dt()
    }

    /// Completed steps.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn track(&self) -> &TrackModel {
        &self.track
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn set_input(&mut self, input: DriverInput) {
        self.vehicle.controller.input = input;
    }

    pub fn body_state(&self) -> Option<BodyState> {
        self.world.bodies.get(self.chassis).map(BodyState::of)
    }

    /// Teleports the chassis and stops it.
    pub fn place(&mut self, pos: Point3<f32>, ori: UnitQuaternion<f32>) {
        let Some(body) = self.world.bodies.get_mut(self.chassis) else { return };
        body.set_pose(pos, ori);
        body.halt();
    }

    pub fn step(&mut self) {
        let dt = self.dt();
        self.vehicle.set_held(self.tick < self.start_tick);

        if let Some((body, query)) = self.world.chassis_and_track(self.chassis) {
            self.vehicle.tick(dt, body, &query);
        }
        self.world.step();
        self.tick += 1;

        if let Some(body) = self.world.bodies.get(self.chassis) {
            let pos = ChassisBody::position(body);
            self.progress.update(&self.track, &pos, self.tick);
        }
    }
}
