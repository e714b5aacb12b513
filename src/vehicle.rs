// ==============================================================================
// vehicle.rs - PER-TICK VEHICLE UPDATE
// ------------------------------------------------------------------------------
// Powertrain layout:
//   Engine - Clutch - Gearbox - Differential - Wheels
//
// Tick order (fixed, every step depends on the previous ones):
//    1) controller (gear selection + pedal smoothing)
//    2) disabled override: clutch open, full brake, straight wheels
//    3) crash meter decay
//    4) upright check / flip recovery
//    5) differential speed + lateral tire load (steering feedback)
//    6) engine coupling + rev limiter
//    7) engine torque -> wheels (viscous LSD), spin integration, brakes
//    8) chassis clip points, then clip edges
//    9) steering rack
//   10) wheels: suspension + tire contact
//   11) smoothed engine speed
//
// All forces go through ChassisBody; the caller integrates the body after
// the tick.
// ==============================================================================

use std::f32::consts::PI;
use std::sync::Arc;

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

use crate::contact::{chassis_contact_response, ChassisBody, CollisionQuery, CrashMeter};
use crate::controller::{pull_toward, AutomaticController};
use crate::drivetrain::{differential_ang_vel, wheel_drive_torque, Engine};
use crate::model::VehicleModel;
use crate::wheel::{wheel_right_vector, WheelState};

const UPRIGHT_THRESHOLD: f32 = 0.1;     // body Y axis . world Y
const RECOVER_PULL_RATE: f32 = 4.0;     // 1/s

const TURN_STIFFNESS: f32 = 300.0;
const TURN_FEEDBACK: f32 = 0.005;       // per N of lateral tire force
const TURN_MAX_VEL: f32 = 8.0;          // 1/s
const TURN_RESPONSE: f32 = 10.0;        // 1/s

/// Pose the vehicle is being lifted to while recovering from a flip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recovery {
    pub target_pos: Point3<f32>,
    pub target_ori: UnitQuaternion<f32>,
}

impl Recovery {
    /// Lift by the configured offset and keep only the heading.
    fn start(body: &dyn ChassisBody, pos_offset: Vector3<f32>) -> Self {
        let ori = body.orientation();
        let m = ori.to_rotation_matrix();
        let angle_y = m[(0, 2)].atan2(m[(0, 0)]);
        let mut target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI - angle_y);
        if target.coords.dot(&ori.coords) < 0.0 {
            // shortest path
            target = UnitQuaternion::new_unchecked(-target.into_inner());
        }
        Self { target_pos: body.position() + pos_offset, target_ori: target }
    }
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    model: Arc<VehicleModel>,
    pub controller: AutomaticController,
    engine: Engine,
    wheels: Vec<WheelState>,
    differential_ang_vel: f32,  // rad/s
    wheel_turn_pos: f32,        // -1..1
    wheel_turn_vel: f32,
    crash: CrashMeter,
    skid_level: f32,
    recover_timer: f32,         // s
    recovery: Option<Recovery>,
    held: bool,
}

impl Vehicle {
    pub fn new(model: Arc<VehicleModel>) -> Self {
        Self {
            engine: model.engine(),
            wheels: vec![WheelState::default(); model.wheels.len()],
            controller: AutomaticController::new(),
            differential_ang_vel: 0.0,
            wheel_turn_pos: 0.0,
            wheel_turn_vel: 0.0,
            crash: CrashMeter::default(),
            skid_level: 0.0,
            recover_timer: 0.0,
            recovery: None,
            held: false,
            model,
        }
    }

    pub fn model(&self) -> &VehicleModel {
        &self.model
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn wheels(&self) -> &[WheelState] {
        &self.wheels
    }

    pub fn differential_ang_vel(&self) -> f32 {
        self.differential_ang_vel
    }

    pub fn wheel_turn_pos(&self) -> f32 {
        self.wheel_turn_pos
    }

    /// Summed tire slip speed of the last tick.
    pub fn skid_level(&self) -> f32 {
        self.skid_level
    }

    pub fn crash_level(&self) -> f32 {
        self.crash.level()
    }

    pub fn take_crash_event(&mut self) -> Option<f32> {
        self.crash.take_crash_event()
    }

    pub fn recovery(&self) -> Option<&Recovery> {
        self.recovery.as_ref()
    }

    pub fn recover_timer(&self) -> f32 {
        self.recover_timer
    }

    /// Keeps the vehicle braked and declutched (countdown).
    pub fn set_held(&mut self, held: bool) {
        self.held = held;
    }

    pub fn is_disabled(&self) -> bool {
        self.held || self.recovery.is_some()
    }

    pub fn tick(&mut self, dt: f32, body: &mut dyn ChassisBody, query: &dyn CollisionQuery) {
        let model = Arc::clone(&self.model);
        let tuning = &model.tuning;

        // 1) controller
        self.controller.tick(
            dt,
            self.engine.ang_vel,
            self.differential_ang_vel,
            &model.powerband,
            &model.ratios,
        );
        let mut throttle = self.controller.output.throttle;

        // 2) disabled: before the start or while recovering
        if self.is_disabled() {
            let out = &mut self.controller.output;
            out.clutch = false;
            out.brake = 1.0;
            out.desired_turn_pos = 0.0;
        }
        let controls = self.controller.output;

        // 3)
        self.crash.decay(dt);
        self.skid_level = 0.0;

        // 4) upright check
        let up_alignment = body.orientation().to_rotation_matrix()[(1, 1)];
        if up_alignment <= UPRIGHT_THRESHOLD || self.recover_timer >= model.recover.trigger_time {
            self.recover_timer += dt;
            if self.recover_timer >= model.recover.trigger_time {
                self.recover(dt, body);
            }
        } else {
            self.recover_timer = 0.0;
        }

        // 5)
        let diff = differential_ang_vel(
            self.wheels.iter().zip(&model.wheels).map(|(s, w)| (s.spin_vel, w.drive)),
            model.total_drive,
        );
        self.differential_ang_vel = diff;
        let lateral: f32 = self.wheels.iter().map(|s| s.friction_force.x).sum();

        // 6)
        let gear_ratio = model.ratios.ratio(controls.gear);
        self.engine.couple(diff, gear_ratio, controls.clutch);
        if self.engine.limit_revs() {
            throttle = 0.0;
            self.controller.output.throttle = 0.0;
        }

        // 7)
        let engine_torque = self.engine.torque(throttle, &model.powerband);
        let per_wheel_torque = if gear_ratio != 0.0 && controls.clutch {
            engine_torque * gear_ratio / model.total_drive
        } else {
            self.engine.spin_free(engine_torque, dt);
            0.0
        };

        for (state, wheel) in self.wheels.iter_mut().zip(&model.wheels) {
            let mut torque = state.tire_torque();
            if wheel.drive > 0.0 {
                torque += wheel_drive_torque(per_wheel_torque, state.spin_vel, diff, wheel.drive);
            }
            state.apply_torque(torque, dt);
            let brake = controls.brake * wheel.brake + controls.handbrake * wheel.handbrake;
            state.apply_brake(brake * tuning.brake_rate, dt);
        }

        // 8) chassis
        for clip in &model.clips {
            let p = body.local_to_world(clip);
            for contact in query.collide_point(&p) {
                if let Some(perp) = chassis_contact_response(body, &contact, tuning) {
                    self.crash.register(perp);
                }
            }
        }
        for &[a, b] in &model.clip_edges {
            let pa = body.local_to_world(&model.clips[a]);
            let pb = body.local_to_world(&model.clips[b]);
            for contact in query.collide_segment(&pa, &pb) {
                if let Some(perp) = chassis_contact_response(body, &contact, tuning) {
                    self.crash.register(perp);
                }
            }
        }

        // 9) steering rack
        let turn_vel_target = ((controls.desired_turn_pos - self.wheel_turn_pos) * TURN_STIFFNESS
            - lateral * TURN_FEEDBACK)
            .clamp(-TURN_MAX_VEL, TURN_MAX_VEL);
        self.wheel_turn_vel = pull_toward(self.wheel_turn_vel, turn_vel_target, dt * TURN_RESPONSE);
        self.wheel_turn_pos = (self.wheel_turn_pos + self.wheel_turn_vel * dt).clamp(-1.0, 1.0);

        // 10) wheels
        let ori = body.orientation();
        for (state, wheel) in self.wheels.iter_mut().zip(&model.wheels) {
            let right = wheel_right_vector(&ori, wheel.turn * self.wheel_turn_pos);
            self.skid_level += state.tick(wheel, right, body, query, tuning, dt);
        }

        // 11)
        self.engine.smooth(dt);
    }

    fn recover(&mut self, dt: f32, body: &mut dyn ChassisBody) {
        let offset = Vector3::from(self.model.recover.pos_offset);
        let state = *self.recovery.get_or_insert_with(|| Recovery::start(&*body, offset));

        let rate = dt * RECOVER_PULL_RATE;
        let pos = body.position();
        let pos = Point3::new(
            pull_toward(pos.x, state.target_pos.x, rate),
            pull_toward(pos.y, state.target_pos.y, rate),
            pull_toward(pos.z, state.target_pos.z, rate),
        );
        let q = body.orientation().coords;
        let t = state.target_ori.coords;
        let ori = UnitQuaternion::new_normalize(Quaternion::new(
            pull_toward(q.w, t.w, rate),
            pull_toward(q.x, t.x, rate),
            pull_toward(q.y, t.y, rate),
            pull_toward(q.z, t.z, rate),
        ));
        body.set_pose(pos, ori);
        body.halt();

        if self.recover_timer >= self.model.recover.release_time {
            self.recover_timer = 0.0;
            self.recovery = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, FlatGround, MockBody};
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn flipped_body(height: f32) -> MockBody {
        MockBody {
            pos: Point3::new(3.0, height, -2.0),
            ori: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI),
            linvel: Vector3::new(1.0, 0.0, 0.0),
            ..MockBody::default()
        }
    }

    #[test]
    fn held_vehicle_is_braked_and_declutched() {
        let mut vehicle = Vehicle::new(fixtures::car_model());
        let mut body = MockBody { pos: Point3::new(0.0, 5.0, 0.0), ..MockBody::default() };
        vehicle.set_held(true);
        vehicle.controller.input.forward = 1.0;
        vehicle.controller.input.left = 1.0;

        vehicle.tick(DT, &mut body, &FlatGround);
        assert!(vehicle.is_disabled());
        assert_eq!(vehicle.controller.output.brake, 1.0);
        assert!(!vehicle.controller.output.clutch);
        assert_eq!(vehicle.controller.output.desired_turn_pos, 0.0);
    }

    #[test]
    fn upright_vehicle_never_recovers() {
        let mut vehicle = Vehicle::new(fixtures::car_model());
        let mut body = MockBody { pos: Point3::new(0.0, 5.0, 0.0), ..MockBody::default() };
        for _ in 0..200 {
            vehicle.tick(DT, &mut body, &FlatGround);
        }
        assert_eq!(vehicle.recover_timer(), 0.0);
        assert!(vehicle.recovery().is_none());
    }

    #[test]
    fn flipped_vehicle_is_lifted_and_released() {
        let model = fixtures::car_model();
        let recover = model.recover.clone();
        let mut vehicle = Vehicle::new(model);
        let mut body = flipped_body(5.0);
        let start = body.pos;

        let mut ticks = 0;
        while vehicle.recovery().is_none() {
            vehicle.tick(DT, &mut body, &FlatGround);
            ticks += 1;
            assert!(ticks < 100, "recovery never started");
        }
        assert!(vehicle.recover_timer() >= recover.trigger_time);
        assert!(vehicle.is_disabled());
        assert_eq!(body.linvel, Vector3::zeros());

        let target = *vehicle.recovery().unwrap();
        assert_relative_eq!(target.target_pos, start + Vector3::from(recover.pos_offset), epsilon = 1e-5);
        // heading kept, upright
        assert_relative_eq!((target.target_ori * Vector3::y()).y, 1.0, epsilon = 1e-5);

        while vehicle.recovery().is_some() {
            vehicle.tick(DT, &mut body, &FlatGround);
            ticks += 1;
            assert!(ticks < 400, "recovery never released");
        }
        assert!(!vehicle.is_disabled());
        assert_relative_eq!(body.pos, target.target_pos, epsilon = 1e-2);
        assert!((body.ori * Vector3::y()).y > 0.99);

        // upright again: the timer stays reset
        vehicle.tick(DT, &mut body, &FlatGround);
        assert_eq!(vehicle.recover_timer(), 0.0);
    }

    #[test]
    fn recovery_keeps_heading() {
        let yaw = 0.7;
        let mut body = MockBody {
            ori: UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
                * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI),
            ..MockBody::default()
        };
        body.pos.y = 5.0;
        let rec = Recovery::start(&body, Vector3::zeros());
        let fwd = rec.target_ori * Vector3::z();
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw) * Vector3::z();
        assert_relative_eq!(fwd, expected, epsilon = 1e-5);
        assert!(rec.target_ori.coords.dot(&body.ori.coords) >= 0.0);
    }

    #[test]
    fn steering_follows_input_and_is_bounded() {
        let mut vehicle = Vehicle::new(fixtures::car_model());
        let mut body = MockBody { pos: Point3::new(0.0, 5.0, 0.0), ..MockBody::default() };
        vehicle.controller.input.left = 1.0;
        for _ in 0..120 {
            vehicle.tick(DT, &mut body, &FlatGround);
            assert!(vehicle.wheel_turn_pos() <= 1.0);
        }
        assert!(vehicle.wheel_turn_pos() > 0.9);
    }

    #[test]
    fn chassis_impact_raises_crash_event() {
        let mut vehicle = Vehicle::new(fixtures::car_model());
        // lower clips sit 0.15 m below the origin
        let mut body = MockBody { pos: Point3::new(0.0, 0.05, 0.0), ..MockBody::default() };
        vehicle.tick(DT, &mut body, &FlatGround);

        assert!(body.force.y > 0.0);
        let level = vehicle.crash_level();
        assert!(level > 0.0);
        assert_eq!(vehicle.take_crash_event(), Some(level));
        assert_eq!(vehicle.take_crash_event(), None);
    }

    #[test]
    fn declutched_engine_stays_at_idle_without_throttle() {
        let mut vehicle = Vehicle::new(fixtures::car_model());
        let mut body = MockBody { pos: Point3::new(0.0, 5.0, 0.0), ..MockBody::default() };
        vehicle.set_held(true);
        for _ in 0..30 {
            vehicle.tick(DT, &mut body, &FlatGround);
        }
        assert_eq!(vehicle.engine().ang_vel, vehicle.model().powerband.idle());
    }
}
