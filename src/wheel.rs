// ==============================================================================
// wheel.rs - PER-WHEEL SUSPENSION + TIRE CONTACT
// ------------------------------------------------------------------------------
// Each wheel is a point probe hanging below its mount:
//   probe = mount_world + (0, ride_pos - radius, 0)
//
// Suspension (1 DOF, unsprung mass):
//   susp      = ride_pos * k
//   ride_vel -= susp / wheel_mass * dt
//   ride_vel *= 1 / (1 + damping * dt)         semi-implicit damping
//   ride_pos += ride_vel * dt
//
// Per contact:
// - ride_pos absorbs the penetration; past susp_max it bottoms out and the
//   hard chassis spring takes over
// - tire friction from the surface-frame slip, with the rolling speed
//   (spin * radius) added along the rolling direction
// - force applied at the probe, friction accumulated for drive torque
// ==============================================================================

use std::f32::consts::TAU;

use nalgebra::{UnitQuaternion, Vector2, Vector3};

use crate::config::Tuning;
use crate::contact::{clamp_friction, ChassisBody, CollisionQuery, SurfaceBasis};
use crate::model::WheelModel;

/// Rolling-direction friction fed back into spin.
pub const FRICTION_TO_TORQUE: f32 = 0.3;
/// Torque to angular acceleration.
pub const SPIN_GAIN: f32 = 0.13;

#[inline]
pub fn move_toward(value: f32, target: f32, delta: f32) -> f32 {
    if value > target {
        (value - delta).max(target)
    } else {
        (value + delta).min(target)
    }
}

/// Chassis X axis yawed by `angle` toward the chassis Z axis.
pub fn wheel_right_vector(ori: &UnitQuaternion<f32>, angle: f32) -> Vector3<f32> {
    let m = ori.to_rotation_matrix();
    let x = m.matrix().column(0).into_owned();
    let z = m.matrix().column(2).into_owned();
    let (sin, cos) = angle.sin_cos();
    x * cos - z * sin
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelState {
    pub ride_pos: f32,              // m, + = compressed
    pub ride_vel: f32,              // m/s
    pub spin_pos: f32,              // rad, [0, 2pi)
    pub spin_vel: f32,              // rad/s, + = rolling forward
    pub friction_force: Vector2<f32>, // (across, along) from the last tick
}

impl WheelState {
    /// Applies drive + tire torque to the spin rate.
    pub fn apply_torque(&mut self, torque: f32, dt: f32) {
        self.spin_vel += SPIN_GAIN * torque * dt;
    }

    /// Brakes bring spin toward zero, never past it.
    pub fn apply_brake(&mut self, amount: f32, dt: f32) {
        if amount > 0.0 {
            self.spin_vel = move_toward(self.spin_vel, 0.0, amount * dt);
        }
    }

    /// Torque the tire exerts back on the wheel from last tick's friction.
    pub fn tire_torque(&self) -> f32 {
        self.friction_force.y * FRICTION_TO_TORQUE
    }

    /// Suspension and tire contact for one tick. Returns the tangential slip
    /// speed summed over contacts.
    pub fn tick(
        &mut self,
        wheel: &WheelModel,
        right: Vector3<f32>,
        body: &mut dyn ChassisBody,
        query: &dyn CollisionQuery,
        tuning: &Tuning,
        dt: f32,
    ) -> f32 {
        let susp = self.ride_pos * tuning.susp_constant;
        self.friction_force = Vector2::zeros();

        self.ride_vel -= susp / tuning.wheel_mass * dt;
        self.ride_vel *= 1.0 / (1.0 + tuning.susp_damping * dt);
        self.ride_pos += self.ride_vel * dt;

        self.spin_pos += self.spin_vel * dt;
        self.spin_pos = self.spin_pos.rem_euclid(TAU);

        let mut probe = body.local_to_world(&wheel.pos);
        probe.y += self.ride_pos - wheel.radius;
        let probe_vel = body.velocity_at(&probe);

        let mut skid = 0.0;
        for contact in query.collide_point(&probe) {
            let surf = SurfaceBasis::new(contact.normal, right);
            let mut vel = surf.to_surface(&probe_vel);
            vel.y += self.spin_vel * wheel.radius;

            skid += vel.xy().norm();

            let mut perp = susp - vel.z * tuning.clip_damping;
            self.ride_pos += contact.depth;
            if self.ride_pos > tuning.susp_max {
                // bottomed out
                self.ride_pos = tuning.susp_max;
                self.ride_vel = 0.0;
                perp = contact.depth * tuning.clip_constant - vel.z * tuning.clip_damping;
            }
            self.ride_vel = self.ride_vel.max(-vel.z);

            if perp > 0.0 {
                let friction = clamp_friction(vel.x, vel.y, perp, &tuning.wheel_friction);
                self.friction_force += friction;
                body.add_force_at(surf.to_world(perp, &friction), probe);
            }
        }
        self.ride_pos = self.ride_pos.min(tuning.susp_max);
        skid
    }
}
