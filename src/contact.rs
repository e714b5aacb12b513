// ==============================================================================
// contact.rs - COLLABORATOR CONTRACTS + CHASSIS CONTACT RESPONSE
// ------------------------------------------------------------------------------
// The vehicle never talks to the physics engine directly. It sees:
// - ChassisBody     : the rigid body it pushes on (pose, point velocity, forces)
// - CollisionQuery  : point / segment penetration tests against the track
//
// Chassis contacts (clip points and clip edges) use a damped spring along the
// surface normal plus a clamped friction force in the tangent plane:
//
//   perp     = depth * k - v_w * c            (only if > 0)
//   friction = -(v_u, v_v) * scale
//   |friction| > perp * static  ->  rescaled to perp * dynamic
//
// The crash meter keeps the strongest contact push of the tick and decays
// toward zero; consumers poll take_crash_event() for rising edges.
// ==============================================================================

use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};

use crate::config::{FrictionModel, Tuning};
use crate::controller::pull_toward;

const CRASH_DECAY_RATE: f32 = 5.0;

/// One penetration reported by a collision query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub normal: Vector3<f32>,       // unit, pointing out of the surface
    pub depth: f32,                 // >= 0
    pub surface_pos: Point3<f32>,   // closest point on the surface
}

/// The rigid body a vehicle drives.
pub trait ChassisBody {
    fn position(&self) -> Point3<f32>;
    fn orientation(&self) -> UnitQuaternion<f32>;
    fn local_to_world(&self, local: &Point3<f32>) -> Point3<f32>;
    fn velocity_at(&self, world: &Point3<f32>) -> Vector3<f32>;
    /// Accumulated until the next integration step.
    fn add_force_at(&mut self, force: Vector3<f32>, world: Point3<f32>);
    fn set_pose(&mut self, position: Point3<f32>, orientation: UnitQuaternion<f32>);
    /// Zeroes linear and angular velocity.
    fn halt(&mut self);
}

/// Track geometry as seen by the vehicle.
pub trait CollisionQuery {
    fn collide_point(&self, p: &Point3<f32>) -> Vec<Contact>;
    fn collide_segment(&self, a: &Point3<f32>, b: &Point3<f32>) -> Vec<Contact>;
}

/// Orthonormal frame at a contact: `w` is the surface normal, `v` runs along
/// the rolling direction and `u` across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceBasis {
    pub u: Vector3<f32>,
    pub v: Vector3<f32>,
    pub w: Vector3<f32>,
}

impl SurfaceBasis {
    pub fn new(normal: Vector3<f32>, right: Vector3<f32>) -> Self {
        let v = [right, Vector3::z(), Vector3::x()]
            .iter()
            .find_map(|r| normal.cross(r).try_normalize(1.0e-6))
            .unwrap_or_else(Vector3::y);
        let u = v.cross(&normal).try_normalize(1.0e-6).unwrap_or_else(Vector3::x);
        Self { u, v, w: normal }
    }

    /// Components of a world vector along (u, v, w).
    pub fn to_surface(&self, world: &Vector3<f32>) -> Vector3<f32> {
        Vector3::new(world.dot(&self.u), world.dot(&self.v), world.dot(&self.w))
    }

    pub fn to_world(&self, perp: f32, friction: &Vector2<f32>) -> Vector3<f32> {
        self.w * perp + self.u * friction.x + self.v * friction.y
    }
}

/// Friction opposing the tangential slip `(v_u, v_v)`, limited by the
/// normal load `perp`.
pub fn clamp_friction(slip_u: f32, slip_v: f32, perp: f32, model: &FrictionModel) -> Vector2<f32> {
    let friction = Vector2::new(-slip_u, -slip_v) * model.scale;
    let len = friction.norm();
    if len > perp * model.static_coeff {
        friction * (perp * model.dynamic_coeff / len)
    } else {
        friction
    }
}

/// Pushes the chassis out of one contact. Returns the perpendicular force
/// when the contact is separating.
pub fn chassis_contact_response(
    body: &mut dyn ChassisBody,
    contact: &Contact,
    tuning: &Tuning,
) -> Option<f32> {
    let surf = SurfaceBasis::new(contact.normal, Vector3::x());
    let vel = surf.to_surface(&body.velocity_at(&contact.surface_pos));

    let perp = contact.depth * tuning.clip_constant - vel.z * tuning.clip_damping;
    if perp <= 0.0 {
        return None;
    }

    let friction = clamp_friction(vel.x, vel.y, perp, &tuning.chassis_friction);
    body.add_force_at(surf.to_world(perp, &friction), contact.surface_pos);
    Some(perp)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrashMeter {
    level: f32,
    prev: f32,
}

impl CrashMeter {
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Start-of-tick decay of both the level and its trailing reference.
    pub fn decay(&mut self, dt: f32) {
        self.prev = pull_toward(self.prev, self.level, dt * CRASH_DECAY_RATE);
        self.level = pull_toward(self.level, 0.0, dt * CRASH_DECAY_RATE);
    }

    pub fn register(&mut self, perp: f32) {
        self.level = self.level.max(perp);
    }

    /// Reports the level once when it rises above the trailing reference.
    pub fn take_crash_event(&mut self) -> Option<f32> {
        if self.level > self.prev {
            self.prev = self.level * 2.0;
            Some(self.level)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MockBody;
    use approx::assert_relative_eq;

    fn ground_contact(depth: f32) -> Contact {
        Contact {
            normal: Vector3::y(),
            depth,
            surface_pos: Point3::new(0.0, 0.0, 0.0),
        }
    }

    #[test]
    fn basis_is_orthonormal() {
        let n = Vector3::new(0.3, 0.9, 0.1).normalize();
        let b = SurfaceBasis::new(n, Vector3::x());
        assert_relative_eq!(b.u.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(b.v.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(b.u.dot(&b.v), 0.0, epsilon = 1e-5);
        assert_relative_eq!(b.u.dot(&b.w), 0.0, epsilon = 1e-5);
        assert_relative_eq!(b.v.dot(&b.w), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn flat_ground_basis_axes() {
        let b = SurfaceBasis::new(Vector3::y(), Vector3::x());
        // v = y × x = -z, u = v × y = x
        assert_relative_eq!(b.v, -Vector3::z(), epsilon = 1e-6);
        assert_relative_eq!(b.u, Vector3::x(), epsilon = 1e-6);
    }

    #[test]
    fn degenerate_reference_falls_back() {
        let b = SurfaceBasis::new(Vector3::x(), Vector3::x());
        assert!(b.u.iter().chain(b.v.iter()).all(|c| c.is_finite()));
        assert_relative_eq!(b.v.dot(&b.w), 0.0, epsilon = 1e-6);
        assert_relative_eq!(b.v.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn friction_is_clamped_to_dynamic() {
        let model = Tuning::default().chassis_friction;
        let f = clamp_friction(10.0, 0.0, 1000.0, &model);
        assert_relative_eq!(f.norm(), 1000.0 * model.dynamic_coeff, epsilon = 1e-3);
        assert!(f.x < 0.0);

        // small slip stays linear
        let f = clamp_friction(0.01, 0.0, 1000.0, &model);
        assert_relative_eq!(f.x, -0.01 * model.scale, epsilon = 1e-4);
    }

    #[test]
    fn penetration_pushes_along_normal() {
        let mut body = MockBody::default();
        let tuning = Tuning::default();
        let perp = chassis_contact_response(&mut body, &ground_contact(0.01), &tuning);
        assert_relative_eq!(perp.unwrap(), 0.01 * tuning.clip_constant, epsilon = 1e-2);
        assert_relative_eq!(body.force.y, 0.01 * tuning.clip_constant, epsilon = 1e-2);
    }

    #[test]
    fn separating_fast_gives_no_force() {
        let mut body = MockBody { linvel: Vector3::new(0.0, 5.0, 0.0), ..MockBody::default() };
        let perp = chassis_contact_response(&mut body, &ground_contact(0.01), &Tuning::default());
        assert_eq!(perp, None);
        assert_eq!(body.force, Vector3::zeros());
    }

    #[test]
    fn crash_event_is_a_rising_edge() {
        let mut meter = CrashMeter::default();
        assert_eq!(meter.take_crash_event(), None);

        meter.register(5000.0);
        assert_eq!(meter.take_crash_event(), Some(5000.0));
        // reference was doubled, same level is no longer an event
        assert_eq!(meter.take_crash_event(), None);

        meter.decay(1.0 / 60.0);
        assert!(meter.level() < 5000.0);
        assert_eq!(meter.take_crash_event(), None);
    }
}
