// ==============================================================================
// physics.rs - RAPIER WORLD, CHASSIS BODY AND TRACK QUERIES
// ------------------------------------------------------------------------------
// PhysicsWorld owns the rapier sets and integrates the chassis. Rapier never
// resolves vehicle contacts itself:
// - the chassis collider only carries mass (it interacts with nothing)
// - track colliders are static geometry for TrackQuery
// - every contact force comes from the vehicle model through ChassisBody
//
// User forces are cleared after each step so every tick starts from zero.
// ==============================================================================

use nalgebra::{Point3, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::contact::{ChassisBody, CollisionQuery, Contact};
use crate::model::VehicleModel;
use crate::track::{SurfaceConfig, TrackModel};

const GROUP_GROUND: Group = Group::GROUP_1;
const GROUP_CHASSIS: Group = Group::GROUP_2;

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub integration: IntegrationParameters,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    surfaces: Vec<ColliderHandle>,  // static track geometry
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>, dt: Real) -> Self {
        Self {
            gravity,
            integration: IntegrationParameters { dt, ..IntegrationParameters::default() },
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            surfaces: Vec::new(),
        }
    }

    /// World with every track surface inserted.
    pub fn for_track(track: &TrackModel, dt: Real) -> Self {
        let mut world = Self::new(track.gravity, dt);
        for surface in &track.surfaces {
            world.add_surface(surface);
        }
        world
    }

    pub fn dt(&self) -> Real {
        self.integration.dt
    }

    pub fn add_surface(&mut self, surface: &SurfaceConfig) -> ColliderHandle {
        let builder = match *surface {
            SurfaceConfig::Cuboid { center, half_extents: [hx, hy, hz], rotation } => {
                ColliderBuilder::cuboid(hx, hy, hz)
                    .position(Isometry::new(Vector3::from(center), Vector3::from(rotation)))
            }
            SurfaceConfig::Ball { center, radius } => {
                ColliderBuilder::ball(radius).translation(Vector3::from(center))
            }
        };
        let collider = builder
            .collision_groups(InteractionGroups::new(GROUP_GROUND, Group::NONE))
            .build();
        let handle = self.colliders.insert(collider);
        self.surfaces.push(handle);
        handle
    }

    /// Dynamic chassis with the vehicle's mass and box inertia.
    pub fn spawn_chassis(
        &mut self,
        model: &VehicleModel,
        pos: Point3<Real>,
        ori: UnitQuaternion<Real>,
    ) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::dynamic()
            .position(Isometry::from_parts(Translation3::from(pos.coords), ori))
            .linear_damping(0.0)
            .angular_damping(0.0)
            .can_sleep(false)
            .build();
        let handle = self.bodies.insert(rb);

        let h = model.half_extents;
        let collider = ColliderBuilder::cuboid(h.x, h.y, h.z)
            .mass(model.mass)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, Group::NONE))
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Mutable body plus a query over the track, borrowed together.
    pub fn chassis_and_track(
        &mut self,
        handle: RigidBodyHandle,
    ) -> Option<(&mut RigidBody, TrackQuery<'_>)> {
        let body = self.bodies.get_mut(handle)?;
        let query = TrackQuery { colliders: &self.colliders, surfaces: &self.surfaces };
        Some((body, query))
    }

    pub fn track_query(&self) -> TrackQuery<'_> {
        TrackQuery { colliders: &self.colliders, surfaces: &self.surfaces }
    }

    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &(),
        );

        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }
}

impl ChassisBody for RigidBody {
    fn position(&self) -> Point3<f32> {
        Point3::from(*self.translation())
    }

    fn orientation(&self) -> UnitQuaternion<f32> {
        *self.rotation()
    }

    fn local_to_world(&self, local: &Point3<f32>) -> Point3<f32> {
        RigidBody::position(self) * local
    }

    // The chassis collider is centered, so the center of mass is the body
    // origin even right after set_pose.
    fn velocity_at(&self, world: &Point3<f32>) -> Vector3<f32> {
        self.linvel() + self.angvel().cross(&(world.coords - self.translation()))
    }

    fn add_force_at(&mut self, force: Vector3<f32>, world: Point3<f32>) {
        let arm = world.coords - self.translation();
        self.add_force(force, true);
        self.add_torque(arm.cross(&force), true);
    }

    fn set_pose(&mut self, position: Point3<f32>, orientation: UnitQuaternion<f32>) {
        self.set_position(Isometry::from_parts(Translation3::from(position.coords), orientation), true);
    }

    fn halt(&mut self) {
        self.set_linvel(Vector3::zeros(), true);
        self.set_angvel(Vector3::zeros(), true);
    }
}

/// Penetration queries against the static track colliders.
pub struct TrackQuery<'a> {
    colliders: &'a ColliderSet,
    surfaces: &'a [ColliderHandle],
}

impl TrackQuery<'_> {
    fn shapes(&self) -> impl Iterator<Item = &Collider> + '_ {
        self.surfaces.iter().filter_map(|&h| self.colliders.get(h))
    }
}

/// Contact for a point inside `shape`: pushed out to the closest boundary
/// point.
fn point_contact(shape: &dyn Shape, iso: &Isometry<Real>, p: &Point<Real>) -> Option<Contact> {
    if !shape.contains_point(iso, p) {
        return None;
    }
    let proj = shape.project_point(iso, p, false);
    let offset = proj.point - *p;
    let depth = offset.norm();
    let normal = offset.try_normalize(1.0e-6)?;
    Some(Contact { normal, depth, surface_pos: proj.point })
}

/// Contact for a segment passing through `shape` with both ends outside:
/// resolved at the midpoint of the entry and exit points.
fn segment_contact(
    shape: &dyn Shape,
    iso: &Isometry<Real>,
    a: &Point<Real>,
    b: &Point<Real>,
) -> Option<Contact> {
    if shape.contains_point(iso, a) || shape.contains_point(iso, b) {
        return None;
    }
    let dir = *b - *a;
    let entry = shape.cast_ray(iso, &Ray::new(*a, dir), 1.0, true)?;
    let exit = shape.cast_ray(iso, &Ray::new(*b, -dir), 1.0, true)?;
    let p_in = *a + dir * entry;
    let p_out = *b - dir * exit;
    point_contact(shape, iso, &nalgebra::center(&p_in, &p_out))
}

impl CollisionQuery for TrackQuery<'_> {
    fn collide_point(&self, p: &Point3<f32>) -> Vec<Contact> {
        self.shapes()
            .filter_map(|c| point_contact(c.shape(), c.position(), p))
            .collect()
    }

    fn collide_segment(&self, a: &Point3<f32>, b: &Point3<f32>) -> Vec<Contact> {
        self.shapes()
            .filter_map(|c| segment_contact(c.shape(), c.position(), a, b))
            .collect()
    }
}
