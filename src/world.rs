//! The physics world: entity management, the stepping pipeline, queries.

pub mod contact_manager;

use std::time::Instant;

use log::debug;

use crate::collision::broadphase::{BroadPhase, BroadPhaseKind};
use crate::collision::bvh::AnyBroadPhase;
use crate::collision::geometry::{Geometry, RayCastHit};
use crate::collision::narrowphase::Narrowphase;
use crate::config::{
    DEFAULT_GRAVITY, DEFAULT_POSITION_ITERATIONS, DEFAULT_VELOCITY_ITERATIONS, DISABLE_SLEEPING,
};
use crate::core::rigidbody::{JointId, RigidBody, RigidBodyConfig};
use crate::core::shape::{BodyId, Shape, ShapeConfig, ShapeId};
use crate::dynamics::contact::{ContactCallback, ContactCallbackId};
use crate::dynamics::island::{Island, SolverRef};
use crate::dynamics::joint::{Joint, JointConfig};
use crate::dynamics::TimeStep;
use crate::utils::allocator::Arena;
use crate::utils::logging::{warn_if_frame_budget_exceeded, ScopedTimer};
use crate::utils::math::{Aabb, Real, Transform, Vec3};
use crate::utils::profiling::StepProfiler;
use contact_manager::ContactManager;

/// Debug-draw sink; the engine emits primitives only from
/// [`World::draw_debug`], never from [`World::step`].
pub trait DebugDraw {
    fn point(&mut self, position: Vec3);
    fn line(&mut self, from: Vec3, to: Vec3);
    fn triangle(&mut self, v1: Vec3, v2: Vec3, v3: Vec3);
}

/// The simulation container. Owns every body, shape, joint, and contact,
/// and advances them with [`World::step`].
pub struct World {
    pub(crate) bodies: Arena<RigidBody>,
    body_order: Vec<BodyId>,
    pub(crate) shapes: Arena<Shape>,
    pub(crate) joints: Arena<Joint>,
    joint_order: Vec<JointId>,

    broad_phase: AnyBroadPhase,
    narrowphase: Narrowphase,
    contact_manager: ContactManager,
    callbacks: Arena<Box<dyn ContactCallback>>,

    gravity: Vec3,
    time_step: TimeStep,
    prev_dt: Real,
    num_velocity_iterations: u32,
    num_position_iterations: u32,

    island: Island,
    body_stack: Vec<BodyId>,
    num_islands: usize,
    shape_id_count: u32,

    pub profiler: StepProfiler,
    debug_draw: Option<Box<dyn DebugDraw>>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(BroadPhaseKind::Bvh, Vec3::from_array(DEFAULT_GRAVITY))
    }
}

impl World {
    pub fn new(broad_phase: BroadPhaseKind, gravity: Vec3) -> Self {
        Self {
            bodies: Arena::new(),
            body_order: Vec::new(),
            shapes: Arena::new(),
            joints: Arena::new(),
            joint_order: Vec::new(),
            broad_phase: AnyBroadPhase::new(broad_phase),
            narrowphase: Narrowphase::new(),
            contact_manager: ContactManager::new(),
            callbacks: Arena::new(),
            gravity,
            time_step: TimeStep::default(),
            prev_dt: 0.0,
            num_velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            num_position_iterations: DEFAULT_POSITION_ITERATIONS,
            island: Island::new(),
            body_stack: Vec::new(),
            num_islands: 0,
            shape_id_count: 0,
            profiler: StepProfiler::default(),
            debug_draw: None,
        }
    }

    // --- entity management ---

    pub fn add_body(&mut self, config: &RigidBodyConfig) -> BodyId {
        let id = self.bodies.insert(RigidBody::new(config));
        self.body_order.push(id);
        id
    }

    /// Removes a body along with its shapes, contacts, and joints.
    pub fn remove_body(&mut self, body: BodyId) {
        let Some(b) = self.bodies.get(body) else {
            return;
        };
        for shape in b.shapes.clone() {
            self.remove_shape(shape);
        }
        let joints: Vec<JointId> = self
            .bodies
            .get(body)
            .map(|b| b.joints.clone())
            .unwrap_or_default();
        for joint in joints {
            self.remove_joint(joint);
        }
        self.bodies.remove(body);
        self.body_order.retain(|b| *b != body);
    }

    /// Creates a shape from `config` and attaches it to `body`, registering
    /// it in the broad phase and rebuilding the body's mass data.
    pub fn add_shape(&mut self, body: BodyId, config: &ShapeConfig) -> ShapeId {
        assert!(
            self.bodies.get(body).is_some(),
            "shape attached to a body that is not in this world"
        );
        let shape = Shape::new(config, body, self.shape_id_count);
        self.shape_id_count += 1;
        let id = self.shapes.insert(shape);

        let (prev, current) = {
            let b = self.bodies.get_mut(body).unwrap();
            b.shapes.push(id);
            (b.prev_transform, b.transform)
        };
        let shape = self.shapes.get_mut(id).unwrap();
        shape.sync(&prev, &current);
        let proxy = self.broad_phase.create_proxy(id, &shape.aabb);
        shape.proxy = Some(proxy);

        let b = self.bodies.get_mut(body).unwrap();
        b.update_mass(&self.shapes);
        id
    }

    /// Detaches and destroys a shape, together with its contacts and proxy.
    pub fn remove_shape(&mut self, shape: ShapeId) {
        let Some(s) = self.shapes.get(shape) else {
            return;
        };
        let body = s.body;
        let proxy = s.proxy;

        self.contact_manager.destroy_contacts_of_shape(
            shape,
            &mut self.bodies,
            &self.shapes,
            &mut self.callbacks,
        );
        if let Some(proxy) = proxy {
            self.broad_phase.destroy_proxy(proxy);
        }
        self.shapes.remove(shape);
        if let Some(b) = self.bodies.get_mut(body) {
            b.shapes.retain(|s| *s != shape);
            b.update_mass(&self.shapes);
        }
    }

    pub fn add_joint(&mut self, config: &JointConfig) -> JointId {
        assert!(
            self.bodies.get(config.body1).is_some() && self.bodies.get(config.body2).is_some(),
            "joint connects a body that is not in this world"
        );
        let id = self.joints.insert(Joint::new(config));
        self.joint_order.push(id);
        let b1 = self.bodies.get_mut(config.body1).unwrap();
        b1.joints.push(id);
        b1.wake_up();
        let b2 = self.bodies.get_mut(config.body2).unwrap();
        b2.joints.push(id);
        b2.wake_up();
        id
    }

    pub fn remove_joint(&mut self, joint: JointId) {
        let Some(j) = self.joints.remove(joint) else {
            return;
        };
        self.joint_order.retain(|id| *id != joint);
        if let Some(b) = self.bodies.get_mut(j.body1) {
            b.joints.retain(|id| *id != joint);
            b.wake_up();
        }
        if let Some(b) = self.bodies.get_mut(j.body2) {
            b.joints.retain(|id| *id != joint);
            b.wake_up();
        }
    }

    pub fn register_contact_callback(
        &mut self,
        callback: Box<dyn ContactCallback>,
    ) -> ContactCallbackId {
        self.callbacks.insert(callback)
    }

    // --- accessors ---

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn num_bodies(&self) -> usize {
        self.body_order.len()
    }

    pub fn num_joints(&self) -> usize {
        self.joint_order.len()
    }

    pub fn num_contacts(&self) -> usize {
        self.contact_manager.num_contacts()
    }

    /// Number of multi-body islands solved in the last step.
    pub fn num_islands(&self) -> usize {
        self.num_islands
    }

    pub fn contacts(&self) -> impl Iterator<Item = &crate::dynamics::contact::Contact> {
        self.contact_manager.contacts.iter()
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        self.wake_all();
    }

    pub fn set_num_velocity_iterations(&mut self, iterations: u32) {
        self.num_velocity_iterations = iterations;
    }

    pub fn set_num_position_iterations(&mut self, iterations: u32) {
        self.num_position_iterations = iterations;
    }

    pub fn wake_all(&mut self) {
        for body in self.bodies.iter_mut() {
            body.wake_up();
        }
    }

    pub fn set_debug_draw(&mut self, draw: Box<dyn DebugDraw>) {
        self.debug_draw = Some(draw);
    }

    // --- stepping ---

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: Real) {
        assert!(dt > 0.0, "time step must be positive");
        let _timer = ScopedTimer::new("world::step");
        let step_start = Instant::now();
        self.profiler.reset();

        self.time_step = TimeStep {
            dt,
            inv_dt: 1.0 / dt,
            dt_ratio: if self.prev_dt > 0.0 {
                dt / self.prev_dt
            } else {
                1.0
            },
        };
        self.prev_dt = dt;

        // broad phase and contact lifecycle
        let start = Instant::now();
        self.contact_manager.update_contacts(
            &mut self.broad_phase,
            &mut self.bodies,
            &self.shapes,
            &self.joints,
            &mut self.callbacks,
        );
        self.profiler.broad_phase_time = start.elapsed();

        // narrow phase
        let start = Instant::now();
        self.contact_manager.update_manifolds(
            &mut self.narrowphase,
            &mut self.bodies,
            &self.shapes,
            &mut self.callbacks,
        );
        self.profiler.narrow_phase_time = start.elapsed();

        // island construction and solving
        let start = Instant::now();
        self.solve_islands();
        self.profiler.solver_time = start.elapsed();

        // bookkeeping for the next step
        for body in self.bodies.iter_mut() {
            body.added_to_island = false;
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
        }
        for contact in self.contact_manager.contacts.iter_mut() {
            contact.added_to_island = false;
        }
        for joint in self.joints.iter_mut() {
            joint.added_to_island = false;
        }

        // user callbacks on every touching contact
        self.contact_manager
            .post_solve(&mut self.bodies, &self.shapes, &mut self.callbacks);

        self.profiler.body_count = self.body_order.len();
        self.profiler.contact_count = self.contact_manager.num_contacts();
        self.profiler.island_count = self.num_islands;
        self.profiler.total_step_time = step_start.elapsed();
        self.profiler.report();
        warn_if_frame_budget_exceeded(self.profiler.total_step_time, 66.0);
    }

    fn solve_islands(&mut self) {
        if DISABLE_SLEEPING {
            self.wake_all();
        }
        self.island.set_gravity(self.gravity);
        self.num_islands = 0;

        for i in 0..self.body_order.len() {
            let seed = self.body_order[i];
            let Some(body) = self.bodies.get(seed) else {
                continue;
            };
            if body.added_to_island || body.sleeping() || body.is_static() {
                continue;
            }

            if body.is_alone() {
                // no constraints: integrate without building an island
                let body = self.bodies.get_mut(seed).unwrap();
                self.island.step_single_body(&self.time_step, body);
                self.sync_body_shapes(seed);
                continue;
            }

            self.build_island(seed);
            self.island.step(
                &self.time_step,
                self.num_velocity_iterations,
                self.num_position_iterations,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
            );
            self.num_islands += 1;

            let island_bodies: Vec<BodyId> = self.island.bodies.clone();
            for id in island_bodies {
                self.sync_body_shapes(id);
            }
        }
    }

    /// Depth-first search over contact and joint links, fencing at static
    /// bodies: they join the island but their links are never expanded.
    fn build_island(&mut self, seed: BodyId) {
        self.island.clear();
        self.body_stack.clear();

        let body = self.bodies.get_mut(seed).unwrap();
        self.island.add_body(seed, body);
        self.body_stack.push(seed);

        while let Some(current) = self.body_stack.pop() {
            let contact_ids = self.bodies.get(current).unwrap().contacts.clone();
            for cid in contact_ids {
                let Some(contact) = self.contact_manager.contacts.get_mut(cid) else {
                    continue;
                };
                if contact.added_to_island || !contact.touching {
                    continue;
                }
                contact.added_to_island = true;
                self.island
                    .add_solver(SolverRef::Contact(cid), contact.position_correction);

                let other = if contact.body1 == current {
                    contact.body2
                } else {
                    contact.body1
                };
                let other_body = self.bodies.get_mut(other).unwrap();
                if other_body.added_to_island {
                    continue;
                }
                self.island.add_body(other, other_body);
                if !other_body.is_static() {
                    self.body_stack.push(other);
                }
            }

            let joint_ids = self.bodies.get(current).unwrap().joints.clone();
            for jid in joint_ids {
                let Some(joint) = self.joints.get_mut(jid) else {
                    continue;
                };
                if joint.added_to_island {
                    continue;
                }
                joint.added_to_island = true;
                self.island
                    .add_solver(SolverRef::Joint(jid), joint.position_correction);

                let other = if joint.body1 == current {
                    joint.body2
                } else {
                    joint.body1
                };
                let other_body = self.bodies.get_mut(other).unwrap();
                if other_body.added_to_island {
                    continue;
                }
                self.island.add_body(other, other_body);
                if !other_body.is_static() {
                    self.body_stack.push(other);
                }
            }
        }
    }

    /// Recomputes shape transforms and AABBs from the body's motion and
    /// forwards them to the broad phase.
    fn sync_body_shapes(&mut self, body: BodyId) {
        let Some(b) = self.bodies.get(body) else {
            return;
        };
        let prev = b.prev_transform;
        let current = b.transform;
        let shape_ids = b.shapes.clone();
        for sid in shape_ids {
            let Some(shape) = self.shapes.get_mut(sid) else {
                continue;
            };
            shape.sync(&prev, &current);
            let aabb = shape.aabb;
            let displacement = shape.displacement;
            if let Some(proxy) = shape.proxy {
                self.broad_phase.move_proxy(proxy, &aabb, displacement);
            }
        }
    }

    // --- queries ---

    /// Casts the segment `begin..end` against every shape, invoking the
    /// callback for each hit in broad-phase order.
    pub fn ray_cast(
        &mut self,
        begin: Vec3,
        end: Vec3,
        callback: &mut dyn FnMut(&Shape, &RayCastHit),
    ) {
        let shapes = &self.shapes;
        let narrowphase = &mut self.narrowphase;
        self.broad_phase.ray_cast(begin, end, &mut |sid| {
            let Some(shape) = shapes.get(sid) else {
                return;
            };
            let hit = if shape.geometry.uses_gjk_ray_cast() {
                let mut hit = RayCastHit::default();
                narrowphase
                    .gjk
                    .ray_cast(&shape.geometry, &shape.transform, begin, end, &mut hit)
                    .then_some(hit)
            } else {
                shape.geometry.ray_cast(begin, end, &shape.transform)
            };
            if let Some(hit) = hit {
                callback(shape, &hit);
            }
        });
    }

    /// Closest hit of a ray cast, if any.
    pub fn ray_cast_closest(&mut self, begin: Vec3, end: Vec3) -> Option<(BodyId, RayCastHit)> {
        let mut closest: Option<(BodyId, RayCastHit)> = None;
        self.ray_cast(begin, end, &mut |shape, hit| {
            if closest.is_none() || hit.fraction < closest.as_ref().unwrap().1.fraction {
                closest = Some((shape.body(), *hit));
            }
        });
        closest
    }

    /// Sweeps `convex` from `begin` along `translation`, reporting each
    /// shape the sweep can reach along with its time of impact.
    pub fn convex_cast(
        &mut self,
        convex: &Geometry,
        begin: &Transform,
        translation: Vec3,
        callback: &mut dyn FnMut(&Shape, &RayCastHit),
    ) {
        let shapes = &self.shapes;
        let narrowphase = &mut self.narrowphase;
        self.broad_phase
            .convex_cast(convex, begin, translation, &mut |sid| {
                let Some(shape) = shapes.get(sid) else {
                    return;
                };
                let mut hit = RayCastHit::default();
                if narrowphase.gjk.convex_cast(
                    Some(convex),
                    &shape.geometry,
                    begin,
                    &shape.transform,
                    translation,
                    Vec3::ZERO,
                    &mut hit,
                ) {
                    callback(shape, &hit);
                }
            });
    }

    /// Reports every shape whose AABB overlaps `aabb`.
    pub fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(&Shape)) {
        let shapes = &self.shapes;
        self.broad_phase.aabb_test(aabb, &mut |sid| {
            if let Some(shape) = shapes.get(sid) {
                if shape.aabb.overlaps(aabb) {
                    callback(shape);
                }
            }
        });
    }

    // --- debug draw ---

    /// Emits world geometry into the registered debug-draw sink: shape
    /// AABBs, contact points, and contact normals.
    pub fn draw_debug(&mut self) {
        let Some(draw) = self.debug_draw.as_mut() else {
            return;
        };
        for shape in self.shapes.iter() {
            let Aabb { min, max } = shape.aabb;
            let corners = [
                Vec3::new(min.x, min.y, min.z),
                Vec3::new(max.x, min.y, min.z),
                Vec3::new(max.x, max.y, min.z),
                Vec3::new(min.x, max.y, min.z),
                Vec3::new(min.x, min.y, max.z),
                Vec3::new(max.x, min.y, max.z),
                Vec3::new(max.x, max.y, max.z),
                Vec3::new(min.x, max.y, max.z),
            ];
            const EDGES: [(usize, usize); 12] = [
                (0, 1),
                (1, 2),
                (2, 3),
                (3, 0),
                (4, 5),
                (5, 6),
                (6, 7),
                (7, 4),
                (0, 4),
                (1, 5),
                (2, 6),
                (3, 7),
            ];
            for (a, b) in EDGES {
                draw.line(corners[a], corners[b]);
            }
        }
        for contact in self.contact_manager.contacts.iter() {
            if !contact.touching {
                continue;
            }
            let manifold = contact.manifold();
            for p in &manifold.points[..manifold.num_points] {
                draw.point(p.pos1);
                draw.line(p.pos1, p.pos1 + manifold.normal * 0.3);
            }
        }
        debug!("debug draw emitted");
    }
}
