//! Rigid bodies: kinematic state, mass assembly, integration, sleeping.

use serde::{Deserialize, Serialize};

use crate::config::{
    MAX_ROTATION_PER_STEP, MAX_TRANSLATION_PER_STEP, SLEEPING_ANGULAR_VELOCITY_THRESHOLD,
    SLEEPING_TIME_THRESHOLD, SLEEPING_VELOCITY_THRESHOLD,
};
use crate::core::shape::{Shape, ShapeId};
use crate::utils::allocator::{Arena, Id};
use crate::utils::math::{parallel_axis, Mat3, Quat, Real, Transform, Vec3};

pub type ContactId = Id<crate::dynamics::contact::Contact>;
pub type JointId = Id<crate::dynamics::joint::Joint>;

/// Motion type of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RigidBodyKind {
    /// Simulated: forces, contacts, and joints all apply.
    #[default]
    Dynamic,
    /// Never moves; infinite effective mass.
    Static,
    /// Follows its user-set velocity; unaffected by constraints.
    Kinematic,
}

/// Creation parameters of a [`RigidBody`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyConfig {
    pub position: Vec3,
    pub rotation: Mat3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub kind: RigidBodyKind,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub gravity_scale: Real,
    /// Per-axis scale applied to the inverse inertia; zeroing an axis locks
    /// rotation about it.
    pub rotation_factor: Vec3,
    pub auto_sleep: bool,
    pub sleeping_velocity_threshold: Real,
    pub sleeping_angular_velocity_threshold: Real,
    pub sleeping_time_threshold: Real,
}

impl Default for RigidBodyConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            kind: RigidBodyKind::Dynamic,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            rotation_factor: Vec3::ONE,
            auto_sleep: true,
            sleeping_velocity_threshold: SLEEPING_VELOCITY_THRESHOLD,
            sleeping_angular_velocity_threshold: SLEEPING_ANGULAR_VELOCITY_THRESHOLD,
            sleeping_time_threshold: SLEEPING_TIME_THRESHOLD,
        }
    }
}

/// Scales the rows of `m` by the components of `v`.
fn scale_rows(m: Mat3, v: Vec3) -> Mat3 {
    Mat3::from_diagonal(v) * m
}

/// A rigid body. Create one through [`World::add_body`], attach shapes with
/// [`World::add_shape`].
///
/// [`World::add_body`]: crate::world::World::add_body
/// [`World::add_shape`]: crate::world::World::add_shape
#[derive(Debug)]
pub struct RigidBody {
    pub(crate) transform: Transform,
    pub(crate) prev_transform: Transform,

    pub(crate) vel: Vec3,
    pub(crate) ang_vel: Vec3,
    pub(crate) pseudo_vel: Vec3,
    pub(crate) ang_pseudo_vel: Vec3,

    kind: RigidBodyKind,

    pub(crate) mass: Real,
    pub(crate) inv_mass: Real,
    pub(crate) local_inertia: Mat3,
    pub(crate) inv_local_inertia: Mat3,
    inv_local_inertia_without_rot_factor: Mat3,
    pub(crate) inv_inertia: Mat3,
    pub(crate) rotation_factor: Vec3,

    pub linear_damping: Real,
    pub angular_damping: Real,
    pub gravity_scale: Real,

    pub(crate) force: Vec3,
    pub(crate) torque: Vec3,

    /// Total linear impulse applied by contacts last step, for inspection.
    pub(crate) linear_contact_impulse: Vec3,
    /// Total angular impulse applied by contacts last step, for inspection.
    pub(crate) angular_contact_impulse: Vec3,

    pub(crate) sleeping: bool,
    pub(crate) sleep_time: Real,
    pub auto_sleep: bool,
    pub sleeping_velocity_threshold: Real,
    pub sleeping_angular_velocity_threshold: Real,
    pub sleeping_time_threshold: Real,

    pub(crate) shapes: Vec<ShapeId>,
    pub(crate) contacts: Vec<ContactId>,
    pub(crate) joints: Vec<JointId>,
    pub(crate) added_to_island: bool,
}

impl RigidBody {
    pub fn new(config: &RigidBodyConfig) -> Self {
        Self {
            transform: Transform::new(config.position, config.rotation),
            prev_transform: Transform::new(config.position, config.rotation),
            vel: config.linear_velocity,
            ang_vel: config.angular_velocity,
            pseudo_vel: Vec3::ZERO,
            ang_pseudo_vel: Vec3::ZERO,
            kind: config.kind,
            mass: 0.0,
            inv_mass: 0.0,
            local_inertia: Mat3::ZERO,
            inv_local_inertia: Mat3::ZERO,
            inv_local_inertia_without_rot_factor: Mat3::ZERO,
            inv_inertia: Mat3::ZERO,
            rotation_factor: config.rotation_factor,
            linear_damping: config.linear_damping,
            angular_damping: config.angular_damping,
            gravity_scale: config.gravity_scale,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            linear_contact_impulse: Vec3::ZERO,
            angular_contact_impulse: Vec3::ZERO,
            sleeping: false,
            sleep_time: 0.0,
            auto_sleep: config.auto_sleep,
            sleeping_velocity_threshold: config.sleeping_velocity_threshold,
            sleeping_angular_velocity_threshold: config.sleeping_angular_velocity_threshold,
            sleeping_time_threshold: config.sleeping_time_threshold,
            shapes: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            added_to_island: false,
        }
    }

    pub fn kind(&self) -> RigidBodyKind {
        self.kind
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == RigidBodyKind::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.kind == RigidBodyKind::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.kind == RigidBodyKind::Kinematic
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn orientation(&self) -> Quat {
        self.transform.orientation()
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.prev_transform.position = position;
        self.wake_up();
    }

    pub fn set_rotation(&mut self, rotation: Mat3) {
        self.transform.rotation = rotation;
        self.prev_transform.rotation = rotation;
        self.update_inv_inertia();
        self.wake_up();
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.vel
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.ang_vel
    }

    pub fn set_linear_velocity(&mut self, vel: Vec3) {
        if self.is_static() {
            return;
        }
        self.vel = vel;
        self.wake_up();
    }

    pub fn set_angular_velocity(&mut self, ang_vel: Vec3) {
        if self.is_static() {
            return;
        }
        self.ang_vel = ang_vel;
        self.wake_up();
    }

    pub fn mass(&self) -> Real {
        self.mass
    }

    pub fn inv_mass(&self) -> Real {
        self.inv_mass
    }

    /// Inertia tensor about the body origin, in the body frame.
    pub fn local_inertia(&self) -> Mat3 {
        self.local_inertia
    }

    /// Inverse local inertia with the rotation factor applied.
    pub fn inv_local_inertia(&self) -> Mat3 {
        self.inv_local_inertia
    }

    pub fn sleeping(&self) -> bool {
        self.sleeping
    }

    /// Contact impulse accumulated over the last step, for inspection.
    pub fn contact_impulses(&self) -> (Vec3, Vec3) {
        (self.linear_contact_impulse, self.angular_contact_impulse)
    }

    pub fn get_world_point(&self, local: Vec3) -> Vec3 {
        self.transform.point_to_world(local)
    }

    pub fn get_local_point(&self, world: Vec3) -> Vec3 {
        self.transform.point_to_local(world)
    }

    pub fn apply_force(&mut self, force: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        self.wake_up();
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.torque += torque;
        self.wake_up();
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.vel += impulse * self.inv_mass;
        let torque = (world_point - self.transform.position).cross(impulse);
        self.ang_vel += self.inv_inertia * torque;
        self.wake_up();
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.ang_vel += self.inv_inertia * impulse;
        self.wake_up();
    }

    pub fn wake_up(&mut self) {
        self.sleeping = false;
        self.sleep_time = 0.0;
    }

    pub fn sleep(&mut self) {
        self.vel = Vec3::ZERO;
        self.ang_vel = Vec3::ZERO;
        self.pseudo_vel = Vec3::ZERO;
        self.ang_pseudo_vel = Vec3::ZERO;
        self.sleeping = true;
        self.sleep_time = 0.0;
    }

    pub(crate) fn is_sleepy(&self) -> bool {
        self.auto_sleep
            && self.vel.length_squared()
                < self.sleeping_velocity_threshold * self.sleeping_velocity_threshold
            && self.ang_vel.length_squared()
                < self.sleeping_angular_velocity_threshold
                    * self.sleeping_angular_velocity_threshold
    }

    pub(crate) fn is_alone(&self) -> bool {
        self.contacts.is_empty() && self.joints.is_empty()
    }

    /// Rebuilds mass, local inertia, and their inverses from the attached
    /// shapes.
    pub(crate) fn update_mass(&mut self, shapes: &Arena<Shape>) {
        let mut total_inertia = Mat3::ZERO;
        let mut total_mass = 0.0;

        for shape_id in &self.shapes {
            let Some(shape) = shapes.get(*shape_id) else {
                continue;
            };
            let geom = &shape.geometry;
            let mass = shape.density * geom.volume();

            // inertia about the body origin: rotate the coefficient into the
            // body frame and translate with the parallel-axis term
            let rot = shape.local_transform.rotation;
            let inertia = rot * geom.inertia_coeff() * rot.transpose() * mass
                + parallel_axis(shape.local_transform.position) * mass;

            total_mass += mass;
            total_inertia += inertia;
        }

        self.mass = total_mass;
        self.local_inertia = total_inertia;

        if self.is_dynamic() && self.mass > 0.0 && self.local_inertia.determinant() > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            self.inv_local_inertia_without_rot_factor = self.local_inertia.inverse();
            self.inv_local_inertia = scale_rows(
                self.inv_local_inertia_without_rot_factor,
                self.rotation_factor,
            );
        } else {
            self.inv_mass = 0.0;
            self.inv_local_inertia = Mat3::ZERO;
            self.inv_local_inertia_without_rot_factor = Mat3::ZERO;
            if self.is_dynamic() {
                // a shapeless or degenerate dynamic body still needs finite
                // response to avoid immediate divergence
                self.inv_mass = 1e-9;
                self.inv_local_inertia = Mat3::from_diagonal(Vec3::splat(1e-9));
            }
        }

        self.update_inv_inertia();
        self.wake_up();
    }

    pub(crate) fn update_inv_inertia(&mut self) {
        let r = self.transform.rotation;
        self.inv_inertia = scale_rows(
            r * self.inv_local_inertia_without_rot_factor * r.transpose(),
            self.rotation_factor,
        );
        if !self.is_dynamic() {
            self.inv_inertia = Mat3::ZERO;
        }
    }

    /// Advances position and orientation by the current velocities.
    pub(crate) fn integrate(&mut self, dt: Real) {
        match self.kind {
            RigidBodyKind::Dynamic | RigidBodyKind::Kinematic => {
                let mut translation = self.vel * dt;
                let mut rotation = self.ang_vel * dt;

                let t_len2 = translation.length_squared();
                if t_len2 > MAX_TRANSLATION_PER_STEP * MAX_TRANSLATION_PER_STEP {
                    translation *= MAX_TRANSLATION_PER_STEP / t_len2.sqrt();
                }
                let r_len2 = rotation.length_squared();
                if r_len2 > MAX_ROTATION_PER_STEP * MAX_ROTATION_PER_STEP {
                    rotation *= MAX_ROTATION_PER_STEP / r_len2.sqrt();
                }

                self.apply_translation(translation);
                self.apply_rotation(rotation);
            }
            RigidBodyKind::Static => {
                self.vel = Vec3::ZERO;
                self.ang_vel = Vec3::ZERO;
                self.pseudo_vel = Vec3::ZERO;
                self.ang_pseudo_vel = Vec3::ZERO;
            }
        }
    }

    /// Applies and clears the accumulated pseudo velocities of the
    /// split-impulse position solver.
    pub(crate) fn integrate_pseudo_velocity(&mut self) {
        if self.pseudo_vel.length_squared() == 0.0 && self.ang_pseudo_vel.length_squared() == 0.0
        {
            return;
        }
        if !self.is_static() {
            let translation = self.pseudo_vel;
            let rotation = self.ang_pseudo_vel;
            self.apply_translation(translation);
            self.apply_rotation(rotation);
        }
        self.pseudo_vel = Vec3::ZERO;
        self.ang_pseudo_vel = Vec3::ZERO;
    }

    pub(crate) fn apply_translation(&mut self, translation: Vec3) {
        self.transform.position += translation;
    }

    /// Rotates the body by the rotation vector `rotation` (axis times
    /// angle), keeping the orientation quaternion unit length.
    pub(crate) fn apply_rotation(&mut self, rotation: Vec3) {
        let theta = rotation.length();
        let half_theta = theta * 0.5;

        // sin(θ/2)/θ and cos(θ/2), Maclaurin-expanded near zero
        let (sin_axis_factor, cos_half) = if half_theta < 0.5 {
            let ht2 = half_theta * half_theta;
            (
                0.5 * (1.0 - ht2 * (1.0 / 6.0) + ht2 * ht2 * (1.0 / 120.0)),
                1.0 - ht2 * 0.5 + ht2 * ht2 * (1.0 / 24.0),
            )
        } else {
            (half_theta.sin() / theta, half_theta.cos())
        };

        let sin_axis = rotation * sin_axis_factor;
        let dq = Quat::from_xyzw(sin_axis.x, sin_axis.y, sin_axis.z, cos_half);
        let q = (dq * self.transform.orientation()).normalize();
        self.transform.rotation = Mat3::from_quat(q);
        self.update_inv_inertia();
    }
}

/// Convenience helpers mirroring the config fields.
impl RigidBody {
    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }
}
