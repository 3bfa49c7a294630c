//! Joints: the common solver contract plus the spherical anchor joint.

use crate::config::{
    JOINT_WARM_STARTING_FACTOR, POSITION_NGS_BAUMGARTE, POSITION_SPLIT_IMPULSE_BAUMGARTE,
    VELOCITY_BAUMGARTE,
};
use crate::core::rigidbody::RigidBody;
use crate::core::shape::BodyId;
use crate::dynamics::contact::PositionCorrection;
use crate::dynamics::TimeStep;
use crate::utils::math::{skew, Mat3, Vec3};

/// Creation parameters of a [`Joint`].
#[derive(Debug, Clone)]
pub struct JointConfig {
    pub body1: BodyId,
    pub body2: BodyId,
    /// Anchor in the first body's local frame.
    pub local_anchor1: Vec3,
    /// Anchor in the second body's local frame.
    pub local_anchor2: Vec3,
    /// Whether the connected bodies may still collide with each other.
    pub allow_collision: bool,
    pub position_correction: PositionCorrection,
}

impl JointConfig {
    pub fn spherical(body1: BodyId, body2: BodyId) -> Self {
        Self {
            body1,
            body2,
            local_anchor1: Vec3::ZERO,
            local_anchor2: Vec3::ZERO,
            allow_collision: false,
            position_correction: PositionCorrection::Baumgarte,
        }
    }
}

/// A spherical (ball-and-socket) joint pinning one anchor point of each
/// body together. Implements the same solver entry points as the contact
/// constraint and coexists with contacts in an island.
pub struct Joint {
    pub(crate) body1: BodyId,
    pub(crate) body2: BodyId,
    pub(crate) allow_collision: bool,
    pub(crate) position_correction: PositionCorrection,
    pub(crate) added_to_island: bool,

    local_anchor1: Vec3,
    local_anchor2: Vec3,

    /// Accumulated velocity-constraint impulse, persisted for warm starts.
    impulse: Vec3,
    pseudo_impulse: Vec3,

    // per-step solver data
    rel1: Vec3,
    rel2: Vec3,
    inv_mass_matrix: Mat3,
    bias: Vec3,
}

impl Joint {
    pub fn new(config: &JointConfig) -> Self {
        Self {
            body1: config.body1,
            body2: config.body2,
            allow_collision: config.allow_collision,
            position_correction: config.position_correction,
            added_to_island: false,
            local_anchor1: config.local_anchor1,
            local_anchor2: config.local_anchor2,
            impulse: Vec3::ZERO,
            pseudo_impulse: Vec3::ZERO,
            rel1: Vec3::ZERO,
            rel2: Vec3::ZERO,
            inv_mass_matrix: Mat3::ZERO,
            bias: Vec3::ZERO,
        }
    }

    pub fn body1(&self) -> BodyId {
        self.body1
    }

    pub fn body2(&self) -> BodyId {
        self.body2
    }

    pub fn allow_collision(&self) -> bool {
        self.allow_collision
    }

    /// Positional error of the anchors, first body relative to second.
    fn position_error(&self, b1: &RigidBody, b2: &RigidBody) -> Vec3 {
        (b1.transform.position + self.rel1) - (b2.transform.position + self.rel2)
    }

    fn update_anchors_and_mass(&mut self, b1: &RigidBody, b2: &RigidBody) {
        self.rel1 = b1.transform.rotation * self.local_anchor1;
        self.rel2 = b2.transform.rotation * self.local_anchor2;

        let s1 = skew(self.rel1);
        let s2 = skew(self.rel2);
        let k = Mat3::from_diagonal(Vec3::splat(b1.inv_mass + b2.inv_mass))
            - s1 * b1.inv_inertia * s1
            - s2 * b2.inv_inertia * s2;
        self.inv_mass_matrix = if k.determinant().abs() > 1e-12 {
            k.inverse()
        } else {
            Mat3::ZERO
        };
    }

    /// Velocity of the first anchor relative to the second.
    fn relative_velocity(&self, b1: &RigidBody, b2: &RigidBody) -> Vec3 {
        (b1.vel + b1.ang_vel.cross(self.rel1)) - (b2.vel + b2.ang_vel.cross(self.rel2))
    }

    fn apply_impulse_pair(&self, impulse: Vec3, b1: &mut RigidBody, b2: &mut RigidBody) {
        b1.vel += impulse * b1.inv_mass;
        b1.ang_vel += b1.inv_inertia * self.rel1.cross(impulse);
        b2.vel -= impulse * b2.inv_mass;
        b2.ang_vel -= b2.inv_inertia * self.rel2.cross(impulse);
    }

    pub(crate) fn pre_solve_velocity(
        &mut self,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
        time_step: &TimeStep,
    ) {
        self.update_anchors_and_mass(b1, b2);
        self.bias = if self.position_correction == PositionCorrection::Baumgarte {
            self.position_error(b1, b2) * (VELOCITY_BAUMGARTE * time_step.inv_dt)
        } else {
            Vec3::ZERO
        };
    }

    pub(crate) fn warm_start(
        &mut self,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
        time_step: &TimeStep,
    ) {
        self.impulse *= JOINT_WARM_STARTING_FACTOR * time_step.dt_ratio;
        let impulse = self.impulse;
        self.apply_impulse_pair(impulse, b1, b2);
    }

    pub(crate) fn solve_velocity(&mut self, b1: &mut RigidBody, b2: &mut RigidBody) {
        let rv = self.relative_velocity(b1, b2);
        let delta = self.inv_mass_matrix * -(rv + self.bias);
        self.impulse += delta;
        self.apply_impulse_pair(delta, b1, b2);
    }

    pub(crate) fn pre_solve_position(&mut self, b1: &mut RigidBody, b2: &mut RigidBody) {
        self.update_anchors_and_mass(b1, b2);
        self.pseudo_impulse = Vec3::ZERO;
    }

    pub(crate) fn solve_position_split_impulse(
        &mut self,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        let error = self.position_error(b1, b2);
        let rv = (b1.pseudo_vel + b1.ang_pseudo_vel.cross(self.rel1))
            - (b2.pseudo_vel + b2.ang_pseudo_vel.cross(self.rel2));
        let delta =
            self.inv_mass_matrix * -(rv + error * POSITION_SPLIT_IMPULSE_BAUMGARTE);
        self.pseudo_impulse += delta;

        b1.pseudo_vel += delta * b1.inv_mass;
        b1.ang_pseudo_vel += b1.inv_inertia * self.rel1.cross(delta);
        b2.pseudo_vel -= delta * b2.inv_mass;
        b2.ang_pseudo_vel -= b2.inv_inertia * self.rel2.cross(delta);
    }

    pub(crate) fn solve_position_ngs(&mut self, b1: &mut RigidBody, b2: &mut RigidBody) {
        self.update_anchors_and_mass(b1, b2);
        let error = self.position_error(b1, b2);
        let impulse = self.inv_mass_matrix * -(error * POSITION_NGS_BAUMGARTE);

        b1.apply_translation(impulse * b1.inv_mass);
        b1.apply_rotation(b1.inv_inertia * self.rel1.cross(impulse));
        b2.apply_translation(-(impulse * b2.inv_mass));
        b2.apply_rotation(-(b2.inv_inertia * self.rel2.cross(impulse)));
    }

    pub(crate) fn post_solve(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::geometry::Geometry;
    use crate::core::rigidbody::{RigidBodyConfig, RigidBodyKind};
    use crate::core::shape::{Shape, ShapeConfig};
    use crate::utils::allocator::{Arena, Id};

    fn make_body(position: Vec3, kind: RigidBodyKind) -> RigidBody {
        let mut shapes = Arena::new();
        let mut body = RigidBody::new(&RigidBodyConfig {
            position,
            kind,
            ..Default::default()
        });
        let sid = shapes.insert(Shape::new(
            &ShapeConfig::with_geometry(Geometry::cuboid(Vec3::splat(0.5))),
            Id::new(0, 0),
            0,
        ));
        body.shapes.push(sid);
        body.update_mass(&shapes);
        body
    }

    #[test]
    fn joint_removes_relative_anchor_velocity() {
        let mut b1 = make_body(Vec3::ZERO, RigidBodyKind::Dynamic);
        let mut b2 = make_body(Vec3::new(2.0, 0.0, 0.0), RigidBodyKind::Dynamic);
        b2.vel = Vec3::new(0.0, -3.0, 0.0);

        let mut joint = Joint::new(&JointConfig {
            body1: Id::new(0, 0),
            body2: Id::new(1, 0),
            local_anchor1: Vec3::new(1.0, 0.0, 0.0),
            local_anchor2: Vec3::new(-1.0, 0.0, 0.0),
            allow_collision: false,
            position_correction: PositionCorrection::Baumgarte,
        });

        let ts = TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
        };
        joint.pre_solve_velocity(&mut b1, &mut b2, &ts);
        joint.warm_start(&mut b1, &mut b2, &ts);
        for _ in 0..10 {
            joint.solve_velocity(&mut b1, &mut b2);
        }

        let rv = joint.relative_velocity(&b1, &b2);
        assert!(rv.length() < 1e-6, "residual velocity {rv:?}");
    }

    #[test]
    fn ngs_pass_pulls_anchors_together() {
        let mut b1 = make_body(Vec3::ZERO, RigidBodyKind::Static);
        let mut b2 = make_body(Vec3::new(2.5, 0.0, 0.0), RigidBodyKind::Dynamic);

        let mut joint = Joint::new(&JointConfig {
            body1: Id::new(0, 0),
            body2: Id::new(1, 0),
            local_anchor1: Vec3::new(1.0, 0.0, 0.0),
            local_anchor2: Vec3::new(-1.0, 0.0, 0.0),
            allow_collision: false,
            position_correction: PositionCorrection::Ngs,
        });

        joint.pre_solve_position(&mut b1, &mut b2);
        let before = joint.position_error(&b1, &b2).length();
        for _ in 0..5 {
            joint.solve_position_ngs(&mut b1, &mut b2);
        }
        joint.update_anchors_and_mass(&b1, &b2);
        let after = joint.position_error(&b1, &b2).length();
        assert!(after < before, "{after} should be < {before}");
        // the static side never moved
        assert_eq!(b1.position(), Vec3::ZERO);
    }
}
