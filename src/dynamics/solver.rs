//! Projected Gauss–Seidel contact constraint solver.
//!
//! Each manifold point contributes one row with three Jacobians (normal,
//! tangent, binormal). Velocity sweeps clamp friction to the cone spanned by
//! the accumulated normal impulse; position error is resolved by Baumgarte
//! feedback, split impulses on pseudo velocities, or a nonlinear
//! Gauss–Seidel sweep, chosen per contact.

use crate::collision::contact::Manifold;
use crate::config::{
    CONTACT_ENABLE_BOUNCE_THRESHOLD, LINEAR_SLOP, MAX_MANIFOLD_POINTS,
    POSITION_NGS_BAUMGARTE, POSITION_SPLIT_IMPULSE_BAUMGARTE, VELOCITY_BAUMGARTE,
};
use crate::core::rigidbody::RigidBody;
use crate::core::shape::BodyId;
use crate::dynamics::contact::PositionCorrection;
use crate::dynamics::TimeStep;
use crate::utils::math::{Real, Vec3};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JacobianRow {
    pub lin1: Vec3,
    pub lin2: Vec3,
    pub ang1: Vec3,
    pub ang2: Vec3,
}

/// One solver row: Jacobians, right-hand side, and the manifold point whose
/// impulses it accumulates into.
#[derive(Debug, Clone, Copy, Default)]
struct SolverInfoRow {
    jacobian_n: JacobianRow,
    jacobian_t: JacobianRow,
    jacobian_b: JacobianRow,
    rhs: Real,
    /// Constraint force mixing; reserved, currently always zero.
    #[allow(dead_code)]
    cfm: Real,
    friction: Real,
    point_index: usize,
}

/// Precomputed mass data of one row.
#[derive(Debug, Clone, Copy, Default)]
struct MassDataRow {
    inv_m_lin_n1: Vec3,
    inv_m_lin_n2: Vec3,
    inv_m_ang_n1: Vec3,
    inv_m_ang_n2: Vec3,

    inv_m_lin_t1: Vec3,
    inv_m_lin_t2: Vec3,
    inv_m_ang_t1: Vec3,
    inv_m_ang_t2: Vec3,

    inv_m_lin_b1: Vec3,
    inv_m_lin_b2: Vec3,
    inv_m_ang_b1: Vec3,
    inv_m_ang_b2: Vec3,

    /// Effective mass of the normal row; zero when the row is degenerate.
    mass_n: Real,

    /// Inverse 2×2 effective-mass matrix of the tangent/binormal pair.
    mass_tb00: Real,
    mass_tb01: Real,
    mass_tb10: Real,
    mass_tb11: Real,
}

/// The contact constraint of one manifold. Impulses persist inside the
/// manifold points; this holds the per-step Jacobians and mass data.
pub struct ContactConstraint {
    pub(crate) body1: BodyId,
    pub(crate) body2: BodyId,
    rows: [SolverInfoRow; MAX_MANIFOLD_POINTS],
    mass_data: [MassDataRow; MAX_MANIFOLD_POINTS],
    num_rows: usize,
    pub(crate) friction: Real,
    pub(crate) restitution: Real,
    /// The contact's position-correction algorithm; Baumgarte folds its
    /// correction into the velocity right-hand side.
    pub(crate) position_correction: PositionCorrection,
}

impl ContactConstraint {
    pub(crate) fn new(body1: BodyId, body2: BodyId) -> Self {
        Self {
            body1,
            body2,
            rows: [SolverInfoRow::default(); MAX_MANIFOLD_POINTS],
            mass_data: [MassDataRow::default(); MAX_MANIFOLD_POINTS],
            num_rows: 0,
            friction: 0.0,
            restitution: 0.0,
            position_correction: PositionCorrection::Baumgarte,
        }
    }

    /// Combined coefficients of the two shapes, mixed geometrically.
    pub(crate) fn set_materials(&mut self, f1: Real, f2: Real, r1: Real, r2: Real) {
        self.friction = (f1 * f2).sqrt();
        self.restitution = (r1 * r2).sqrt();
    }

    fn fill_rows(&mut self, manifold: &Manifold, with_friction: bool) {
        self.num_rows = 0;
        for (i, p) in manifold.points[..manifold.num_points].iter().enumerate() {
            if p.disabled || p.depth < 0.0 {
                continue;
            }
            let row = &mut self.rows[self.num_rows];
            self.num_rows += 1;
            row.point_index = i;

            row.jacobian_n = JacobianRow {
                lin1: manifold.normal,
                lin2: manifold.normal,
                ang1: p.rel_pos1.cross(manifold.normal),
                ang2: p.rel_pos2.cross(manifold.normal),
            };
            if with_friction {
                row.jacobian_t = JacobianRow {
                    lin1: manifold.tangent,
                    lin2: manifold.tangent,
                    ang1: p.rel_pos1.cross(manifold.tangent),
                    ang2: p.rel_pos2.cross(manifold.tangent),
                };
                row.jacobian_b = JacobianRow {
                    lin1: manifold.binormal,
                    lin2: manifold.binormal,
                    ang1: p.rel_pos1.cross(manifold.binormal),
                    ang2: p.rel_pos2.cross(manifold.binormal),
                };
            }
            row.friction = self.friction;
            row.cfm = 0.0;
        }
    }

    fn compute_normal_mass(&mut self, b1: &RigidBody, b2: &RigidBody) {
        for i in 0..self.num_rows {
            let j = self.rows[i].jacobian_n;
            let md = &mut self.mass_data[i];
            md.inv_m_lin_n1 = j.lin1 * b1.inv_mass;
            md.inv_m_lin_n2 = j.lin2 * b2.inv_mass;
            md.inv_m_ang_n1 = b1.inv_inertia * j.ang1;
            md.inv_m_ang_n2 = b2.inv_inertia * j.ang2;

            let mut mass = b1.inv_mass
                + b2.inv_mass
                + md.inv_m_ang_n1.dot(j.ang1)
                + md.inv_m_ang_n2.dot(j.ang2);
            if mass != 0.0 {
                mass = 1.0 / mass;
            }
            md.mass_n = mass;
        }
    }

    fn compute_friction_mass(&mut self, b1: &RigidBody, b2: &RigidBody) {
        for i in 0..self.num_rows {
            let jt = self.rows[i].jacobian_t;
            let jb = self.rows[i].jacobian_b;
            let md = &mut self.mass_data[i];

            md.inv_m_lin_t1 = jt.lin1 * b1.inv_mass;
            md.inv_m_lin_t2 = jt.lin2 * b2.inv_mass;
            md.inv_m_lin_b1 = jb.lin1 * b1.inv_mass;
            md.inv_m_lin_b2 = jb.lin2 * b2.inv_mass;
            md.inv_m_ang_t1 = b1.inv_inertia * jt.ang1;
            md.inv_m_ang_t2 = b2.inv_inertia * jt.ang2;
            md.inv_m_ang_b1 = b1.inv_inertia * jb.ang1;
            md.inv_m_ang_b2 = b2.inv_inertia * jb.ang2;

            // effective mass matrix of the coupled tangent/binormal pair
            let inv00 = b1.inv_mass
                + b2.inv_mass
                + md.inv_m_ang_t1.dot(jt.ang1)
                + md.inv_m_ang_t2.dot(jt.ang2);
            let inv01 = md.inv_m_ang_t1.dot(jb.ang1) + md.inv_m_ang_t2.dot(jb.ang2);
            let inv10 = inv01;
            let inv11 = b1.inv_mass
                + b2.inv_mass
                + md.inv_m_ang_b1.dot(jb.ang1)
                + md.inv_m_ang_b2.dot(jb.ang2);

            let mut inv_det = inv00 * inv11 - inv01 * inv10;
            if inv_det != 0.0 {
                inv_det = 1.0 / inv_det;
            }
            md.mass_tb00 = inv11 * inv_det;
            md.mass_tb01 = -inv01 * inv_det;
            md.mass_tb10 = -inv10 * inv_det;
            md.mass_tb11 = inv00 * inv_det;
        }
    }

    /// Builds the velocity rows: contact frame, Jacobians, mass data, and
    /// the restitution/Baumgarte right-hand side.
    pub(crate) fn pre_solve_velocity(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
        time_step: &TimeStep,
    ) {
        let normal = manifold.normal;
        manifold.build_basis(normal);

        self.fill_rows(manifold, true);
        self.compute_normal_mass(b1, b2);
        self.compute_friction_mass(b1, b2);

        for i in 0..self.num_rows {
            let row = &mut self.rows[i];
            let p = &mut manifold.points[row.point_index];

            // relative approach velocity along the normal
            let j = row.jacobian_n;
            let rvn = b1.vel.dot(j.lin1) - b2.vel.dot(j.lin2) + b1.ang_vel.dot(j.ang1)
                - b2.ang_vel.dot(j.ang2);

            row.rhs = if rvn < -CONTACT_ENABLE_BOUNCE_THRESHOLD && !p.warm_started {
                -rvn * self.restitution
            } else {
                0.0
            };
            if self.position_correction == PositionCorrection::Baumgarte && p.depth > LINEAR_SLOP
            {
                let baumgarte = (p.depth - LINEAR_SLOP) * VELOCITY_BAUMGARTE * time_step.inv_dt;
                if row.rhs < baumgarte {
                    row.rhs = baumgarte;
                }
            }

            if !p.warm_started {
                p.impulse.clear();
            }
        }
    }

    /// Applies last step's impulses, rescaled for variable step sizes.
    pub(crate) fn warm_start(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
        time_step: &TimeStep,
    ) {
        let mut lv1 = b1.vel;
        let mut lv2 = b2.vel;
        let mut av1 = b1.ang_vel;
        let mut av2 = b2.ang_vel;

        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let md = &self.mass_data[i];
            let imp = &mut manifold.points[row.point_index].impulse;

            // re-express the lateral impulse in this step's contact frame
            imp.impulse_t = imp.impulse_l.dot(row.jacobian_t.lin1);
            imp.impulse_b = imp.impulse_l.dot(row.jacobian_b.lin1);

            imp.impulse_n *= time_step.dt_ratio;
            imp.impulse_t *= time_step.dt_ratio;
            imp.impulse_b *= time_step.dt_ratio;

            let (n, t, b) = (imp.impulse_n, imp.impulse_t, imp.impulse_b);
            lv1 += md.inv_m_lin_n1 * n + md.inv_m_lin_t1 * t + md.inv_m_lin_b1 * b;
            lv2 -= md.inv_m_lin_n2 * n + md.inv_m_lin_t2 * t + md.inv_m_lin_b2 * b;
            av1 += md.inv_m_ang_n1 * n + md.inv_m_ang_t1 * t + md.inv_m_ang_b1 * b;
            av2 -= md.inv_m_ang_n2 * n + md.inv_m_ang_t2 * t + md.inv_m_ang_b2 * b;
        }

        b1.vel = lv1;
        b2.vel = lv2;
        b1.ang_vel = av1;
        b2.ang_vel = av2;
    }

    /// One projected Gauss–Seidel sweep: cone-clamped friction first, then
    /// the one-sided normal rows.
    pub(crate) fn solve_velocity(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        let mut lv1 = b1.vel;
        let mut lv2 = b2.vel;
        let mut av1 = b1.ang_vel;
        let mut av2 = b2.ang_vel;

        // friction
        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let md = &self.mass_data[i];
            let imp = &mut manifold.points[row.point_index].impulse;

            let jt = row.jacobian_t;
            let rvt =
                lv1.dot(jt.lin1) - lv2.dot(jt.lin2) + av1.dot(jt.ang1) - av2.dot(jt.ang2);
            let jb = row.jacobian_b;
            let rvb =
                lv1.dot(jb.lin1) - lv2.dot(jb.lin2) + av1.dot(jb.ang1) - av2.dot(jb.ang2);

            let mut impulse_t = -(rvt * md.mass_tb00 + rvb * md.mass_tb01);
            let mut impulse_b = -(rvt * md.mass_tb10 + rvb * md.mass_tb11);
            let old_t = imp.impulse_t;
            let old_b = imp.impulse_b;
            imp.impulse_t += impulse_t;
            imp.impulse_b += impulse_b;

            // clamp the friction impulse to the cone
            let max_impulse = row.friction * imp.impulse_n;
            if max_impulse == 0.0 {
                imp.impulse_t = 0.0;
                imp.impulse_b = 0.0;
            } else {
                let len2 = imp.impulse_t * imp.impulse_t + imp.impulse_b * imp.impulse_b;
                if len2 > max_impulse * max_impulse {
                    let inv_len = max_impulse / len2.sqrt();
                    imp.impulse_t *= inv_len;
                    imp.impulse_b *= inv_len;
                }
            }

            impulse_t = imp.impulse_t - old_t;
            impulse_b = imp.impulse_b - old_b;

            lv1 += md.inv_m_lin_t1 * impulse_t + md.inv_m_lin_b1 * impulse_b;
            lv2 -= md.inv_m_lin_t2 * impulse_t + md.inv_m_lin_b2 * impulse_b;
            av1 += md.inv_m_ang_t1 * impulse_t + md.inv_m_ang_b1 * impulse_b;
            av2 -= md.inv_m_ang_t2 * impulse_t + md.inv_m_ang_b2 * impulse_b;
        }

        // normal
        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let md = &self.mass_data[i];
            let imp = &mut manifold.points[row.point_index].impulse;

            let j = row.jacobian_n;
            let rvn = lv1.dot(j.lin1) - lv2.dot(j.lin2) + av1.dot(j.ang1) - av2.dot(j.ang2);

            let mut impulse_n = (row.rhs - rvn) * md.mass_n;
            let old_n = imp.impulse_n;
            imp.impulse_n = (imp.impulse_n + impulse_n).max(0.0);
            impulse_n = imp.impulse_n - old_n;

            lv1 += md.inv_m_lin_n1 * impulse_n;
            lv2 -= md.inv_m_lin_n2 * impulse_n;
            av1 += md.inv_m_ang_n1 * impulse_n;
            av2 -= md.inv_m_ang_n2 * impulse_n;
        }

        b1.vel = lv1;
        b2.vel = lv2;
        b1.ang_vel = av1;
        b2.ang_vel = av2;
    }

    /// Rebuilds position rows against the current transforms: manifold sync,
    /// normal Jacobians, `max(depth − slop, 0)` right-hand sides.
    fn update_position_data(&mut self, manifold: &mut Manifold, b1: &RigidBody, b2: &RigidBody) {
        manifold.update_depths_and_positions(&b1.transform, &b2.transform);

        self.fill_rows(manifold, false);
        for i in 0..self.num_rows {
            let depth = manifold.points[self.rows[i].point_index].depth;
            self.rows[i].rhs = (depth - LINEAR_SLOP).max(0.0);
        }
        self.compute_normal_mass(b1, b2);
    }

    pub(crate) fn pre_solve_position(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        self.update_position_data(manifold, b1, b2);
        for i in 0..self.num_rows {
            manifold.points[self.rows[i].point_index].impulse.impulse_p = 0.0;
        }
    }

    /// One sweep accumulating pseudo velocities toward zero positional
    /// error.
    pub(crate) fn solve_position_split_impulse(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        let mut lv1 = b1.pseudo_vel;
        let mut lv2 = b2.pseudo_vel;
        let mut av1 = b1.ang_pseudo_vel;
        let mut av2 = b2.ang_pseudo_vel;

        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let md = &self.mass_data[i];
            let imp = &mut manifold.points[row.point_index].impulse;

            let j = row.jacobian_n;
            let rvn = lv1.dot(j.lin1) - lv2.dot(j.lin2) + av1.dot(j.ang1) - av2.dot(j.ang2);

            let mut impulse_p =
                (row.rhs - rvn) * md.mass_n * POSITION_SPLIT_IMPULSE_BAUMGARTE;
            let old_p = imp.impulse_p;
            imp.impulse_p = (imp.impulse_p + impulse_p).max(0.0);
            impulse_p = imp.impulse_p - old_p;

            lv1 += md.inv_m_lin_n1 * impulse_p;
            lv2 -= md.inv_m_lin_n2 * impulse_p;
            av1 += md.inv_m_ang_n1 * impulse_p;
            av2 -= md.inv_m_ang_n2 * impulse_p;
        }

        b1.pseudo_vel = lv1;
        b2.pseudo_vel = lv2;
        b1.ang_pseudo_vel = av1;
        b2.ang_pseudo_vel = av2;
    }

    /// One nonlinear Gauss–Seidel sweep: transforms are mutated directly and
    /// the Jacobians re-derived from them on the next call.
    pub(crate) fn solve_position_ngs(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        self.update_position_data(manifold, b1, b2);

        let mut lv1 = Vec3::ZERO;
        let mut lv2 = Vec3::ZERO;
        let mut av1 = Vec3::ZERO;
        let mut av2 = Vec3::ZERO;

        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let md = &self.mass_data[i];
            let imp = &mut manifold.points[row.point_index].impulse;

            let j = row.jacobian_n;
            let rvn = lv1.dot(j.lin1) - lv2.dot(j.lin2) + av1.dot(j.ang1) - av2.dot(j.ang2);

            let mut impulse_p = (row.rhs - rvn) * md.mass_n * POSITION_NGS_BAUMGARTE;
            let old_p = imp.impulse_p;
            imp.impulse_p = (imp.impulse_p + impulse_p).max(0.0);
            impulse_p = imp.impulse_p - old_p;

            lv1 += md.inv_m_lin_n1 * impulse_p;
            lv2 -= md.inv_m_lin_n2 * impulse_p;
            av1 += md.inv_m_ang_n1 * impulse_p;
            av2 -= md.inv_m_ang_n2 * impulse_p;
        }

        b1.apply_translation(lv1);
        b2.apply_translation(lv2);
        b1.apply_rotation(av1);
        b2.apply_rotation(av2);
    }

    /// Stores lateral impulses back into the manifold, accumulates the
    /// per-body inspection impulses, and re-syncs the manifold.
    pub(crate) fn post_solve(
        &mut self,
        manifold: &mut Manifold,
        b1: &mut RigidBody,
        b2: &mut RigidBody,
    ) {
        let mut lin = Vec3::ZERO;
        let mut ang1 = Vec3::ZERO;
        let mut ang2 = Vec3::ZERO;

        for i in 0..self.num_rows {
            let row = &self.rows[i];
            let imp = &mut manifold.points[row.point_index].impulse;
            let jn = row.jacobian_n;
            let jt = row.jacobian_t;
            let jb = row.jacobian_b;

            imp.impulse_l = jt.lin1 * imp.impulse_t + jb.lin1 * imp.impulse_b;

            lin += jn.lin1 * imp.impulse_n
                + jt.lin1 * imp.impulse_t
                + jb.lin1 * imp.impulse_b;
            ang1 += jn.ang1 * imp.impulse_n
                + jt.ang1 * imp.impulse_t
                + jb.ang1 * imp.impulse_b;
            ang2 += jn.ang2 * imp.impulse_n
                + jt.ang2 * imp.impulse_t
                + jb.ang2 * imp.impulse_b;
        }

        b1.linear_contact_impulse += lin;
        b1.angular_contact_impulse += ang1;
        b2.linear_contact_impulse -= lin;
        b2.angular_contact_impulse -= ang2;

        manifold.update_depths_and_positions(&b1.transform, &b2.transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::narrowphase::DetectorResult;
    use crate::core::rigidbody::{RigidBody, RigidBodyConfig, RigidBodyKind};
    use crate::core::shape::{Shape, ShapeConfig};
    use crate::collision::geometry::Geometry;
    use crate::utils::allocator::{Arena, Id};
    use approx::assert_relative_eq;

    fn dynamic_sphere_body(position: Vec3) -> RigidBody {
        let mut shapes = Arena::new();
        let mut body = RigidBody::new(&RigidBodyConfig {
            position,
            ..Default::default()
        });
        let sid = shapes.insert(Shape::new(
            &ShapeConfig::with_geometry(Geometry::sphere(0.5)),
            Id::new(0, 0),
            0,
        ));
        body.shapes.push(sid);
        body.update_mass(&shapes);
        body
    }

    fn static_body(position: Vec3) -> RigidBody {
        RigidBody::new(&RigidBodyConfig {
            position,
            kind: RigidBodyKind::Static,
            ..Default::default()
        })
    }

    fn time_step(dt: Real) -> TimeStep {
        TimeStep {
            dt,
            inv_dt: 1.0 / dt,
            dt_ratio: 1.0,
        }
    }

    /// Sphere resting on static ground, touching at one point. The normal
    /// points from the ground (body 2) up toward the sphere (body 1).
    fn resting_manifold(updater_tf1: &crate::utils::math::Transform) -> Manifold {
        let mut result = DetectorResult::default();
        result.set_normal(Vec3::Y);
        result.add_point(
            Vec3::new(0.0, -0.01, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            0.01,
            0,
        );
        let mut manifold = Manifold::default();
        manifold.build_basis(result.normal);
        let mut updater = crate::collision::contact::ManifoldUpdater::new();
        updater.total_update(
            &mut manifold,
            &result,
            updater_tf1,
            &crate::utils::math::Transform::IDENTITY,
        );
        manifold
    }

    #[test]
    fn normal_impulse_stops_approach_velocity() {
        let mut b1 = dynamic_sphere_body(Vec3::new(0.0, 0.49, 0.0));
        let mut b2 = static_body(Vec3::ZERO);
        b1.vel = Vec3::new(0.0, -1.0, 0.0);

        let mut manifold = resting_manifold(&b1.transform);
        let mut constraint = ContactConstraint::new(Id::new(0, 0), Id::new(1, 0));
        constraint.set_materials(0.2, 0.2, 0.0, 0.0);

        let ts = time_step(1.0 / 60.0);
        constraint.pre_solve_velocity(&mut manifold, &mut b1, &mut b2, &ts);
        constraint.warm_start(&mut manifold, &mut b1, &mut b2, &ts);
        for _ in 0..10 {
            constraint.solve_velocity(&mut manifold, &mut b1, &mut b2);
        }

        // the downward approach is gone (a small Baumgarte push remains)
        assert!(b1.vel.y >= -1e-9, "vy = {}", b1.vel.y);
        assert!(manifold.points[0].impulse.impulse_n >= 0.0);
        // the static body never moves
        assert_eq!(b2.vel, Vec3::ZERO);
    }

    #[test]
    fn friction_impulse_stays_inside_cone() {
        let mut b1 = dynamic_sphere_body(Vec3::new(0.0, 0.49, 0.0));
        let mut b2 = static_body(Vec3::ZERO);
        b1.vel = Vec3::new(2.0, -0.5, 0.0);

        let mut manifold = resting_manifold(&b1.transform);
        let mut constraint = ContactConstraint::new(Id::new(0, 0), Id::new(1, 0));
        constraint.set_materials(0.5, 0.5, 0.0, 0.0);

        let ts = time_step(1.0 / 60.0);
        constraint.pre_solve_velocity(&mut manifold, &mut b1, &mut b2, &ts);
        constraint.warm_start(&mut manifold, &mut b1, &mut b2, &ts);
        for _ in 0..10 {
            constraint.solve_velocity(&mut manifold, &mut b1, &mut b2);
        }

        let imp = &manifold.points[0].impulse;
        let lateral = (imp.impulse_t * imp.impulse_t + imp.impulse_b * imp.impulse_b).sqrt();
        assert!(imp.impulse_n > 0.0);
        assert!(lateral <= 0.5 * imp.impulse_n + 1e-9);
        // sliding is slowed, not reversed
        assert!(b1.vel.x < 2.0 && b1.vel.x >= 0.0);
    }

    #[test]
    fn bounce_rhs_applies_restitution() {
        let mut b1 = dynamic_sphere_body(Vec3::new(0.0, 0.49, 0.0));
        let mut b2 = static_body(Vec3::ZERO);
        b1.vel = Vec3::new(0.0, -2.0, 0.0); // above the bounce threshold

        let mut manifold = resting_manifold(&b1.transform);
        let mut constraint = ContactConstraint::new(Id::new(0, 0), Id::new(1, 0));
        constraint.set_materials(0.0, 0.0, 1.0, 1.0);

        let ts = time_step(1.0 / 60.0);
        constraint.pre_solve_velocity(&mut manifold, &mut b1, &mut b2, &ts);
        constraint.warm_start(&mut manifold, &mut b1, &mut b2, &ts);
        for _ in 0..10 {
            constraint.solve_velocity(&mut manifold, &mut b1, &mut b2);
        }

        // perfectly elastic: the sphere leaves at its approach speed
        assert_relative_eq!(b1.vel.y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn split_impulse_builds_separating_pseudo_velocity() {
        let mut b1 = dynamic_sphere_body(Vec3::new(0.0, 0.4, 0.0));
        let mut b2 = static_body(Vec3::ZERO);

        // deep contact
        let mut result = DetectorResult::default();
        result.set_normal(Vec3::Y);
        result.add_point(Vec3::new(0.0, -0.1, 0.0), Vec3::ZERO, 0.1, 0);
        let mut manifold = Manifold::default();
        manifold.build_basis(result.normal);
        let mut updater = crate::collision::contact::ManifoldUpdater::new();
        updater.total_update(&mut manifold, &result, &b1.transform, &b2.transform);

        let mut constraint = ContactConstraint::new(Id::new(0, 0), Id::new(1, 0));
        constraint.pre_solve_position(&mut manifold, &mut b1, &mut b2);
        for _ in 0..5 {
            constraint.solve_position_split_impulse(&mut manifold, &mut b1, &mut b2);
        }

        assert!(b1.pseudo_vel.y > 0.0);
        let before = b1.position().y;
        b1.integrate_pseudo_velocity();
        assert!(b1.position().y > before);
        assert_eq!(b1.pseudo_vel, Vec3::ZERO);
    }

    #[test]
    fn ngs_moves_transform_directly() {
        let mut b1 = dynamic_sphere_body(Vec3::new(0.0, 0.4, 0.0));
        let mut b2 = static_body(Vec3::ZERO);

        let mut result = DetectorResult::default();
        result.set_normal(Vec3::Y);
        result.add_point(Vec3::new(0.0, -0.1, 0.0), Vec3::ZERO, 0.1, 0);
        let mut manifold = Manifold::default();
        manifold.build_basis(result.normal);
        let mut updater = crate::collision::contact::ManifoldUpdater::new();
        updater.total_update(&mut manifold, &result, &b1.transform, &b2.transform);

        let mut constraint = ContactConstraint::new(Id::new(0, 0), Id::new(1, 0));
        constraint.pre_solve_position(&mut manifold, &mut b1, &mut b2);
        let before = b1.position().y;
        for _ in 0..5 {
            constraint.solve_position_ngs(&mut manifold, &mut b1, &mut b2);
        }
        assert!(b1.position().y > before);
        // the error shrinks toward the slop bound
        assert!(manifold.deepest_depth() < 0.1);
    }
}
