//! Simulation islands: transient groups of awake bodies connected by
//! touching contacts or joints, solved as one unit.

use crate::config::{ISLAND_INITIAL_BODY_CAPACITY, ISLAND_INITIAL_CONSTRAINT_CAPACITY};
use crate::core::rigidbody::{ContactId, JointId, RigidBody};
use crate::core::shape::BodyId;
use crate::dynamics::contact::{Contact, PositionCorrection};
use crate::dynamics::joint::Joint;
use crate::dynamics::TimeStep;
use crate::utils::allocator::Arena;
use crate::utils::math::{fast_inv_exp, Real, Vec3};

/// A constraint solver scheduled into an island.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SolverRef {
    Contact(ContactId),
    Joint(JointId),
}

/// Per-step island scratch, reused across islands and steps.
pub(crate) struct Island {
    gravity: Vec3,
    pub(crate) bodies: Vec<BodyId>,
    /// All constraint solvers of the island.
    solvers: Vec<SolverRef>,
    /// The subset using split-impulse position correction.
    solvers_si: Vec<SolverRef>,
    /// The subset using nonlinear Gauss–Seidel position correction.
    solvers_ngs: Vec<SolverRef>,
}

impl Island {
    pub(crate) fn new() -> Self {
        Self {
            gravity: Vec3::ZERO,
            bodies: Vec::with_capacity(ISLAND_INITIAL_BODY_CAPACITY),
            solvers: Vec::with_capacity(ISLAND_INITIAL_CONSTRAINT_CAPACITY),
            solvers_si: Vec::with_capacity(ISLAND_INITIAL_CONSTRAINT_CAPACITY),
            solvers_ngs: Vec::with_capacity(ISLAND_INITIAL_CONSTRAINT_CAPACITY),
        }
    }

    pub(crate) fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.solvers.clear();
        self.solvers_si.clear();
        self.solvers_ngs.clear();
    }

    pub(crate) fn add_body(&mut self, id: BodyId, body: &mut RigidBody) {
        body.added_to_island = true;
        self.bodies.push(id);
    }

    pub(crate) fn add_solver(&mut self, solver: SolverRef, correction: PositionCorrection) {
        self.solvers.push(solver);
        match correction {
            PositionCorrection::SplitImpulse => self.solvers_si.push(solver),
            PositionCorrection::Ngs => self.solvers_ngs.push(solver),
            PositionCorrection::Baumgarte => {}
        }
    }

    /// Fast path for a body with no contact or joint links: apply forces,
    /// integrate, and keep the sleep clock, without island construction.
    pub(crate) fn step_single_body(&self, time_step: &TimeStep, body: &mut RigidBody) {
        let dt = time_step.dt;

        body.prev_transform = body.transform;
        body.linear_contact_impulse = Vec3::ZERO;
        body.angular_contact_impulse = Vec3::ZERO;

        if body.is_sleepy() {
            body.sleep_time += dt;
            if body.sleep_time >= body.sleeping_time_threshold {
                body.sleep();
            }
        } else {
            body.sleep_time = 0.0;
        }

        if !body.sleeping {
            if body.is_dynamic() {
                self.apply_forces(body, dt);
            }
            body.integrate(dt);
        }
    }

    fn apply_forces(&self, body: &mut RigidBody, dt: Real) {
        let lin_scale = fast_inv_exp(dt * body.linear_damping);
        let ang_scale = fast_inv_exp(dt * body.angular_damping);

        let lin_acc = self.gravity * body.gravity_scale + body.force * body.inv_mass;
        let ang_acc = body.inv_inertia * body.torque;

        body.vel = (body.vel + lin_acc * dt) * lin_scale;
        body.ang_vel = (body.ang_vel + ang_acc * dt) * ang_scale;
    }

    /// Solves one island: forces and sleep accounting, velocity iterations
    /// with warm starting, integration, then the split-impulse and NGS
    /// position passes.
    pub(crate) fn step(
        &mut self,
        time_step: &TimeStep,
        num_velocity_iterations: u32,
        num_position_iterations: u32,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut Arena<Contact>,
        joints: &mut Arena<Joint>,
    ) {
        let dt = time_step.dt;
        let mut sleep_island = true;

        // sleep check and force application
        for id in &self.bodies {
            let Some(body) = bodies.get_mut(*id) else {
                continue;
            };
            body.prev_transform = body.transform;
            body.linear_contact_impulse = Vec3::ZERO;
            body.angular_contact_impulse = Vec3::ZERO;
            body.sleeping = false;

            if body.is_sleepy() {
                body.sleep_time += dt;
            } else {
                body.sleep_time = 0.0;
            }
            if body.sleep_time < body.sleeping_time_threshold {
                sleep_island = false;
            }

            if body.is_dynamic() {
                self.apply_forces(body, dt);
            }
        }

        if sleep_island {
            for id in &self.bodies {
                if let Some(body) = bodies.get_mut(*id) {
                    body.sleep();
                }
            }
            return;
        }

        // velocity solve
        for i in 0..self.solvers.len() {
            self.dispatch(self.solvers[i], bodies, contacts, joints, |c, m, b1, b2| {
                c.pre_solve_velocity(m, b1, b2, time_step)
            }, |j, b1, b2| j.pre_solve_velocity(b1, b2, time_step));
        }
        for i in 0..self.solvers.len() {
            self.dispatch(self.solvers[i], bodies, contacts, joints, |c, m, b1, b2| {
                c.warm_start(m, b1, b2, time_step)
            }, |j, b1, b2| j.warm_start(b1, b2, time_step));
        }
        for _ in 0..num_velocity_iterations {
            for i in 0..self.solvers.len() {
                self.dispatch(self.solvers[i], bodies, contacts, joints, |c, m, b1, b2| {
                    c.solve_velocity(m, b1, b2)
                }, |j, b1, b2| j.solve_velocity(b1, b2));
            }
        }

        // integrate
        for id in &self.bodies {
            if let Some(body) = bodies.get_mut(*id) {
                body.integrate(dt);
            }
        }

        // split-impulse position solve
        for i in 0..self.solvers_si.len() {
            self.dispatch(self.solvers_si[i], bodies, contacts, joints, |c, m, b1, b2| {
                c.pre_solve_position(m, b1, b2)
            }, |j, b1, b2| j.pre_solve_position(b1, b2));
        }
        for _ in 0..num_position_iterations {
            for i in 0..self.solvers_si.len() {
                self.dispatch(self.solvers_si[i], bodies, contacts, joints, |c, m, b1, b2| {
                    c.solve_position_split_impulse(m, b1, b2)
                }, |j, b1, b2| j.solve_position_split_impulse(b1, b2));
            }
        }
        for id in &self.bodies {
            if let Some(body) = bodies.get_mut(*id) {
                body.integrate_pseudo_velocity();
            }
        }

        // nonlinear Gauss-Seidel position solve
        for i in 0..self.solvers_ngs.len() {
            self.dispatch(self.solvers_ngs[i], bodies, contacts, joints, |c, m, b1, b2| {
                c.pre_solve_position(m, b1, b2)
            }, |j, b1, b2| j.pre_solve_position(b1, b2));
        }
        for _ in 0..num_position_iterations {
            for i in 0..self.solvers_ngs.len() {
                self.dispatch(self.solvers_ngs[i], bodies, contacts, joints, |c, m, b1, b2| {
                    c.solve_position_ngs(m, b1, b2)
                }, |j, b1, b2| j.solve_position_ngs(b1, b2));
            }
        }

        // post solve
        for i in 0..self.solvers.len() {
            self.dispatch(self.solvers[i], bodies, contacts, joints, |c, m, b1, b2| {
                c.post_solve(m, b1, b2)
            }, |j, _b1, _b2| j.post_solve());
        }
    }

    /// Routes one solver call to the contact or joint it refers to, with
    /// disjoint mutable access to its two bodies. A constraint whose body
    /// pair cannot be resolved (removed mid-step) is skipped.
    fn dispatch<FC, FJ>(
        &self,
        solver: SolverRef,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut Arena<Contact>,
        joints: &mut Arena<Joint>,
        contact_op: FC,
        joint_op: FJ,
    ) where
        FC: FnOnce(
            &mut crate::dynamics::solver::ContactConstraint,
            &mut crate::collision::contact::Manifold,
            &mut RigidBody,
            &mut RigidBody,
        ),
        FJ: FnOnce(&mut Joint, &mut RigidBody, &mut RigidBody),
    {
        match solver {
            SolverRef::Contact(id) => {
                let Some(contact) = contacts.get_mut(id) else {
                    return;
                };
                let Some((b1, b2)) = bodies.get2_mut(contact.body1, contact.body2) else {
                    return;
                };
                contact_op(&mut contact.constraint, &mut contact.manifold, b1, b2);
            }
            SolverRef::Joint(id) => {
                let Some(joint) = joints.get_mut(id) else {
                    return;
                };
                let Some((b1, b2)) = bodies.get2_mut(joint.body1, joint.body2) else {
                    return;
                };
                joint_op(joint, b1, b2);
            }
        }
    }
}
