//! Dynamics: contacts, constraint solvers, joints, islands.

pub mod contact;
pub mod island;
pub mod joint;
pub mod solver;

use crate::utils::math::Real;

pub use contact::{Contact, ContactCallback, ContactCallbackId, ContactView, PositionCorrection};
pub use joint::{Joint, JointConfig};
pub use solver::ContactConstraint;

/// Time-step sizes of the running simulation step.
#[derive(Debug, Clone, Copy)]
pub struct TimeStep {
    pub dt: Real,
    pub inv_dt: Real,
    /// `dt / previous dt`, used to rescale warm-start impulses on variable
    /// step sizes.
    pub dt_ratio: Real,
}

impl Default for TimeStep {
    fn default() -> Self {
        Self {
            dt: 0.0,
            inv_dt: 0.0,
            dt_ratio: 1.0,
        }
    }
}
