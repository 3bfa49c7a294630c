//! Cached shape-pair contacts and the user contact-callback surface.

use crate::collision::contact::{Manifold, ManifoldUpdater};
use crate::collision::narrowphase::{CachedDetectorData, DetectorResult};
use crate::config::ALTERNATIVE_POSITION_CORRECTION_DEPTH_THRESHOLD;
use crate::core::rigidbody::RigidBody;
use crate::core::shape::{BodyId, ShapeId};
use crate::dynamics::solver::ContactConstraint;
use crate::utils::allocator::Id;

/// Strategy used to resolve positional error of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionCorrection {
    /// Feedback term folded into the velocity right-hand side.
    #[default]
    Baumgarte,
    /// Auxiliary pseudo-velocity solve applied after integration.
    SplitImpulse,
    /// Nonlinear Gauss–Seidel sweep mutating transforms directly.
    Ngs,
}

/// Read-only view of a contact passed to user callbacks.
pub struct ContactView<'a> {
    pub shape1: ShapeId,
    pub shape2: ShapeId,
    pub body1: BodyId,
    pub body2: BodyId,
    pub manifold: &'a Manifold,
}

/// User hooks fired across a contact's lifetime. For a given pair, events
/// arrive in the order begin → (pre-solve · post-solve)* → end. Callbacks
/// may mutate the two bodies (impulses, wake); they cannot restructure the
/// world.
#[allow(unused_variables)]
pub trait ContactCallback {
    fn begin_contact(&mut self, contact: &ContactView<'_>, b1: &mut RigidBody, b2: &mut RigidBody) {
    }
    fn pre_solve(&mut self, contact: &ContactView<'_>, b1: &mut RigidBody, b2: &mut RigidBody) {}
    fn post_solve(&mut self, contact: &ContactView<'_>, b1: &mut RigidBody, b2: &mut RigidBody) {}
    fn end_contact(&mut self, contact: &ContactView<'_>, b1: &mut RigidBody, b2: &mut RigidBody) {}
}

pub type ContactCallbackId = Id<Box<dyn ContactCallback>>;

/// A cached pair of shapes whose AABBs overlap. Created and destroyed by
/// the contact manager; holds the manifold and the solver constraint.
pub struct Contact {
    /// The pair, canonicalized so `shape1` has the smaller numeric shape id.
    pub(crate) shape1: ShapeId,
    pub(crate) shape2: ShapeId,
    pub(crate) body1: BodyId,
    pub(crate) body2: BodyId,

    pub(crate) cached_data: CachedDetectorData,
    pub(crate) result: DetectorResult,

    pub(crate) manifold: Manifold,
    pub(crate) updater: ManifoldUpdater,
    pub(crate) constraint: ContactConstraint,

    pub(crate) latest: bool,
    pub(crate) should_be_skipped: bool,
    pub(crate) touching: bool,
    pub(crate) added_to_island: bool,
    pub(crate) position_correction: PositionCorrection,
}

impl Contact {
    pub(crate) fn new(shape1: ShapeId, shape2: ShapeId, body1: BodyId, body2: BodyId) -> Self {
        Self {
            shape1,
            shape2,
            body1,
            body2,
            cached_data: CachedDetectorData::default(),
            result: DetectorResult::default(),
            manifold: Manifold::default(),
            updater: ManifoldUpdater::new(),
            constraint: ContactConstraint::new(body1, body2),
            latest: false,
            should_be_skipped: false,
            touching: false,
            added_to_island: false,
            position_correction: PositionCorrection::Baumgarte,
        }
    }

    pub fn shape1(&self) -> ShapeId {
        self.shape1
    }

    pub fn shape2(&self) -> ShapeId {
        self.shape2
    }

    pub fn body1(&self) -> BodyId {
        self.body1
    }

    pub fn body2(&self) -> BodyId {
        self.body2
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Picks the position-correction algorithm from the deepest manifold
    /// point: deep stacks switch to split impulse, shallow resting contacts
    /// stay on Baumgarte.
    pub(crate) fn select_position_correction(&mut self) {
        self.position_correction =
            if self.manifold.deepest_depth() > ALTERNATIVE_POSITION_CORRECTION_DEPTH_THRESHOLD {
                PositionCorrection::SplitImpulse
            } else {
                PositionCorrection::Baumgarte
            };
        self.constraint.position_correction = self.position_correction;
    }

    pub(crate) fn view(&self) -> ContactView<'_> {
        ContactView {
            shape1: self.shape1,
            shape2: self.shape2,
            body1: self.body1,
            body2: self.body2,
            manifold: &self.manifold,
        }
    }
}
