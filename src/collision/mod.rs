//! Collision detection: geometries, broad phase, narrow phase, manifolds.

pub mod box_box;
pub mod broadphase;
pub mod bvh;
pub mod clipping;
pub mod contact;
pub mod epa;
pub mod geometry;
pub mod gjk_epa;
pub mod narrowphase;

pub use broadphase::{BroadPhase, BroadPhaseKind, Proxy, ProxyId, ProxyPair};
pub use bvh::{AnyBroadPhase, BvhBroadPhase, InsertionStrategy};
pub use contact::{ContactImpulse, Manifold, ManifoldPoint, ManifoldUpdater};
pub use geometry::{Geometry, GeometryKind, RayCastHit};
pub use gjk_epa::{GjkCache, GjkEpa, GjkEpaState};
pub use narrowphase::{CachedDetectorData, DetectorResult, Narrowphase};
