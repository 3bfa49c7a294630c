//! Oxiphys – a 3D rigid-body dynamics engine for Rust.
//!
//! The crate is organized around a [`World`] that owns rigid bodies, their
//! collision shapes, joints, and contacts, and advances them with a
//! deterministic pipeline: broad phase → narrow phase → island construction
//! → iterative constraint solving → integration.
//!
//! ```
//! use oxiphys::{Geometry, RigidBodyConfig, ShapeConfig, Vec3, World};
//!
//! let mut world = World::default();
//! let body = world.add_body(&RigidBodyConfig {
//!     position: Vec3::new(0.0, 5.0, 0.0),
//!     ..Default::default()
//! });
//! world.add_shape(body, &ShapeConfig::with_geometry(Geometry::sphere(0.5)));
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0);
//! }
//! assert!(world.body(body).unwrap().position().y < 5.0);
//! ```

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod utils;
pub mod world;

pub use utils::math::{Aabb, Mat3, Quat, Real, Transform, Vec3};

pub use collision::{
    broadphase::BroadPhaseKind,
    geometry::{Geometry, GeometryKind, RayCastHit},
    gjk_epa::{GjkEpa, GjkEpaState},
};
pub use self::core::{
    rigidbody::{RigidBody, RigidBodyConfig, RigidBodyKind},
    shape::{BodyId, Shape, ShapeConfig, ShapeId},
};
pub use dynamics::{
    contact::{ContactCallback, ContactCallbackId, ContactView, PositionCorrection},
    joint::{Joint, JointConfig},
};
pub use utils::allocator::{Arena, Id};
pub use world::{DebugDraw, World};
