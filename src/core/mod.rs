//! Core entity types: shapes and rigid bodies.

pub mod rigidbody;
pub mod shape;

pub use rigidbody::{ContactId, JointId, RigidBody, RigidBodyConfig, RigidBodyKind};
pub use shape::{BodyId, Shape, ShapeConfig, ShapeId};
