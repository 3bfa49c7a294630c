//! Shapes: collision geometry attached to a rigid body.

use serde::{Deserialize, Serialize};

use crate::collision::broadphase::ProxyId;
use crate::collision::geometry::Geometry;
use crate::config::{
    DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK, DEFAULT_DENSITY, DEFAULT_FRICTION,
    DEFAULT_RESTITUTION,
};
use crate::dynamics::contact::ContactCallbackId;
use crate::utils::allocator::Id;
use crate::utils::math::{Aabb, Mat3, Real, Transform, Vec3};

pub type ShapeId = Id<Shape>;
pub type BodyId = Id<crate::core::rigidbody::RigidBody>;

/// Creation parameters of a [`Shape`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Translation relative to the owning body.
    pub position: Vec3,
    /// Rotation relative to the owning body.
    pub rotation: Mat3,
    pub geometry: Option<Geometry>,
    pub friction: Real,
    pub restitution: Real,
    pub density: Real,
    pub collision_group: u32,
    pub collision_mask: u32,
    #[serde(skip)]
    pub contact_callback: Option<ContactCallbackId>,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
            geometry: None,
            friction: DEFAULT_FRICTION,
            restitution: DEFAULT_RESTITUTION,
            density: DEFAULT_DENSITY,
            collision_group: DEFAULT_COLLISION_GROUP,
            collision_mask: DEFAULT_COLLISION_MASK,
            contact_callback: None,
        }
    }
}

impl ShapeConfig {
    pub fn with_geometry(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }
}

/// A collision shape. Attached to exactly one body; registered in the
/// broad phase while its body is in a world.
#[derive(Debug)]
pub struct Shape {
    /// Numeric id, unique per world; used to canonicalize pair scans.
    pub(crate) id: u32,
    pub(crate) body: BodyId,
    pub geometry: Geometry,

    pub(crate) local_transform: Transform,
    /// World transform one step ago.
    pub(crate) prev_transform: Transform,
    /// Current world transform.
    pub(crate) transform: Transform,
    /// Union of the AABBs at the previous and current transforms.
    pub(crate) aabb: Aabb,
    pub(crate) displacement: Vec3,

    pub friction: Real,
    pub restitution: Real,
    pub density: Real,
    pub collision_group: u32,
    pub collision_mask: u32,
    pub contact_callback: Option<ContactCallbackId>,

    pub(crate) proxy: Option<ProxyId>,
}

impl Shape {
    pub(crate) fn new(config: &ShapeConfig, body: BodyId, id: u32) -> Self {
        let geometry = config
            .geometry
            .clone()
            .expect("ShapeConfig::geometry is required");
        let local_transform = Transform::new(config.position, config.rotation);
        let mut shape = Self {
            id,
            body,
            geometry,
            local_transform,
            prev_transform: local_transform,
            transform: local_transform,
            aabb: Aabb::default(),
            displacement: Vec3::ZERO,
            friction: config.friction,
            restitution: config.restitution,
            density: config.density,
            collision_group: config.collision_group,
            collision_mask: config.collision_mask,
            contact_callback: config.contact_callback,
            proxy: None,
        };
        shape.aabb = shape.geometry.compute_aabb(&shape.transform);
        shape
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn local_transform(&self) -> Transform {
        self.local_transform
    }

    pub fn world_transform(&self) -> Transform {
        self.transform
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Recomputes world transforms and the swept AABB from the owning
    /// body's previous and current transforms. The caller forwards
    /// `displacement` to the broad phase for fat-AABB prediction.
    pub(crate) fn sync(&mut self, prev: &Transform, current: &Transform) {
        self.prev_transform = prev.mul(&self.local_transform);
        self.transform = current.mul(&self.local_transform);

        let prev_aabb = self.geometry.compute_aabb(&self.prev_transform);
        let aabb = self.geometry.compute_aabb(&self.transform);
        self.aabb = Aabb::combine(&prev_aabb, &aabb);

        self.displacement = self.transform.position - self.prev_transform.position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn config_defaults_match_engine_defaults() {
        let config = ShapeConfig::default();
        assert_relative_eq!(config.friction, 0.2);
        assert_relative_eq!(config.restitution, 0.2);
        assert_relative_eq!(config.density, 1.0);
        assert_eq!(config.collision_group, 1);
        assert_eq!(config.collision_mask, 1);
    }

    #[test]
    fn sync_unions_previous_and_current_bounds() {
        let config = ShapeConfig::with_geometry(Geometry::sphere(1.0));
        let mut shape = Shape::new(&config, Id::new(0, 0), 0);
        let prev = Transform::from_position(Vec3::ZERO);
        let current = Transform::from_position(Vec3::new(3.0, 0.0, 0.0));
        shape.sync(&prev, &current);
        assert_relative_eq!(shape.displacement.x, 3.0);
        assert_relative_eq!(shape.aabb().min.x, -1.0);
        assert_relative_eq!(shape.aabb().max.x, 4.0);
    }

    #[test]
    fn local_offset_composes_into_world_transform() {
        let mut config = ShapeConfig::with_geometry(Geometry::sphere(0.5));
        config.position = Vec3::new(0.0, 1.0, 0.0);
        let mut shape = Shape::new(&config, Id::new(0, 0), 0);
        let body_tf = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        shape.sync(&body_tf, &body_tf);
        assert_relative_eq!(shape.world_transform().position.x, 2.0);
        assert_relative_eq!(shape.world_transform().position.y, 1.0);
    }
}
