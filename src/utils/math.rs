//! Math primitives layered on top of `glam`.
//!
//! The engine runs in double precision; the `f64` glam types are aliased so
//! the rest of the crate can speak in `Vec3`/`Mat3`/`Quat`.

pub use glam::{DMat3 as Mat3, DQuat as Quat, DVec3 as Vec3};

/// Scalar type used throughout the engine.
pub type Real = f64;

pub const PI: Real = std::f64::consts::PI;

/// Axis-aligned bounding box, an ordered `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing both `a` and `b`.
    pub fn combine(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn surface_area(&self) -> Real {
        let s = self.max - self.min;
        2.0 * (s.x * (s.y + s.z) + s.y * s.z)
    }

    pub fn expand(&self, margin: Real) -> Aabb {
        let m = Vec3::splat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Conservative test of the segment `begin..end` against the box.
    pub fn intersects_segment(&self, begin: Vec3, end: Vec3) -> bool {
        let dir = end - begin;
        let mut t_min: Real = 0.0;
        let mut t_max: Real = 1.0;
        for i in 0..3 {
            let o = begin[i];
            let d = dir[i];
            if d.abs() < 1e-12 {
                if o < self.min[i] || o > self.max[i] {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (self.min[i] - o) * inv;
            let mut t2 = (self.max[i] - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

/// Position plus rotation. Scale-free; geometries carry their own extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Mat3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Mat3::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Mat3) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Mat3::IDENTITY,
        }
    }

    /// `self` applied after `local`: world = self ∘ local.
    pub fn mul(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * local.position,
            rotation: self.rotation * local.rotation,
        }
    }

    pub fn point_to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    pub fn point_to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.transpose() * (world - self.position)
    }

    pub fn vector_to_world(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    pub fn vector_to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.transpose() * world
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_mat3(&self.rotation)
    }
}

/// Skew-symmetric cross-product matrix of `v`: `skew(v) * x == v.cross(x)`.
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Parallel-axis contribution of a unit mass displaced by `offset` from the
/// center of gravity: `|r|²·I − r·rᵀ`.
pub fn parallel_axis(offset: Vec3) -> Mat3 {
    let d = offset.length_squared();
    Mat3::from_diagonal(Vec3::splat(d))
        - Mat3::from_cols(offset * offset.x, offset * offset.y, offset * offset.z)
}

/// Builds an orthonormal basis `(tangent, binormal)` perpendicular to the
/// unit vector `normal`, branching on its smallest absolute component to
/// avoid singularities.
pub fn contact_basis(normal: Vec3) -> (Vec3, Vec3) {
    let ax = normal.x.abs();
    let ay = normal.y.abs();
    let az = normal.z.abs();
    let pivot = if ax < ay {
        if ax < az {
            Vec3::X
        } else {
            Vec3::Z
        }
    } else if ay < az {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let tangent = normal.cross(pivot).normalize();
    let binormal = normal.cross(tangent);
    (tangent, binormal)
}

/// Padé approximant of `exp(-x)` used for velocity damping; stable for x ≥ 0.
pub fn fast_inv_exp(x: Real) -> Real {
    let x2 = x * x;
    1.0 / (1.0 + x + x2 * (1.0 / 2.0 + x * (1.0 / 6.0) + x2 * (1.0 / 24.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_overlap_and_containment() {
        let a = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(1.5), Vec3::splat(3.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.contains(&Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))));
        assert!(!a.contains(&b));
    }

    #[test]
    fn aabb_surface_area_of_unit_cube() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_relative_eq!(a.surface_area(), 6.0);
    }

    #[test]
    fn aabb_segment_test() {
        let a = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(a.intersects_segment(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)));
        assert!(!a.intersects_segment(Vec3::new(-5.0, 3.0, 0.0), Vec3::new(5.0, 3.0, 0.0)));
    }

    #[test]
    fn transform_round_trip() {
        let tf = Transform::new(
            Vec3::new(1.0, -2.0, 3.0),
            Mat3::from_quat(Quat::from_axis_angle(
                Vec3::new(0.3, 0.8, 0.5).normalize(),
                1.1,
            )),
        );
        let p = Vec3::new(0.4, 0.7, -0.2);
        let back = tf.point_to_local(tf.point_to_world(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-9);
    }

    #[test]
    fn contact_basis_is_orthonormal() {
        for n in [
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            Vec3::new(0.6, -0.48, 0.64).normalize(),
        ] {
            let (t, b) = contact_basis(n);
            assert_relative_eq!(t.length(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(n.dot(t), 0.0, epsilon = 1e-12);
            assert_relative_eq!((n.cross(t) - b).length(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn fast_inv_exp_tracks_exp() {
        for x in [0.0, 0.01, 0.1, 0.5] {
            assert_relative_eq!(fast_inv_exp(x), (-x).exp(), epsilon = 1e-4);
        }
    }

    #[test]
    fn skew_matches_cross_product() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let x = Vec3::new(-0.5, 0.4, 0.9);
        assert_relative_eq!((skew(v) * x - v.cross(x)).length(), 0.0, epsilon = 1e-12);
    }
}
