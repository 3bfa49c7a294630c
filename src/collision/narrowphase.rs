//! Narrow-phase detectors and the pair dispatch matrix.

use log::debug;

use crate::collision::box_box::detect_box_box;
use crate::collision::clipping::FaceClipper;
use crate::collision::geometry::{Geometry, GeometryKind};
use crate::collision::gjk_epa::{GjkCache, GjkEpa, GjkEpaState};
use crate::config::{ENABLE_GJK_CACHING, MAX_MANIFOLD_POINTS};
use crate::utils::math::{Real, Transform, Vec3};

/// A pair of closest points found by a detector, with the overlap along the
/// contact normal. `depth` is negative when the geometries are separate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorResultPoint {
    pub position1: Vec3,
    pub position2: Vec3,
    pub depth: Real,
    pub id: u32,
}

/// The outcome of one narrow-phase detection. The normal points from the
/// second geometry toward the first; only the first `num_points` entries of
/// `points` are meaningful.
#[derive(Debug, Clone, Copy)]
pub struct DetectorResult {
    pub num_points: usize,
    pub points: [DetectorResultPoint; MAX_MANIFOLD_POINTS],
    pub normal: Vec3,
    /// Whether the points are to be merged into the manifold one sample at a
    /// time (GJK/EPA path) or to replace it wholesale (closed-form path).
    pub incremental: bool,
}

impl Default for DetectorResult {
    fn default() -> Self {
        Self {
            num_points: 0,
            points: [DetectorResultPoint::default(); MAX_MANIFOLD_POINTS],
            normal: Vec3::ZERO,
            incremental: false,
        }
    }
}

impl DetectorResult {
    pub fn clear(&mut self) {
        self.num_points = 0;
        self.normal = Vec3::ZERO;
        self.incremental = false;
    }

    pub fn set_normal(&mut self, normal: Vec3) {
        self.normal = normal;
    }

    pub fn add_point(&mut self, position1: Vec3, position2: Vec3, depth: Real, id: u32) {
        if self.num_points == MAX_MANIFOLD_POINTS {
            return;
        }
        self.points[self.num_points] = DetectorResultPoint {
            position1,
            position2,
            depth,
            id,
        };
        self.num_points += 1;
    }

    pub fn max_depth(&self) -> Real {
        let mut max = 0.0;
        for p in &self.points[..self.num_points] {
            if p.depth > max {
                max = p.depth;
            }
        }
        max
    }
}

/// Cached narrow-phase data of a geometry pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedDetectorData {
    pub gjk_cache: Option<GjkCache>,
}

impl CachedDetectorData {
    pub fn clear(&mut self) {
        if let Some(cache) = self.gjk_cache.as_mut() {
            cache.clear();
        }
    }
}

/// Which detector handles a geometry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    SphereSphere,
    SphereBox,
    SphereCapsule,
    CapsuleCapsule,
    BoxBox,
    GjkEpa,
}

/// Selects the detector for a pair of geometry kinds. Not symmetric: the
/// returned flag tells the caller to swap its inputs (and negate the
/// resulting normal).
pub fn dispatch(kind1: GeometryKind, kind2: GeometryKind) -> (Detector, bool) {
    use GeometryKind::*;
    match (kind1, kind2) {
        (Sphere, Sphere) => (Detector::SphereSphere, false),
        (Sphere, Box) => (Detector::SphereBox, false),
        (Box, Sphere) => (Detector::SphereBox, true),
        (Sphere, Capsule) => (Detector::SphereCapsule, false),
        (Capsule, Sphere) => (Detector::SphereCapsule, true),
        (Capsule, Capsule) => (Detector::CapsuleCapsule, false),
        (Box, Box) => (Detector::BoxBox, false),
        _ => (Detector::GjkEpa, false),
    }
}

/// Narrow-phase driver owning the GJK/EPA scratch and the face clipper.
pub struct Narrowphase {
    pub gjk: GjkEpa,
    clipper: FaceClipper,
}

impl Default for Narrowphase {
    fn default() -> Self {
        Self::new()
    }
}

impl Narrowphase {
    pub fn new() -> Self {
        Self {
            gjk: GjkEpa::new(),
            clipper: FaceClipper::new(),
        }
    }

    /// Runs the detector selected by the dispatch matrix, swapping inputs
    /// and flipping the resulting normal when the matrix says so.
    pub fn detect(
        &mut self,
        result: &mut DetectorResult,
        g1: &Geometry,
        g2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: &mut CachedDetectorData,
    ) {
        result.clear();
        let (detector, swapped) = dispatch(g1.kind(), g2.kind());
        if swapped {
            self.detect_impl(detector, result, g2, g1, tf2, tf1, cache);
            result.normal = -result.normal;
            for p in result.points[..result.num_points].iter_mut() {
                std::mem::swap(&mut p.position1, &mut p.position2);
            }
        } else {
            self.detect_impl(detector, result, g1, g2, tf1, tf2, cache);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn detect_impl(
        &mut self,
        detector: Detector,
        result: &mut DetectorResult,
        g1: &Geometry,
        g2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: &mut CachedDetectorData,
    ) {
        match detector {
            Detector::SphereSphere => detect_sphere_sphere(result, g1, g2, tf1, tf2),
            Detector::SphereBox => detect_sphere_box(result, g1, g2, tf1, tf2),
            Detector::SphereCapsule => detect_sphere_capsule(result, g1, g2, tf1, tf2),
            Detector::CapsuleCapsule => detect_capsule_capsule(result, g1, g2, tf1, tf2),
            Detector::BoxBox => detect_box_box(result, &mut self.clipper, g1, g2, tf1, tf2),
            Detector::GjkEpa => self.detect_gjk_epa(result, g1, g2, tf1, tf2, cache),
        }
    }

    fn detect_gjk_epa(
        &mut self,
        result: &mut DetectorResult,
        g1: &Geometry,
        g2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: &mut CachedDetectorData,
    ) {
        result.incremental = true;

        let gjk_cache = if ENABLE_GJK_CACHING {
            Some(cache.gjk_cache.get_or_insert_with(GjkCache::default))
        } else {
            None
        };
        let state = self
            .gjk
            .compute_closest_points(g1, g2, tf1, tf2, gjk_cache);
        if state != GjkEpaState::Succeeded {
            // treated as non-touching this step; the manifold ages out
            debug!("GJK/EPA detector failed: {state:?}");
            return;
        }

        let margin1 = g1.gjk_margin();
        let margin2 = g2.gjk_margin();
        let distance = self.gjk.distance;
        if distance > margin1 + margin2 {
            return;
        }

        let diff = self.gjk.closest_point1 - self.gjk.closest_point2;
        let normal = if distance > 1e-9 {
            diff / distance
        } else if distance < -1e-9 {
            -diff.normalize_or_zero()
        } else {
            Vec3::ZERO
        };
        if normal.length_squared() < 0.5 {
            return; // degenerate touching configuration
        }

        result.set_normal(normal);
        let pos1 = self.gjk.closest_point1 - normal * margin1;
        let pos2 = self.gjk.closest_point2 + normal * margin2;
        result.add_point(pos1, pos2, margin1 + margin2 - distance, 0);
    }
}

fn detect_sphere_sphere(
    result: &mut DetectorResult,
    g1: &Geometry,
    g2: &Geometry,
    tf1: &Transform,
    tf2: &Transform,
) {
    result.incremental = false;
    let r1 = g1.sphere_radius().unwrap();
    let r2 = g2.sphere_radius().unwrap();
    let d = tf1.position - tf2.position;
    let len2 = d.length_squared();
    let rsum = r1 + r2;
    if len2 >= rsum * rsum {
        return;
    }
    let len = len2.sqrt();
    let normal = if len > 0.0 { d / len } else { Vec3::X };
    result.set_normal(normal);
    result.add_point(
        tf1.position - normal * r1,
        tf2.position + normal * r2,
        rsum - len,
        0,
    );
}

fn detect_sphere_box(
    result: &mut DetectorResult,
    sphere: &Geometry,
    cuboid: &Geometry,
    tf1: &Transform,
    tf2: &Transform,
) {
    result.incremental = false;
    let radius = sphere.sphere_radius().unwrap();
    let half = cuboid.box_half_extents().unwrap();

    // sphere center in the box frame
    let center = tf2.point_to_local(tf1.position);
    let clamped = center.clamp(-half, half);

    if (center - clamped).length_squared() < 1e-18 {
        // the center is inside the box: push out through the nearest face
        let dist = half - center.abs();
        let (axis, face_dist) = if dist.x < dist.y {
            if dist.x < dist.z {
                (0, dist.x)
            } else {
                (2, dist.z)
            }
        } else if dist.y < dist.z {
            (1, dist.y)
        } else {
            (2, dist.z)
        };
        let mut local_normal = Vec3::ZERO;
        local_normal[axis] = center[axis].signum();
        let mut surface = center;
        surface[axis] = half[axis] * center[axis].signum();

        let normal = tf2.vector_to_world(local_normal);
        result.set_normal(normal);
        result.add_point(
            tf1.position - normal * radius,
            tf2.point_to_world(surface),
            radius + face_dist,
            0,
        );
        return;
    }

    let diff = center - clamped;
    let dist2 = diff.length_squared();
    if dist2 >= radius * radius {
        return;
    }
    let dist = dist2.sqrt();
    let normal = tf2.vector_to_world(diff / dist);
    result.set_normal(normal);
    result.add_point(
        tf1.position - normal * radius,
        tf2.point_to_world(clamped),
        radius - dist,
        0,
    );
}

fn detect_sphere_capsule(
    result: &mut DetectorResult,
    sphere: &Geometry,
    capsule: &Geometry,
    tf1: &Transform,
    tf2: &Transform,
) {
    result.incremental = false;
    let r1 = sphere.sphere_radius().unwrap();
    let (r2, half_height) = capsule.capsule_params().unwrap();

    let axis = tf2.rotation * Vec3::Y;
    let t = (tf1.position - tf2.position)
        .dot(axis)
        .clamp(-half_height, half_height);
    let on_segment = tf2.position + axis * t;

    let d = tf1.position - on_segment;
    let len2 = d.length_squared();
    let rsum = r1 + r2;
    if len2 >= rsum * rsum {
        return;
    }
    let len = len2.sqrt();
    let normal = if len > 0.0 { d / len } else { Vec3::X };
    result.set_normal(normal);
    result.add_point(
        tf1.position - normal * r1,
        on_segment + normal * r2,
        rsum - len,
        0,
    );
}

/// Closest points between two segments `p1 ± d1*h1` and `p2 ± d2*h2`.
fn closest_points_on_segments(
    p1: Vec3,
    d1: Vec3,
    h1: Real,
    p2: Vec3,
    d2: Vec3,
    h2: Real,
) -> (Vec3, Vec3) {
    let r = p1 - p2;
    let dot12 = d1.dot(d2);
    let dot1r = d1.dot(r);
    let dot2r = d2.dot(r);

    let det = 1.0 - dot12 * dot12;
    let mut t1;
    if det < 1e-9 {
        // nearly parallel; pick an endpoint of the first segment
        t1 = if dot1r > 0.0 { -h1 } else { h1 };
    } else {
        t1 = ((dot12 * dot2r - dot1r) / det).clamp(-h1, h1);
    }
    // closest point on segment 2 to the clamped point, then re-clamp on 1
    let mut t2 = (dot12 * t1 + dot2r).clamp(-h2, h2);
    t1 = (dot12 * t2 - dot1r).clamp(-h1, h1);
    t2 = (dot12 * t1 + dot2r).clamp(-h2, h2);

    (p1 + d1 * t1, p2 + d2 * t2)
}

fn detect_capsule_capsule(
    result: &mut DetectorResult,
    g1: &Geometry,
    g2: &Geometry,
    tf1: &Transform,
    tf2: &Transform,
) {
    result.incremental = false;
    let (r1, h1) = g1.capsule_params().unwrap();
    let (r2, h2) = g2.capsule_params().unwrap();

    let axis1 = tf1.rotation * Vec3::Y;
    let axis2 = tf2.rotation * Vec3::Y;
    let (cp1, cp2) =
        closest_points_on_segments(tf1.position, axis1, h1, tf2.position, axis2, h2);

    let d = cp1 - cp2;
    let len2 = d.length_squared();
    let rsum = r1 + r2;
    if len2 >= rsum * rsum {
        return;
    }
    let len = len2.sqrt();
    let normal = if len > 0.0 { d / len } else { Vec3::X };
    result.set_normal(normal);
    result.add_point(cp1 - normal * r1, cp2 + normal * r2, rsum - len, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn detect(
        g1: &Geometry,
        g2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) -> DetectorResult {
        let mut np = Narrowphase::new();
        let mut result = DetectorResult::default();
        let mut cache = CachedDetectorData::default();
        np.detect(&mut result, g1, g2, tf1, tf2, &mut cache);
        result
    }

    #[test]
    fn dispatch_is_asymmetric_with_swap_bit() {
        let (d, swap) = dispatch(GeometryKind::Sphere, GeometryKind::Box);
        assert_eq!(d, Detector::SphereBox);
        assert!(!swap);
        let (d, swap) = dispatch(GeometryKind::Box, GeometryKind::Sphere);
        assert_eq!(d, Detector::SphereBox);
        assert!(swap);
        let (d, _) = dispatch(GeometryKind::Cone, GeometryKind::Box);
        assert_eq!(d, Detector::GjkEpa);
    }

    #[test]
    fn overlapping_spheres_produce_one_point() {
        let g = Geometry::sphere(1.0);
        let result = detect(
            &g,
            &g.clone(),
            &Transform::from_position(Vec3::ZERO),
            &Transform::from_position(Vec3::new(1.8, 0.0, 0.0)),
        );
        assert_eq!(result.num_points, 1);
        assert!(!result.incremental);
        // normal points from the second sphere toward the first
        assert_relative_eq!(result.normal.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(result.points[0].depth, 0.2, epsilon = 1e-12);
        assert_relative_eq!(result.points[0].position1.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.points[0].position2.x, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn separated_spheres_produce_nothing() {
        let g = Geometry::sphere(1.0);
        let result = detect(
            &g,
            &g.clone(),
            &Transform::from_position(Vec3::ZERO),
            &Transform::from_position(Vec3::new(3.0, 0.0, 0.0)),
        );
        assert_eq!(result.num_points, 0);
    }

    #[test]
    fn sphere_box_from_either_side_agrees() {
        let sphere = Geometry::sphere(0.5);
        let cuboid = Geometry::cuboid(Vec3::ONE);
        let tf_s = Transform::from_position(Vec3::new(1.3, 0.0, 0.0));
        let tf_b = Transform::from_position(Vec3::ZERO);

        let forward = detect(&sphere, &cuboid, &tf_s, &tf_b);
        let swapped = detect(&cuboid, &sphere, &tf_b, &tf_s);

        assert_eq!(forward.num_points, 1);
        assert_eq!(swapped.num_points, 1);
        assert_relative_eq!(forward.points[0].depth, 0.2, epsilon = 1e-12);
        assert_relative_eq!(swapped.points[0].depth, 0.2, epsilon = 1e-12);
        // the swap bit flips the normal
        assert_relative_eq!(forward.normal.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(swapped.normal.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(
            forward.points[0].position1.x,
            swapped.points[0].position2.x,
            epsilon = 1e-12
        );
    }

    #[test]
    fn sphere_inside_box_pushes_through_nearest_face() {
        let sphere = Geometry::sphere(0.25);
        let cuboid = Geometry::cuboid(Vec3::ONE);
        let result = detect(
            &sphere,
            &cuboid,
            &Transform::from_position(Vec3::new(0.9, 0.0, 0.0)),
            &Transform::from_position(Vec3::ZERO),
        );
        assert_eq!(result.num_points, 1);
        assert_relative_eq!(result.normal.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.points[0].depth, 0.25 + 0.1, epsilon = 1e-12);
    }

    #[test]
    fn capsules_crossed_produce_single_point() {
        let g1 = Geometry::capsule(0.3, 1.0);
        let g2 = Geometry::capsule(0.3, 1.0);
        // second capsule rotated to lie along x, centers 0.5 apart in z
        let rot = axis_y_to_x();
        let result = detect(
            &g1,
            &g2,
            &Transform::from_position(Vec3::ZERO),
            &Transform::new(Vec3::new(0.0, 0.0, 0.5), rot),
        );
        assert_eq!(result.num_points, 1);
        assert_relative_eq!(result.points[0].depth, 0.1, epsilon = 1e-9);
        assert_relative_eq!(result.normal.z, -1.0, epsilon = 1e-9);
    }

    /// Rotation mapping the local Y axis onto world X.
    fn axis_y_to_x() -> crate::utils::math::Mat3 {
        crate::utils::math::Mat3::from_rotation_z(-std::f64::consts::FRAC_PI_2)
    }

    #[test]
    fn sphere_capsule_hits_the_cap() {
        let sphere = Geometry::sphere(0.5);
        let capsule = Geometry::capsule(0.5, 1.0);
        let result = detect(
            &sphere,
            &capsule,
            &Transform::from_position(Vec3::new(0.0, 1.8, 0.0)),
            &Transform::from_position(Vec3::ZERO),
        );
        assert_eq!(result.num_points, 1);
        // segment end at y=1, gap = 1.8-1 = 0.8 < 1.0 combined radius
        assert_relative_eq!(result.points[0].depth, 0.2, epsilon = 1e-9);
        assert_relative_eq!(result.normal.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn gjk_detector_reports_incremental_contact() {
        let cone = Geometry::cone(0.5, 0.5);
        let cuboid = Geometry::cuboid(Vec3::ONE);
        let result = detect(
            &cone,
            &cuboid,
            &Transform::from_position(Vec3::new(0.0, 1.35, 0.0)),
            &Transform::from_position(Vec3::ZERO),
        );
        assert!(result.incremental);
        assert_eq!(result.num_points, 1);
        assert!(result.points[0].depth > 0.0);
        assert!(result.normal.y > 0.9);
    }
}
