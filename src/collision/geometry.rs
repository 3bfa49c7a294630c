//! Collision geometries: support mapping, bounds, mass properties, ray casts.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_GJK_MARGIN;
use crate::utils::math::{Aabb, Mat3, Real, Transform, Vec3, PI};

/// Result of a ray cast against a geometry or shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayCastHit {
    pub position: Vec3,
    pub normal: Vec3,
    /// Parametric position of the hit on the segment, in `(0, 1]`.
    pub fraction: Real,
}

/// Tag for dispatching pair detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Sphere,
    Box,
    Cylinder,
    Cone,
    Capsule,
    ConvexHull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum GeometryData {
    Sphere {
        radius: Real,
    },
    Box {
        half_extents: Vec3,
    },
    Cylinder {
        radius: Real,
        half_height: Real,
    },
    Cone {
        radius: Real,
        half_height: Real,
    },
    Capsule {
        radius: Real,
        half_height: Real,
    },
    ConvexHull {
        vertices: Vec<Vec3>,
    },
}

/// A convex collision geometry. Immutable after construction; the volume and
/// inertia coefficient (inertia tensor of the unit-density solid divided by
/// its mass) are precomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    data: GeometryData,
    gjk_margin: Real,
    volume: Real,
    inertia_coeff: Mat3,
}

impl Geometry {
    pub fn sphere(radius: Real) -> Self {
        let mut g = Self {
            data: GeometryData::Sphere { radius },
            // the sphere's support lives entirely in the margin
            gjk_margin: radius,
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        let min_half = half_extents.x.min(half_extents.y).min(half_extents.z);
        let mut g = Self {
            data: GeometryData::Box { half_extents },
            gjk_margin: DEFAULT_GJK_MARGIN.min(min_half * 0.2),
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn cylinder(radius: Real, half_height: Real) -> Self {
        let mut g = Self {
            data: GeometryData::Cylinder {
                radius,
                half_height,
            },
            gjk_margin: DEFAULT_GJK_MARGIN,
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn cone(radius: Real, half_height: Real) -> Self {
        let mut g = Self {
            data: GeometryData::Cone {
                radius,
                half_height,
            },
            gjk_margin: DEFAULT_GJK_MARGIN,
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn capsule(radius: Real, half_height: Real) -> Self {
        let mut g = Self {
            data: GeometryData::Capsule {
                radius,
                half_height,
            },
            gjk_margin: radius,
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn convex_hull(vertices: Vec<Vec3>) -> Self {
        let mut g = Self {
            data: GeometryData::ConvexHull { vertices },
            gjk_margin: DEFAULT_GJK_MARGIN,
            volume: 0.0,
            inertia_coeff: Mat3::IDENTITY,
        };
        g.update_mass();
        g
    }

    pub fn kind(&self) -> GeometryKind {
        match self.data {
            GeometryData::Sphere { .. } => GeometryKind::Sphere,
            GeometryData::Box { .. } => GeometryKind::Box,
            GeometryData::Cylinder { .. } => GeometryKind::Cylinder,
            GeometryData::Cone { .. } => GeometryKind::Cone,
            GeometryData::Capsule { .. } => GeometryKind::Capsule,
            GeometryData::ConvexHull { .. } => GeometryKind::ConvexHull,
        }
    }

    pub fn gjk_margin(&self) -> Real {
        self.gjk_margin
    }

    pub fn volume(&self) -> Real {
        self.volume
    }

    pub fn inertia_coeff(&self) -> Mat3 {
        self.inertia_coeff
    }

    pub fn sphere_radius(&self) -> Option<Real> {
        match self.data {
            GeometryData::Sphere { radius } => Some(radius),
            _ => None,
        }
    }

    pub fn box_half_extents(&self) -> Option<Vec3> {
        match self.data {
            GeometryData::Box { half_extents } => Some(half_extents),
            _ => None,
        }
    }

    pub fn capsule_params(&self) -> Option<(Real, Real)> {
        match self.data {
            GeometryData::Capsule {
                radius,
                half_height,
            } => Some((radius, half_height)),
            _ => None,
        }
    }

    /// Ray casting for this geometry must go through the GJK convex cast
    /// (there is no closed form).
    pub fn uses_gjk_ray_cast(&self) -> bool {
        matches!(self.data, GeometryData::ConvexHull { .. })
    }

    fn update_mass(&mut self) {
        match &self.data {
            GeometryData::Sphere { radius } => {
                let r2 = radius * radius;
                self.volume = 4.0 / 3.0 * PI * r2 * radius;
                self.inertia_coeff = Mat3::from_diagonal(Vec3::splat(2.0 / 5.0 * r2));
            }
            GeometryData::Box { half_extents } => {
                let sq = *half_extents * *half_extents;
                self.volume = 8.0 * half_extents.x * half_extents.y * half_extents.z;
                self.inertia_coeff = Mat3::from_diagonal(Vec3::new(
                    1.0 / 3.0 * (sq.y + sq.z),
                    1.0 / 3.0 * (sq.z + sq.x),
                    1.0 / 3.0 * (sq.x + sq.y),
                ));
            }
            GeometryData::Cylinder {
                radius,
                half_height,
            } => {
                let r2 = radius * radius;
                let h = half_height * 2.0;
                self.volume = PI * r2 * h;
                let lateral = r2 * 0.25 + h * h / 12.0;
                self.inertia_coeff =
                    Mat3::from_diagonal(Vec3::new(lateral, r2 * 0.5, lateral));
            }
            GeometryData::Cone {
                radius,
                half_height,
            } => {
                let r2 = radius * radius;
                let h = half_height * 2.0;
                self.volume = PI * r2 * h / 3.0;
                // about the geometry origin (center of the bounding cylinder)
                let lateral = 1.0 / 20.0 * (3.0 * r2 + 2.0 * h * h);
                self.inertia_coeff =
                    Mat3::from_diagonal(Vec3::new(lateral, 3.0 / 10.0 * r2, lateral));
            }
            GeometryData::Capsule {
                radius,
                half_height,
            } => {
                let r = *radius;
                let hh = *half_height;
                let r2 = r * r;
                let cyl_vol = PI * r2 * hh * 2.0;
                let sph_vol = 4.0 / 3.0 * PI * r2 * r;
                self.volume = cyl_vol + sph_vol;
                let inv_vol = if self.volume > 0.0 {
                    1.0 / self.volume
                } else {
                    0.0
                };
                let y = inv_vol * (cyl_vol * r2 * 0.5 + sph_vol * r2 * 0.4);
                let lateral = inv_vol
                    * (cyl_vol * (r2 * 0.25 + hh * hh / 3.0)
                        + sph_vol * (r2 * 0.4 + hh * hh + 0.75 * hh * r));
                self.inertia_coeff = Mat3::from_diagonal(Vec3::new(lateral, y, lateral));
            }
            GeometryData::ConvexHull { vertices } => {
                // approximated by the bounding box of the vertex cloud
                let mut min = Vec3::splat(Real::INFINITY);
                let mut max = Vec3::splat(Real::NEG_INFINITY);
                for v in vertices {
                    min = min.min(*v);
                    max = max.max(*v);
                }
                if vertices.is_empty() {
                    min = Vec3::ZERO;
                    max = Vec3::ZERO;
                }
                let he = (max - min) * 0.5;
                let sq = he * he;
                self.volume = 8.0 * he.x * he.y * he.z;
                self.inertia_coeff = Mat3::from_diagonal(Vec3::new(
                    1.0 / 3.0 * (sq.y + sq.z),
                    1.0 / 3.0 * (sq.z + sq.x),
                    1.0 / 3.0 * (sq.x + sq.y),
                ));
            }
        }
    }

    /// Supporting vertex of the *core* (margin-shrunk) geometry in local
    /// coordinates. `dir` need not be normalized.
    pub fn local_support(&self, dir: Vec3) -> Vec3 {
        match &self.data {
            GeometryData::Sphere { .. } => Vec3::ZERO,
            GeometryData::Box { half_extents } => {
                let margin = Vec3::splat(self.gjk_margin).min(*half_extents);
                let core = *half_extents - margin;
                Vec3::new(
                    if dir.x > 0.0 { core.x } else { -core.x },
                    if dir.y > 0.0 { core.y } else { -core.y },
                    if dir.z > 0.0 { core.z } else { -core.z },
                )
            }
            GeometryData::Cylinder {
                radius,
                half_height,
            } => {
                let core_radius = (radius - self.gjk_margin).max(0.0);
                let core_half = (half_height - self.gjk_margin).max(0.0);
                let y = if dir.y > 0.0 { core_half } else { -core_half };
                let len2 = dir.x * dir.x + dir.z * dir.z;
                if len2 > 0.0 {
                    let inv = core_radius / len2.sqrt();
                    Vec3::new(dir.x * inv, y, dir.z * inv)
                } else {
                    Vec3::new(0.0, y, 0.0)
                }
            }
            GeometryData::Cone {
                radius,
                half_height,
            } => {
                let core_radius = (radius - self.gjk_margin).max(0.0);
                let core_half = (half_height - self.gjk_margin).max(0.0);
                let h = half_height * 2.0;
                let sin_theta = radius / (radius * radius + h * h).sqrt();
                let dlen = dir.length();
                if dir.y > 0.0 && dlen > 0.0 && dir.y > dlen * sin_theta {
                    return Vec3::new(0.0, core_half, 0.0);
                }
                let len2 = dir.x * dir.x + dir.z * dir.z;
                if len2 > 0.0 {
                    let inv = core_radius / len2.sqrt();
                    Vec3::new(dir.x * inv, -core_half, dir.z * inv)
                } else {
                    Vec3::new(0.0, -core_half, 0.0)
                }
            }
            GeometryData::Capsule { half_height, .. } => {
                // the core is the inner segment; the radius is all margin
                Vec3::new(
                    0.0,
                    if dir.y > 0.0 {
                        *half_height
                    } else {
                        -half_height
                    },
                    0.0,
                )
            }
            GeometryData::ConvexHull { vertices } => {
                let mut best = Vec3::ZERO;
                let mut best_dot = Real::NEG_INFINITY;
                for v in vertices {
                    let d = v.dot(dir);
                    if d > best_dot {
                        best_dot = d;
                        best = *v;
                    }
                }
                best
            }
        }
    }

    /// World AABB of the geometry under `transform`.
    pub fn compute_aabb(&self, transform: &Transform) -> Aabb {
        match &self.data {
            GeometryData::Sphere { radius } => Aabb {
                min: transform.position - Vec3::splat(*radius),
                max: transform.position + Vec3::splat(*radius),
            },
            GeometryData::Box { half_extents } => {
                let r = transform.rotation;
                let ext = (r * Vec3::new(half_extents.x, 0.0, 0.0)).abs()
                    + (r * Vec3::new(0.0, half_extents.y, 0.0)).abs()
                    + (r * Vec3::new(0.0, 0.0, half_extents.z)).abs();
                Aabb {
                    min: transform.position - ext,
                    max: transform.position + ext,
                }
            }
            GeometryData::Cylinder {
                radius,
                half_height,
            }
            | GeometryData::Cone {
                radius,
                half_height,
            } => {
                let axis = (transform.rotation * Vec3::Y).abs();
                let disc = Vec3::new(
                    (1.0 - axis.x * axis.x).max(0.0).sqrt(),
                    (1.0 - axis.y * axis.y).max(0.0).sqrt(),
                    (1.0 - axis.z * axis.z).max(0.0).sqrt(),
                );
                let ext = axis * *half_height + disc * *radius;
                Aabb {
                    min: transform.position - ext,
                    max: transform.position + ext,
                }
            }
            GeometryData::Capsule {
                radius,
                half_height,
            } => {
                let axis = (transform.rotation * Vec3::Y).abs();
                let ext = axis * *half_height + Vec3::splat(*radius);
                Aabb {
                    min: transform.position - ext,
                    max: transform.position + ext,
                }
            }
            GeometryData::ConvexHull { vertices } => {
                let mut min = Vec3::splat(Real::INFINITY);
                let mut max = Vec3::splat(Real::NEG_INFINITY);
                for v in vertices {
                    let w = transform.point_to_world(*v);
                    min = min.min(w);
                    max = max.max(w);
                }
                if vertices.is_empty() {
                    min = transform.position;
                    max = transform.position;
                }
                Aabb {
                    min: min - Vec3::splat(self.gjk_margin),
                    max: max + Vec3::splat(self.gjk_margin),
                }
            }
        }
    }

    /// Local-space parametric ray cast. Rays starting inside the geometry
    /// miss by design. Returns `None` for geometries that route through the
    /// GJK convex cast.
    pub fn ray_cast_local(&self, begin: Vec3, end: Vec3) -> Option<RayCastHit> {
        match &self.data {
            GeometryData::Sphere { radius } => ray_sphere(begin, end, *radius),
            GeometryData::Box { half_extents } => ray_box(begin, end, *half_extents),
            GeometryData::Cylinder {
                radius,
                half_height,
            } => ray_cylinder(begin, end, *radius, *half_height),
            GeometryData::Cone {
                radius,
                half_height,
            } => ray_cone(begin, end, *radius, *half_height),
            GeometryData::Capsule {
                radius,
                half_height,
            } => ray_capsule(begin, end, *radius, *half_height),
            GeometryData::ConvexHull { .. } => None,
        }
    }

    /// World-space ray cast through `transform`.
    pub fn ray_cast(&self, begin: Vec3, end: Vec3, transform: &Transform) -> Option<RayCastHit> {
        let begin_local = transform.point_to_local(begin);
        let end_local = transform.point_to_local(end);
        let hit = self.ray_cast_local(begin_local, end_local)?;
        Some(RayCastHit {
            position: transform.point_to_world(hit.position),
            normal: transform.vector_to_world(hit.normal),
            fraction: hit.fraction,
        })
    }
}

fn ray_sphere(begin: Vec3, end: Vec3, radius: Real) -> Option<RayCastHit> {
    let d = end - begin;
    let a = d.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = begin.dot(d);
    let c = begin.length_squared() - radius * radius;
    if c <= 0.0 {
        return None; // begins inside
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if t <= 0.0 || t > 1.0 {
        return None;
    }
    let position = begin + d * t;
    Some(RayCastHit {
        position,
        normal: position.normalize_or_zero(),
        fraction: t,
    })
}

fn ray_box(begin: Vec3, end: Vec3, half_extents: Vec3) -> Option<RayCastHit> {
    let d = end - begin;
    let mut t_min: Real = 0.0;
    let mut t_max: Real = 1.0;
    let mut hit_axis = 3usize;
    for i in 0..3 {
        let o = begin[i];
        let dd = d[i];
        let h = half_extents[i];
        if dd > -1e-9 && dd < 1e-9 {
            if o <= -h || o >= h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dd;
        let mut t1 = (-h - o) * inv;
        let mut t2 = (h - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > t_min {
            t_min = t1;
            hit_axis = i;
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    if t_min == 0.0 || hit_axis == 3 {
        return None; // the ray starts from inside
    }
    let mut normal = Vec3::ZERO;
    normal[hit_axis] = if d[hit_axis] > 0.0 { -1.0 } else { 1.0 };
    Some(RayCastHit {
        position: begin + d * t_min,
        normal,
        fraction: t_min,
    })
}

fn ray_cylinder(begin: Vec3, end: Vec3, radius: Real, half_height: Real) -> Option<RayCastHit> {
    let d = end - begin;
    let mut best: Option<RayCastHit> = None;

    // lateral surface
    let a = d.x * d.x + d.z * d.z;
    if a > 1e-12 {
        let b = begin.x * d.x + begin.z * d.z;
        let c = begin.x * begin.x + begin.z * begin.z - radius * radius;
        let disc = b * b - a * c;
        if disc >= 0.0 && c > 0.0 {
            let t = (-b - disc.sqrt()) / a;
            if t > 0.0 && t <= 1.0 {
                let p = begin + d * t;
                if p.y.abs() <= half_height {
                    best = Some(RayCastHit {
                        position: p,
                        normal: Vec3::new(p.x, 0.0, p.z).normalize_or_zero(),
                        fraction: t,
                    });
                }
            }
        }
    }

    // caps
    if d.y.abs() > 1e-12 {
        for cap in [-half_height, half_height] {
            let t = (cap - begin.y) / d.y;
            if t <= 0.0 || t > 1.0 {
                continue;
            }
            let p = begin + d * t;
            if p.x * p.x + p.z * p.z <= radius * radius {
                let hit = RayCastHit {
                    position: p,
                    normal: Vec3::new(0.0, cap.signum(), 0.0),
                    fraction: t,
                };
                if best.map_or(true, |b| hit.fraction < b.fraction) {
                    best = Some(hit);
                }
            }
        }
    }

    // inside start rejection
    if begin.y.abs() < half_height && begin.x * begin.x + begin.z * begin.z < radius * radius {
        return None;
    }
    best
}

fn ray_cone(begin: Vec3, end: Vec3, radius: Real, half_height: Real) -> Option<RayCastHit> {
    let d = end - begin;
    let k = radius / (2.0 * half_height);

    // inside start rejection
    let begin_rho = (begin.x * begin.x + begin.z * begin.z).sqrt();
    if begin.y.abs() < half_height && begin_rho < k * (half_height - begin.y) {
        return None;
    }

    let mut best: Option<RayCastHit> = None;

    // lateral surface: x² + z² = k²(h − y)², apex at +h
    let a = d.x * d.x + d.z * d.z - k * k * d.y * d.y;
    let hy = half_height - begin.y;
    let b = begin.x * d.x + begin.z * d.z + k * k * hy * d.y;
    let c = begin.x * begin.x + begin.z * begin.z - k * k * hy * hy;
    if c > 0.0 {
        let candidates: [Option<Real>; 2] = if a.abs() > 1e-12 {
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let s = disc.sqrt();
                [Some((-b - s) / a), Some((-b + s) / a)]
            } else {
                [None, None]
            }
        } else if b.abs() > 1e-12 {
            [Some(-c / (2.0 * b)), None]
        } else {
            [None, None]
        };
        for t in candidates.into_iter().flatten() {
            if t <= 0.0 || t > 1.0 {
                continue;
            }
            let p = begin + d * t;
            if p.y < -half_height || p.y > half_height {
                continue;
            }
            let rho = (p.x * p.x + p.z * p.z).sqrt();
            if rho < 1e-12 {
                continue;
            }
            let normal = Vec3::new(p.x / rho, k, p.z / rho).normalize();
            let hit = RayCastHit {
                position: p,
                normal,
                fraction: t,
            };
            if best.map_or(true, |b| hit.fraction < b.fraction) {
                best = Some(hit);
            }
        }
    }

    // base disc
    if d.y.abs() > 1e-12 {
        let t = (-half_height - begin.y) / d.y;
        if t > 0.0 && t <= 1.0 {
            let p = begin + d * t;
            if p.x * p.x + p.z * p.z <= radius * radius {
                let hit = RayCastHit {
                    position: p,
                    normal: Vec3::new(0.0, -1.0, 0.0),
                    fraction: t,
                };
                if best.map_or(true, |b| hit.fraction < b.fraction) {
                    best = Some(hit);
                }
            }
        }
    }

    best
}

fn ray_capsule(begin: Vec3, end: Vec3, radius: Real, half_height: Real) -> Option<RayCastHit> {
    // inside start rejection against the padded segment
    let clamped = begin.y.clamp(-half_height, half_height);
    let to_axis = begin - Vec3::new(0.0, clamped, 0.0);
    if to_axis.length_squared() < radius * radius {
        return None;
    }

    let d = end - begin;
    let mut best: Option<RayCastHit> = None;

    // cylindrical side
    let a = d.x * d.x + d.z * d.z;
    if a > 1e-12 {
        let b = begin.x * d.x + begin.z * d.z;
        let c = begin.x * begin.x + begin.z * begin.z - radius * radius;
        let disc = b * b - a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / a;
            if t > 0.0 && t <= 1.0 {
                let p = begin + d * t;
                if p.y.abs() <= half_height {
                    best = Some(RayCastHit {
                        position: p,
                        normal: Vec3::new(p.x, 0.0, p.z).normalize_or_zero(),
                        fraction: t,
                    });
                }
            }
        }
    }

    // end caps
    for cap in [Vec3::new(0.0, half_height, 0.0), Vec3::new(0.0, -half_height, 0.0)] {
        if let Some(hit) = ray_sphere(begin - cap, end - cap, radius) {
            let hit = RayCastHit {
                position: hit.position + cap,
                normal: hit.normal,
                fraction: hit.fraction,
            };
            if best.map_or(true, |b| hit.fraction < b.fraction) {
                best = Some(hit);
            }
        }
    }

    best
}
