//! GJK distance/penetration queries and convex casting.
//!
//! One `GjkEpa` value is a reusable scratch space owned by the world's
//! narrow phase and threaded into every detector call.

use log::debug;

use crate::collision::epa::{EpaPolyhedron, EpaVertex};
use crate::collision::geometry::{Geometry, RayCastHit};
use crate::utils::math::{Real, Transform, Vec3};

const GJK_EPS: Real = 1.0e-4;
const GJK_EPS2: Real = GJK_EPS * GJK_EPS;
const EPA_IMPROVEMENT_EPS: Real = 1.0e-6;
const TETRA_VALIDITY_EPS: Real = 1.0e-12;
const MAX_ITERATIONS: usize = 40;

/// Outcome of a GJK/EPA query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GjkEpaState {
    Succeeded,
    GjkFailedToMakeTetrahedron,
    GjkDidNotConverge,
    EpaFailedToInit,
    EpaFailedToAddVertex,
    EpaDidNotConverge,
}

/// Per-pair warm-start data: the closest direction found last step.
#[derive(Debug, Clone, Copy, Default)]
pub struct GjkCache {
    pub prev_closest_dir: Vec3,
}

impl GjkCache {
    pub fn clear(&mut self) {
        self.prev_closest_dir = Vec3::ZERO;
    }
}

/// Projects the origin onto the segment `(v1, v2)`. Returns the projected
/// point and the bitmask of the vertices spanning the voronoi region.
pub fn project_origin2(v1: Vec3, v2: Vec3) -> (Vec3, u32) {
    let v12 = v1 - v2;
    let d = v12.dot(v12);
    let t = if d != 0.0 { -v12.dot(v1) / d } else { 0.0 };
    if t < 0.0 {
        return (v1, 0b01);
    }
    if t > 1.0 {
        return (v2, 0b10);
    }
    (v1 + v12 * t, 0b11)
}

/// Projects the origin onto the triangle `(v1, v2, v3)`.
pub fn project_origin3(v1: Vec3, v2: Vec3, v3: Vec3) -> (Vec3, u32) {
    let v12 = v2 - v1;
    let v23 = v3 - v2;
    let v31 = v1 - v3;
    let n = v12.cross(v23);
    let n12 = v12.cross(n);
    let n23 = v23.cross(n);
    let n31 = v31.cross(n);
    let d12 = v1.dot(n12);
    let d23 = v2.dot(n23);
    let d31 = v3.dot(n31);

    let mut min_d = -1.0;
    let mut min_v = Vec3::ZERO;
    let mut min_i = 0u32;

    if d12 < 0.0 {
        let (out, b) = project_origin2(v1, v2);
        min_i = b;
        min_d = out.length_squared();
        min_v = out;
    }
    if d23 < 0.0 {
        let (out, b) = project_origin2(v2, v3);
        let d = out.length_squared();
        if min_d < 0.0 || d < min_d {
            min_i = b << 1; // vertices 2 and 3
            min_d = d;
            min_v = out;
        }
    }
    if d31 < 0.0 {
        let (out, b) = project_origin2(v1, v3);
        let d = out.length_squared();
        if min_d < 0.0 || d < min_d {
            min_i = (b & 1) | ((b & 2) << 1); // vertices 1 and 3
            min_d = d;
            min_v = out;
        }
    }
    if min_d > 0.0 {
        return (min_v, min_i);
    }

    // the origin projects onto the face interior
    let n = n.normalize_or_zero();
    let dn = v1.dot(n);
    (n * dn, 0b111)
}

/// Projects the origin onto the tetrahedron `(v1, v2, v3, v4)`.
pub fn project_origin4(v1: Vec3, v2: Vec3, v3: Vec3, v4: Vec3) -> (Vec3, u32) {
    let v12 = v2 - v1;
    let v13 = v3 - v1;
    let v14 = v4 - v1;
    let v23 = v3 - v2;
    let v24 = v4 - v2;

    let n123 = v12.cross(v13);
    let n134 = v13.cross(v14);
    let n142 = v14.cross(v12);
    let n243 = v24.cross(v23);

    let sign: Real = if v12.dot(n243) > 0.0 { 1.0 } else { -1.0 };
    let d123 = v1.dot(n123);
    let d134 = v1.dot(n134);
    let d142 = v1.dot(n142);
    let d243 = v2.dot(n243);

    let mut min_d = -1.0;
    let mut min_v = Vec3::ZERO;
    let mut min_i = 0u32;

    if d123 * sign < 0.0 {
        let (out, b) = project_origin3(v1, v2, v3);
        min_i = b;
        min_d = out.length_squared();
        min_v = out;
    }
    if d134 * sign < 0.0 {
        let (out, b) = project_origin3(v1, v3, v4);
        let d = out.length_squared();
        if min_d < 0.0 || d < min_d {
            min_i = (b & 1) | ((b & 6) << 1); // 321 -> 3201
            min_d = d;
            min_v = out;
        }
    }
    if d142 * sign < 0.0 {
        let (out, b) = project_origin3(v1, v2, v4);
        let d = out.length_squared();
        if min_d < 0.0 || d < min_d {
            min_i = (b & 3) | ((b & 4) << 1); // 321 -> 3021
            min_d = d;
            min_v = out;
        }
    }
    if d243 * sign < 0.0 {
        let (out, b) = project_origin3(v2, v3, v4);
        let d = out.length_squared();
        if min_d < 0.0 || d < min_d {
            min_i = b << 1; // 321 -> 3210
            min_d = d;
            min_v = out;
        }
    }
    if min_d > 0.0 {
        return (min_v, min_i);
    }

    // the origin is inside the tetrahedron
    (Vec3::ZERO, 0b1111)
}

/// GJK/EPA scratch space plus the last query's outputs.
pub struct GjkEpa {
    // simplex vertices s[i] = w1[i] - w2[i]
    s: [Vec3; 4],
    w1: [Vec3; 4],
    w2: [Vec3; 4],
    simplex_size: usize,

    dir: Vec3,
    closest: Vec3,
    depth: Real,
    polyhedron: EpaPolyhedron,

    /// Closest point on the first geometry, world coordinates.
    pub closest_point1: Vec3,
    /// Closest point on the second geometry, world coordinates.
    pub closest_point2: Vec3,
    /// Distance between the core shapes; negative when overlapping.
    pub distance: Real,
}

impl Default for GjkEpa {
    fn default() -> Self {
        Self::new()
    }
}

const BASE_DIRS: [Vec3; 3] = [Vec3::X, Vec3::Y, Vec3::Z];

impl GjkEpa {
    pub fn new() -> Self {
        Self {
            s: [Vec3::ZERO; 4],
            w1: [Vec3::ZERO; 4],
            w2: [Vec3::ZERO; 4],
            simplex_size: 0,
            dir: Vec3::ZERO,
            closest: Vec3::ZERO,
            depth: 0.0,
            polyhedron: EpaPolyhedron::new(),
            closest_point1: Vec3::ZERO,
            closest_point2: Vec3::ZERO,
            distance: 0.0,
        }
    }

    /// Computes the closest points of `c1` and `c2`, running EPA for the
    /// penetration depth when the shapes overlap.
    pub fn compute_closest_points(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: Option<&mut GjkCache>,
    ) -> GjkEpaState {
        self.compute_closest_points_impl(c1, c2, tf1, tf2, cache, true)
    }

    /// Distance-only query; does not resolve negative distances.
    pub fn compute_distance(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: Option<&mut GjkCache>,
    ) -> GjkEpaState {
        self.compute_closest_points_impl(c1, c2, tf1, tf2, cache, false)
    }

    fn compute_closest_points_impl(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        cache: Option<&mut GjkCache>,
        use_epa: bool,
    ) -> GjkEpaState {
        let mut cache = cache;
        self.dir = match &cache {
            Some(c) => c.prev_closest_dir,
            None => Vec3::ZERO,
        };
        if self.dir.length_squared() == 0.0 {
            self.dir = tf2.position - tf1.position;
            if self.dir.length_squared() < 1e-6 {
                self.dir = Vec3::X;
            }
        }

        self.simplex_size = 0;
        self.compute_supporting_vertex(c1, c2, tf1, tf2);
        self.simplex_size = 1;

        for _count in 0..MAX_ITERATIONS {
            // project the origin onto the simplex; the bitmask names the
            // spanning voronoi region
            let v = match self.simplex_size {
                1 => {
                    self.closest = self.s[0];
                    0b1
                }
                2 => {
                    let (out, v) = project_origin2(self.s[0], self.s[1]);
                    self.closest = out;
                    v
                }
                3 => {
                    let (out, v) = project_origin3(self.s[0], self.s[1], self.s[2]);
                    self.closest = out;
                    v
                }
                _ => {
                    let (out, v) =
                        project_origin4(self.s[0], self.s[1], self.s[2], self.s[3]);
                    self.closest = out;
                    v
                }
            };

            if self.closest.length_squared() < GJK_EPS2 {
                // the origin is touching or inside the simplex
                if !use_epa {
                    self.distance = 0.0;
                    return GjkEpaState::Succeeded;
                }
                match self.simplex_size {
                    1 => self.point_to_tetrahedron(c1, c2, tf1, tf2),
                    2 => self.line_to_tetrahedron(c1, c2, tf1, tf2),
                    3 => self.triangle_to_tetrahedron(c1, c2, tf1, tf2),
                    _ => {}
                }
                if self.simplex_size == 4 {
                    let state = self.compute_depth(c1, c2, tf1, tf2);
                    if state != GjkEpaState::Succeeded {
                        self.distance = 0.0;
                        return state;
                    }
                    self.distance = -self.depth;
                    return GjkEpaState::Succeeded;
                }
                self.distance = 0.0;
                return GjkEpaState::GjkFailedToMakeTetrahedron;
            }

            self.shrink_simplex(v);

            self.dir = -self.closest;
            self.compute_supporting_vertex(c1, c2, tf1, tf2);
            if self.dir.length_squared() < GJK_EPS2 {
                return GjkEpaState::GjkDidNotConverge;
            }

            let d1 = self.closest.dot(self.dir);
            let d2 = self.s[self.simplex_size].dot(self.dir);
            if d2 - d1 < GJK_EPS2 {
                // no improvement; the simplex holds the closest feature
                self.interpolate_closest_points();
                self.distance = self.closest.length();
                if let Some(c) = cache.as_deref_mut() {
                    c.prev_closest_dir = -self.closest;
                }
                return GjkEpaState::Succeeded;
            }

            self.simplex_size += 1;
        }

        debug!("GJK did not converge");
        GjkEpaState::GjkDidNotConverge
    }

    /// Casts moving convex `c1` against moving convex `c2`; `c1 == None`
    /// models a point (ray origin). Translations are `tl1` and `tl2`.
    pub fn convex_cast(
        &mut self,
        c1: Option<&Geometry>,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
        tl1: Vec3,
        tl2: Vec3,
        hit: &mut RayCastHit,
    ) -> bool {
        self.dir = tf2.position - tf1.position;
        if self.dir.length_squared() < 1e-6 {
            self.dir = Vec3::X;
        }

        self.simplex_size = 0;
        self.compute_cast_supporting_vertex(c1, c2, tf1, tf2);
        self.simplex_size = 1;

        let mut lambda: Real = 0.0;
        let mut ray_x = Vec3::ZERO; // accumulated origin shift
        let ray_r = tl2 - tl1; // relative translation

        for _count in 0..MAX_ITERATIONS {
            let v = match self.simplex_size {
                1 => {
                    self.closest = self.s[0];
                    0b1
                }
                2 => {
                    let (out, v) = project_origin2(self.s[0], self.s[1]);
                    self.closest = out;
                    v
                }
                3 => {
                    let (out, v) = project_origin3(self.s[0], self.s[1], self.s[2]);
                    self.closest = out;
                    v
                }
                _ => {
                    let (out, v) =
                        project_origin4(self.s[0], self.s[1], self.s[2], self.s[3]);
                    self.closest = out;
                    v
                }
            };

            self.shrink_simplex(v);

            if self.closest.length_squared() < GJK_EPS2 {
                if lambda == 0.0 || self.simplex_size == 4 {
                    hit.fraction = lambda;
                    return false; // overlapping at the start
                }
                self.interpolate_closest_points();
                hit.fraction = lambda;
                hit.normal = self.dir.normalize_or_zero();
                hit.position = self.closest_point1 + tl1 * lambda;
                return true;
            }

            self.dir = -self.closest;
            self.compute_cast_supporting_vertex(c1, c2, tf1, tf2);
            self.s[self.simplex_size] -= ray_x; // translate to the shifted origin
            if self.dir.length_squared() < GJK_EPS2 {
                return false;
            }

            let p = self.s[self.simplex_size];
            let n = self.dir;

            // reject part of the ray
            let pn = p.dot(n);
            if pn < 0.0 {
                if ray_r.dot(n) >= 0.0 {
                    return false; // moving away
                }
                let d_lambda = pn / ray_r.dot(n);
                lambda += d_lambda;
                if lambda >= 1.0 {
                    return false;
                }
                ray_x += ray_r * d_lambda;
                // translate the simplex along with the origin
                for i in 0..=self.simplex_size {
                    self.s[i] -= ray_r * d_lambda;
                }
            }

            // never add a duplicate vertex
            let mut duplicate = false;
            for i in 0..self.simplex_size {
                if (self.s[i] - self.s[self.simplex_size]).length_squared() < GJK_EPS2 {
                    duplicate = true;
                    break;
                }
            }
            if !duplicate && self.simplex_size < 4 {
                self.simplex_size += 1;
            }
        }

        debug!("GJK convex cast did not converge");
        false
    }

    /// Ray cast modeled as a convex cast of a degenerate first geometry.
    pub fn ray_cast(
        &mut self,
        c: &Geometry,
        tf: &Transform,
        begin: Vec3,
        end: Vec3,
        hit: &mut RayCastHit,
    ) -> bool {
        let tf1 = Transform::from_position(begin);
        self.convex_cast(None, c, &tf1, tf, end - begin, Vec3::ZERO, hit)
    }

    fn interpolate_closest_points(&mut self) {
        match self.simplex_size {
            1 => {
                self.closest_point1 = self.w1[0];
                self.closest_point2 = self.w2[0];
            }
            2 => {
                let c = self.closest;
                let s01 = self.s[1] - self.s[0];
                let mut inv_det = s01.dot(s01);
                if inv_det != 0.0 {
                    inv_det = 1.0 / inv_det;
                }
                let t = (c - self.s[0]).dot(s01) * inv_det;
                self.closest_point1 = self.w1[0] + (self.w1[1] - self.w1[0]) * t;
                self.closest_point2 = self.w2[0] + (self.w2[1] - self.w2[0]) * t;
            }
            3 => {
                let c = self.closest;
                let s01 = self.s[1] - self.s[0];
                let s02 = self.s[2] - self.s[0];
                let s0c = c - self.s[0];
                let d11 = s01.dot(s01);
                let d12 = s01.dot(s02);
                let d22 = s02.dot(s02);
                let d1c = s01.dot(s0c);
                let d2c = s02.dot(s0c);
                let mut inv_det = d11 * d22 - d12 * d12;
                if inv_det != 0.0 {
                    inv_det = 1.0 / inv_det;
                }
                let s = (d1c * d22 - d2c * d12) * inv_det;
                let t = (-d1c * d12 + d2c * d11) * inv_det;
                self.closest_point1 = self.w1[0]
                    + (self.w1[1] - self.w1[0]) * s
                    + (self.w1[2] - self.w1[0]) * t;
                self.closest_point2 = self.w2[0]
                    + (self.w2[1] - self.w2[0]) * s
                    + (self.w2[2] - self.w2[0]) * t;
            }
            _ => unreachable!("simplex of size 4 does not reach interpolation"),
        }
    }

    /// Reduces the simplex to the subset named by the voronoi bitmask,
    /// compacting with a fixed index shuffle.
    fn shrink_simplex(&mut self, vertex_bits: u32) {
        self.simplex_size = vertex_bits.count_ones() as usize;
        match vertex_bits {
            2 => self.move_vertex(1, 0),
            4 | 6 => self.move_vertex(2, 0),
            5 => self.move_vertex(2, 1),
            8 | 10 | 14 => self.move_vertex(3, 0),
            9 | 13 => self.move_vertex(3, 1),
            11 => self.move_vertex(3, 2),
            12 => {
                self.move_vertex(2, 0);
                self.move_vertex(3, 1);
            }
            _ => {} // 0, 1, 3, 7, 15: already compact
        }
    }

    fn move_vertex(&mut self, from: usize, to: usize) {
        self.s[to] = self.s[from];
        self.w1[to] = self.w1[from];
        self.w2[to] = self.w2[from];
    }

    fn compute_supporting_vertex(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        self.compute_witness_point1(c1, tf1, false);
        self.compute_witness_point2(c2, tf2, false);
        self.s[self.simplex_size] = self.w1[self.simplex_size] - self.w2[self.simplex_size];
    }

    fn compute_cast_supporting_vertex(
        &mut self,
        c1: Option<&Geometry>,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        match c1 {
            Some(c1) => self.compute_witness_point1(c1, tf1, true),
            None => self.w1[self.simplex_size] = tf1.position,
        }
        self.compute_witness_point2(c2, tf2, true);
        self.s[self.simplex_size] = self.w1[self.simplex_size] - self.w2[self.simplex_size];
    }

    fn compute_witness_point1(&mut self, c1: &Geometry, tf1: &Transform, add_margin: bool) {
        let local_dir = tf1.vector_to_local(self.dir);
        let mut w = c1.local_support(local_dir);
        if add_margin {
            w += local_dir.normalize_or_zero() * c1.gjk_margin();
        }
        self.w1[self.simplex_size] = tf1.point_to_world(w);
    }

    fn compute_witness_point2(&mut self, c2: &Geometry, tf2: &Transform, add_margin: bool) {
        let local_dir = -tf2.vector_to_local(self.dir);
        let mut w = c2.local_support(local_dir);
        if add_margin {
            w += local_dir.normalize_or_zero() * c2.gjk_margin();
        }
        self.w2[self.simplex_size] = tf2.point_to_world(w);
    }

    // --- tetrahedron promotion along base axes ---

    fn point_to_tetrahedron(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        for base in BASE_DIRS {
            for dir in [base, -base] {
                self.dir = dir;
                self.compute_supporting_vertex(c1, c2, tf1, tf2);
                self.simplex_size += 1;
                self.line_to_tetrahedron(c1, c2, tf1, tf2);
                if self.simplex_size == 4 {
                    return;
                }
                self.simplex_size -= 1;
            }
        }
    }

    fn line_to_tetrahedron(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        let old_dir = self.dir;
        let line_dir = self.s[0] - self.s[1];
        for base in BASE_DIRS {
            let new_dir = line_dir.cross(base);
            for dir in [new_dir, -new_dir] {
                self.dir = dir;
                self.compute_supporting_vertex(c1, c2, tf1, tf2);
                self.simplex_size += 1;
                self.triangle_to_tetrahedron(c1, c2, tf1, tf2);
                if self.simplex_size == 4 {
                    self.dir = old_dir;
                    return;
                }
                self.simplex_size -= 1;
            }
        }
        self.dir = old_dir;
    }

    fn triangle_to_tetrahedron(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        let old_dir = self.dir;
        let n = (self.s[1] - self.s[0]).cross(self.s[2] - self.s[0]);
        for dir in [n, -n] {
            self.dir = dir;
            self.compute_supporting_vertex(c1, c2, tf1, tf2);
            self.simplex_size += 1;
            if self.is_valid_tetrahedron() {
                self.dir = old_dir;
                return;
            }
            self.simplex_size -= 1;
        }
        self.dir = old_dir;
    }

    fn is_valid_tetrahedron(&self) -> bool {
        let e0 = self.s[1] - self.s[0];
        let e1 = self.s[2] - self.s[0];
        let e2 = self.s[3] - self.s[0];
        let det = e0.dot(e1.cross(e2));
        det > TETRA_VALIDITY_EPS || det < -TETRA_VALIDITY_EPS
    }

    // --- EPA ---

    fn compute_depth(
        &mut self,
        c1: &Geometry,
        c2: &Geometry,
        tf1: &Transform,
        tf2: &Transform,
    ) -> GjkEpaState {
        let v0 = EpaVertex::new(self.s[0], self.w1[0], self.w2[0]);
        let v1 = EpaVertex::new(self.s[1], self.w1[1], self.w2[1]);
        let v2 = EpaVertex::new(self.s[2], self.w1[2], self.w2[2]);
        let v3 = EpaVertex::new(self.s[3], self.w1[3], self.w2[3]);
        if !self.polyhedron.init(v0, v1, v2, v3) {
            debug!("EPA failed at initialization: {:?}", self.polyhedron.status());
            return GjkEpaState::EpaFailedToInit;
        }

        self.simplex_size = 0;
        for count in 0..MAX_ITERATIONS {
            let Some(face) = self.polyhedron.best_triangle() else {
                return GjkEpaState::EpaDidNotConverge;
            };
            self.dir = self.polyhedron.triangle_normal(face).normalize_or_zero();
            if self.dir.length_squared() == 0.0 {
                return GjkEpaState::EpaDidNotConverge;
            }
            self.compute_supporting_vertex(c1, c2, tf1, tf2);

            let [i0, i1, i2] = self.polyhedron.triangle_vertices(face);
            let v0 = *self.polyhedron.vertex(i0);
            let v1 = *self.polyhedron.vertex(i1);
            let v2 = *self.polyhedron.vertex(i2);

            let dot1 = v0.v.dot(self.dir);
            let dot2 = self.s[0].dot(self.dir);

            if dot2 - dot1 < EPA_IMPROVEMENT_EPS || count == MAX_ITERATIONS - 1 {
                // interpolate witness points over the winning face
                self.closest = self.dir * self.dir.dot(v0.v);

                let s01 = v1.v - v0.v;
                let s02 = v2.v - v0.v;
                let s0c = self.closest - v0.v;
                let d11 = s01.dot(s01);
                let d12 = s01.dot(s02);
                let d22 = s02.dot(s02);
                let d1c = s01.dot(s0c);
                let d2c = s02.dot(s0c);
                let mut inv_det = d11 * d22 - d12 * d12;
                if inv_det != 0.0 {
                    inv_det = 1.0 / inv_det;
                }
                let s = (d1c * d22 - d2c * d12) * inv_det;
                let t = (-d1c * d12 + d2c * d11) * inv_det;

                self.closest_point1 = v0.w1 + (v1.w1 - v0.w1) * s + (v2.w1 - v0.w1) * t;
                self.closest_point2 = v0.w2 + (v1.w2 - v0.w2) * s + (v2.w2 - v0.w2) * t;
                self.depth = self.closest.length();
                return GjkEpaState::Succeeded;
            }

            let vertex = EpaVertex::new(self.s[0], self.w1[0], self.w2[0]);
            if !self.polyhedron.add_vertex(vertex, face) {
                debug!(
                    "EPA failed at vertex addition: {:?}",
                    self.polyhedron.status()
                );
                return GjkEpaState::EpaFailedToAddVertex;
            }
        }

        debug!("EPA did not converge");
        GjkEpaState::EpaDidNotConverge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn project_origin2_voronoi_regions() {
        let (p, b) = project_origin2(Vec3::new(1.0, 1.0, 0.0), Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(b, 0b01);
        assert_eq!(p, Vec3::new(1.0, 1.0, 0.0));

        let (p, b) = project_origin2(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(b, 0b11);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn project_origin3_face_region() {
        let (p, b) = project_origin3(
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.5),
        );
        assert_eq!(b, 0b111);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn project_origin4_inside() {
        let (p, b) = project_origin4(
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
        );
        assert_eq!(b, 0b1111);
        assert_eq!(p, Vec3::ZERO);
    }

    #[test]
    fn distance_between_separated_spheres() {
        let mut gjk = GjkEpa::new();
        let s1 = Geometry::sphere(1.0);
        let s2 = Geometry::sphere(1.0);
        let tf1 = Transform::from_position(Vec3::ZERO);
        let tf2 = Transform::from_position(Vec3::new(5.0, 0.0, 0.0));
        let state = gjk.compute_closest_points(&s1, &s2, &tf1, &tf2, None);
        assert_eq!(state, GjkEpaState::Succeeded);
        // sphere cores are points; core distance is the center distance
        assert_relative_eq!(gjk.distance, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn distance_between_separated_boxes() {
        let mut gjk = GjkEpa::new();
        let b1 = Geometry::cuboid(Vec3::ONE);
        let b2 = Geometry::cuboid(Vec3::ONE);
        let tf1 = Transform::from_position(Vec3::ZERO);
        let tf2 = Transform::from_position(Vec3::new(4.0, 0.0, 0.0));
        let state = gjk.compute_closest_points(&b1, &b2, &tf1, &tf2, None);
        assert_eq!(state, GjkEpaState::Succeeded);
        let margin = b1.gjk_margin() + b2.gjk_margin();
        assert_relative_eq!(gjk.distance, 2.0 + margin, epsilon = 1e-6);
    }

    #[test]
    fn epa_reports_penetration_of_overlapping_boxes() {
        let mut gjk = GjkEpa::new();
        let b1 = Geometry::cuboid(Vec3::ONE);
        let b2 = Geometry::cuboid(Vec3::ONE);
        let tf1 = Transform::from_position(Vec3::ZERO);
        let tf2 = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let state = gjk.compute_closest_points(&b1, &b2, &tf1, &tf2, None);
        assert_eq!(state, GjkEpaState::Succeeded);
        // core boxes (margin-shrunk) overlap by 2*(1 - margin) - 1
        let expected = 2.0 * (1.0 - b1.gjk_margin()) - 1.0;
        assert!(gjk.distance < 0.0);
        assert_relative_eq!(-gjk.distance, expected, epsilon = 1e-4);
    }

    #[test]
    fn ray_cast_against_box() {
        let mut gjk = GjkEpa::new();
        let b = Geometry::cuboid(Vec3::ONE);
        let tf = Transform::IDENTITY;
        let mut hit = RayCastHit::default();
        let found = gjk.ray_cast(
            &b,
            &tf,
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            &mut hit,
        );
        assert!(found);
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-3);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn ray_cast_from_inside_reports_overlap() {
        let mut gjk = GjkEpa::new();
        let b = Geometry::cuboid(Vec3::ONE);
        let tf = Transform::IDENTITY;
        let mut hit = RayCastHit::default();
        let found = gjk.ray_cast(
            &b,
            &tf,
            Vec3::ZERO,
            Vec3::new(5.0, 0.0, 0.0),
            &mut hit,
        );
        assert!(!found);
    }

    #[test]
    fn convex_cast_finds_time_of_impact() {
        let mut gjk = GjkEpa::new();
        let s1 = Geometry::sphere(0.5);
        let s2 = Geometry::sphere(0.5);
        let tf1 = Transform::from_position(Vec3::new(-5.0, 0.0, 0.0));
        let tf2 = Transform::from_position(Vec3::ZERO);
        let mut hit = RayCastHit::default();
        let found = gjk.convex_cast(
            Some(&s1),
            &s2,
            &tf1,
            &tf2,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            &mut hit,
        );
        assert!(found);
        // spheres touch when centers are 1 apart: after advancing 4 of 10
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-3);
    }
}
