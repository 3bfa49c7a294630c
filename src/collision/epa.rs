//! Expanding polytope maintenance for penetration depth queries.
//!
//! Triangles live in an index arena with a free list; shared-edge adjacency
//! is stored as `(neighbor, slot-in-neighbor)` pairs and detached from both
//! sides when a face is removed.

use crate::collision::gjk_epa::project_origin3;
use crate::config::{MAX_EPA_FACES, MAX_EPA_VERTICES};
use crate::utils::math::{Real, Vec3};

const NEXT: [usize; 3] = [1, 2, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpaPolyhedronState {
    Ok,
    InvalidTriangle,
    NoAdjacentTriangle,
    EdgeLoopBroken,
    NoOuterTriangle,
    TriangleInvisible,
    OutOfCapacity,
}

/// A vertex of the polytope: the Minkowski-difference point plus the two
/// world witness points it came from. The `edge_*` fields hold the hole
/// boundary during vertex insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpaVertex {
    pub v: Vec3,
    pub w1: Vec3,
    pub w2: Vec3,
    edge_next: Option<u32>,
    edge_outer: Option<u32>,
}

impl EpaVertex {
    pub fn new(v: Vec3, w1: Vec3, w2: Vec3) -> Self {
        Self {
            v,
            w1,
            w2,
            edge_next: None,
            edge_outer: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct EpaTriangle {
    vertices: [u32; 3],
    neighbors: [Option<u32>; 3],
    neighbor_slot: [u8; 3],
    normal: Vec3,
    distance_sq: Real,
    dfs_id: u32,
    alive: bool,
}

impl Default for EpaTriangle {
    fn default() -> Self {
        Self {
            vertices: [0; 3],
            neighbors: [None; 3],
            neighbor_slot: [0; 3],
            normal: Vec3::ZERO,
            distance_sq: 0.0,
            dfs_id: 0,
            alive: false,
        }
    }
}

/// Mutable polytope scratch reused across EPA runs.
pub struct EpaPolyhedron {
    vertices: Vec<EpaVertex>,
    tris: Vec<EpaTriangle>,
    free: Vec<u32>,
    num_triangles: usize,
    center: Vec3,
    status: EpaPolyhedronState,
    dfs_id: u32,
}

impl Default for EpaPolyhedron {
    fn default() -> Self {
        Self::new()
    }
}

impl EpaPolyhedron {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(MAX_EPA_VERTICES),
            tris: Vec::with_capacity(MAX_EPA_FACES),
            free: Vec::new(),
            num_triangles: 0,
            center: Vec3::ZERO,
            status: EpaPolyhedronState::Ok,
            dfs_id: 0,
        }
    }

    pub fn status(&self) -> EpaPolyhedronState {
        self.status
    }

    pub fn vertex(&self, id: u32) -> &EpaVertex {
        &self.vertices[id as usize]
    }

    pub fn triangle_vertices(&self, tri: u32) -> [u32; 3] {
        self.tris[tri as usize].vertices
    }

    pub fn triangle_normal(&self, tri: u32) -> Vec3 {
        self.tris[tri as usize].normal
    }

    fn clear(&mut self) {
        self.vertices.clear();
        self.tris.clear();
        self.free.clear();
        self.num_triangles = 0;
        self.status = EpaPolyhedronState::Ok;
    }

    fn pick_triangle(&mut self) -> Option<u32> {
        if let Some(id) = self.free.pop() {
            self.tris[id as usize] = EpaTriangle::default();
            return Some(id);
        }
        if self.tris.len() >= MAX_EPA_FACES {
            self.status = EpaPolyhedronState::OutOfCapacity;
            return None;
        }
        let id = self.tris.len() as u32;
        self.tris.push(EpaTriangle::default());
        Some(id)
    }

    fn push_vertex(&mut self, vertex: EpaVertex) -> Option<u32> {
        if self.vertices.len() >= MAX_EPA_VERTICES {
            self.status = EpaPolyhedronState::OutOfCapacity;
            return None;
        }
        let id = self.vertices.len() as u32;
        self.vertices.push(vertex);
        Some(id)
    }

    /// Orients and initializes a triangle. With `auto_check` an inverted
    /// winding (as seen from the polytope center) is silently repaired;
    /// without it the inversion is an error.
    fn init_triangle(&mut self, tri: u32, v1: u32, v2: u32, v3: u32, auto_check: bool) {
        let (mut b, mut c) = (v2, v3);
        let p1 = self.vertices[v1 as usize].v;
        let p2 = self.vertices[v2 as usize].v;
        let p3 = self.vertices[v3 as usize].v;
        let mut normal = (p2 - p1).cross(p3 - p1);
        let d = (p1 - self.center).dot(normal);
        if d < 0.0 {
            if auto_check {
                // vertices must wind counterclockwise when seen from outside
                std::mem::swap(&mut b, &mut c);
                normal = -normal;
            } else {
                self.status = EpaPolyhedronState::InvalidTriangle;
            }
        }
        let (proj, _) = project_origin3(
            self.vertices[v1 as usize].v,
            self.vertices[b as usize].v,
            self.vertices[c as usize].v,
        );
        let t = &mut self.tris[tri as usize];
        t.vertices = [v1, b, c];
        t.normal = normal;
        t.distance_sq = proj.length_squared();
        t.neighbors = [None; 3];
        t.neighbor_slot = [0; 3];
        t.alive = true;
    }

    /// Wires the adjacency between two triangles sharing exactly one
    /// directed edge. Any other shared-edge count means the polytope is
    /// broken.
    fn set_adjacent(&mut self, t1: u32, t2: u32) {
        let mut count = 0;
        for i in 0..3 {
            for j in 0..3 {
                let i2 = NEXT[i];
                let j2 = NEXT[j];
                let a = self.tris[t1 as usize].vertices;
                let b = self.tris[t2 as usize].vertices;
                if a[i] == b[j2] && a[i2] == b[j] {
                    self.tris[t1 as usize].neighbors[i] = Some(t2);
                    self.tris[t1 as usize].neighbor_slot[i] = j as u8;
                    self.tris[t2 as usize].neighbors[j] = Some(t1);
                    self.tris[t2 as usize].neighbor_slot[j] = i as u8;
                    count += 1;
                }
            }
        }
        if count != 1 {
            self.status = EpaPolyhedronState::InvalidTriangle;
        }
    }

    fn detach_neighbors(&mut self, tri: u32) {
        for i in 0..3 {
            if let Some(n) = self.tris[tri as usize].neighbors[i] {
                let slot = self.tris[tri as usize].neighbor_slot[i] as usize;
                self.tris[n as usize].neighbors[slot] = None;
                self.tris[tri as usize].neighbors[i] = None;
            }
        }
    }

    fn remove_triangle(&mut self, tri: u32) {
        self.tris[tri as usize].alive = false;
        self.free.push(tri);
        self.num_triangles -= 1;
    }

    fn add_triangle(&mut self, _tri: u32) {
        self.num_triangles += 1;
    }

    /// Builds the initial tetrahedron. Returns false and sets an error
    /// status on a degenerate input simplex.
    pub fn init(&mut self, v1: EpaVertex, v2: EpaVertex, v3: EpaVertex, v4: EpaVertex) -> bool {
        self.clear();
        let a = self.push_vertex(v1).unwrap();
        let b = self.push_vertex(v2).unwrap();
        let c = self.push_vertex(v3).unwrap();
        let d = self.push_vertex(v4).unwrap();
        self.center = (self.vertices[0].v
            + self.vertices[1].v
            + self.vertices[2].v
            + self.vertices[3].v)
            * 0.25;

        let t1 = self.pick_triangle().unwrap();
        let t2 = self.pick_triangle().unwrap();
        let t3 = self.pick_triangle().unwrap();
        let t4 = self.pick_triangle().unwrap();
        self.init_triangle(t1, a, b, c, true);
        self.init_triangle(t2, a, b, d, true);
        self.init_triangle(t3, a, c, d, true);
        self.init_triangle(t4, b, c, d, true);

        self.set_adjacent(t1, t2);
        self.set_adjacent(t1, t3);
        self.set_adjacent(t1, t4);
        self.set_adjacent(t2, t3);
        self.set_adjacent(t2, t4);
        self.set_adjacent(t3, t4);

        self.add_triangle(t1);
        self.add_triangle(t2);
        self.add_triangle(t3);
        self.add_triangle(t4);

        self.status == EpaPolyhedronState::Ok
    }

    /// The face whose plane is nearest to the origin.
    pub fn best_triangle(&self) -> Option<u32> {
        let mut best = None;
        let mut best_dist = Real::INFINITY;
        for (i, t) in self.tris.iter().enumerate() {
            if t.alive && t.distance_sq < best_dist {
                best_dist = t.distance_sq;
                best = Some(i as u32);
            }
        }
        best
    }

    fn visible(&self, tri: u32, from: Vec3) -> bool {
        let t = &self.tris[tri as usize];
        let v0 = self.vertices[t.vertices[0] as usize].v;
        (from - v0).dot(t.normal) > 0.0
    }

    /// Removes every face the new point can see, leaving the hole boundary
    /// recorded on the vertices as a linked edge loop.
    fn find_edge_loop(&mut self, dfs_id: u32, tri: u32, from: Vec3) {
        if self.tris[tri as usize].dfs_id == dfs_id {
            return;
        }
        self.tris[tri as usize].dfs_id = dfs_id;
        if !self.visible(tri, from) {
            self.status = EpaPolyhedronState::TriangleInvisible;
            return;
        }
        for i in 0..3 {
            let Some(n) = self.tris[tri as usize].neighbors[i] else {
                continue;
            };
            if self.visible(n, from) {
                self.find_edge_loop(dfs_id, n, from);
                if self.status != EpaPolyhedronState::Ok {
                    return;
                }
            } else {
                // `tri` is visible from the new point but `n` is not: the
                // shared edge lies on the hole boundary
                let v1 = self.tris[tri as usize].vertices[i];
                let v2 = self.tris[tri as usize].vertices[NEXT[i]];
                self.vertices[v1 as usize].edge_next = Some(v2);
                self.vertices[v1 as usize].edge_outer = Some(n);
            }
        }
        self.detach_neighbors(tri);
        self.remove_triangle(tri);
    }

    fn validate(&mut self) -> bool {
        for i in 0..self.tris.len() {
            if !self.tris[i].alive {
                continue;
            }
            for j in 0..3 {
                let v = self.tris[i].vertices[j] as usize;
                self.vertices[v].edge_next = None;
                self.vertices[v].edge_outer = None;
                if self.tris[i].neighbors[j].is_none() {
                    self.status = EpaPolyhedronState::NoAdjacentTriangle;
                    return false;
                }
            }
        }
        true
    }

    /// Inserts a supporting vertex beyond `base`, carving out the visible
    /// region and fanning new faces over the hole.
    pub fn add_vertex(&mut self, vertex: EpaVertex, base: u32) -> bool {
        let Some(new_vertex) = self.push_vertex(vertex) else {
            return false;
        };
        let from = self.vertices[new_vertex as usize].v;
        let start_vertex = self.tris[base as usize].vertices[0];

        self.dfs_id += 1;
        self.find_edge_loop(self.dfs_id, base, from);
        if self.status != EpaPolyhedronState::Ok {
            return false;
        }

        // patch the hole
        let mut v = start_vertex;
        let mut prev_t: Option<u32> = None;
        let mut first_t: Option<u32> = None;
        loop {
            let Some(next_v) = self.vertices[v as usize].edge_next else {
                self.status = EpaPolyhedronState::EdgeLoopBroken;
                return false;
            };
            let Some(outer) = self.vertices[v as usize].edge_outer else {
                self.status = EpaPolyhedronState::NoOuterTriangle;
                return false;
            };

            let Some(t) = self.pick_triangle() else {
                return false;
            };
            if first_t.is_none() {
                first_t = Some(t);
            }
            self.init_triangle(t, v, next_v, new_vertex, false);
            if self.status != EpaPolyhedronState::Ok {
                return false;
            }
            self.add_triangle(t);

            self.set_adjacent(t, outer);
            if let Some(prev) = prev_t {
                self.set_adjacent(t, prev);
            }
            if self.status != EpaPolyhedronState::Ok {
                return false;
            }

            prev_t = Some(t);
            v = next_v;
            if v == start_vertex {
                break;
            }
        }
        if let (Some(prev), Some(first)) = (prev_t, first_t) {
            if prev != first {
                self.set_adjacent(prev, first);
            }
        }

        self.status == EpaPolyhedronState::Ok && self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vert(v: Vec3) -> EpaVertex {
        EpaVertex::new(v, v, Vec3::ZERO)
    }

    fn tetrahedron_around_origin() -> EpaPolyhedron {
        let mut p = EpaPolyhedron::new();
        let ok = p.init(
            vert(Vec3::new(1.0, 1.0, 1.0)),
            vert(Vec3::new(-1.0, -1.0, 1.0)),
            vert(Vec3::new(-1.0, 1.0, -1.0)),
            vert(Vec3::new(1.0, -1.0, -1.0)),
        );
        assert!(ok);
        p
    }

    #[test]
    fn init_produces_four_adjacent_faces() {
        let mut p = tetrahedron_around_origin();
        assert_eq!(p.status(), EpaPolyhedronState::Ok);
        assert_eq!(p.num_triangles, 4);
        assert!(p.validate());
    }

    #[test]
    fn add_vertex_keeps_polytope_closed() {
        let mut p = tetrahedron_around_origin();
        let base = p.best_triangle().unwrap();
        let dir = p.triangle_normal(base).normalize();
        let ok = p.add_vertex(vert(dir * 3.0), base);
        assert!(ok, "status: {:?}", p.status());
        // one face removed, three fanned in
        assert_eq!(p.num_triangles, 6);
        assert!(p.validate());
    }

    #[test]
    fn best_triangle_is_nearest_to_origin() {
        let p = {
            let mut p = EpaPolyhedron::new();
            p.init(
                vert(Vec3::new(0.1, 1.0, 1.0)),
                vert(Vec3::new(0.1, -1.0, 1.0)),
                vert(Vec3::new(0.1, 0.0, -1.4)),
                vert(Vec3::new(-5.0, 0.0, 0.0)),
            );
            p
        };
        let best = p.best_triangle().unwrap();
        // the face at x = 0.1 is far closer than any face touching x = -5
        let verts = p.triangle_vertices(best);
        for v in verts {
            assert!((p.vertex(v).v.x - 0.1).abs() < 1e-12);
        }
    }
}
