//! Broad-phase interface, proxies, and the brute-force implementation.

use crate::collision::geometry::Geometry;
use crate::core::shape::ShapeId;
use crate::utils::allocator::{Arena, Id};
use crate::utils::math::{Aabb, Transform, Vec3};

/// Broad-phase handle of one shape. The stored AABB is the fat AABB in BVH
/// mode and the tight AABB in brute-force mode.
#[derive(Debug, Clone, Copy)]
pub struct Proxy {
    pub shape: ShapeId,
    pub aabb: Aabb,
    /// BVH leaf back-reference; unused by the brute force.
    pub(crate) leaf: u32,
    /// Set while the proxy sits in the BVH moved queue.
    pub(crate) moved: bool,
}

pub type ProxyId = Id<Proxy>;

/// A potentially-overlapping pair reported by `collect_pairs`.
#[derive(Debug, Clone, Copy)]
pub struct ProxyPair {
    pub proxy1: ProxyId,
    pub proxy2: ProxyId,
    pub shape1: ShapeId,
    pub shape2: ShapeId,
}

/// Which broad-phase algorithm a world uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadPhaseKind {
    BruteForce,
    #[default]
    Bvh,
}

/// Common surface of the broad-phase implementations.
pub trait BroadPhase {
    /// Whether `collect_pairs` reports only pairs involving moved proxies.
    /// A non-incremental broad phase re-reports every overlapping pair each
    /// step, so missing pairs are definitively separated.
    fn is_incremental(&self) -> bool;

    fn create_proxy(&mut self, shape: ShapeId, aabb: &Aabb) -> ProxyId;
    fn destroy_proxy(&mut self, proxy: ProxyId);
    /// Updates a proxy's AABB. `displacement` predicts the motion of the
    /// shape for fat-AABB expansion.
    fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, displacement: Vec3);

    fn collect_pairs(&mut self);
    fn pairs(&self) -> &[ProxyPair];

    fn proxy_aabb(&self, proxy: ProxyId) -> Option<Aabb>;
    fn overlap(&self, p1: ProxyId, p2: ProxyId) -> bool {
        match (self.proxy_aabb(p1), self.proxy_aabb(p2)) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => false,
        }
    }

    fn ray_cast(&self, begin: Vec3, end: Vec3, callback: &mut dyn FnMut(ShapeId));
    fn convex_cast(
        &self,
        convex: &Geometry,
        begin: &Transform,
        translation: Vec3,
        callback: &mut dyn FnMut(ShapeId),
    );
    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ShapeId));
}

/// O(n²) reference broad phase: tests every pair each step.
#[derive(Default)]
pub struct BruteForceBroadPhase {
    proxies: Arena<Proxy>,
    order: Vec<ProxyId>,
    pair_buffer: Vec<ProxyPair>,
}

impl BruteForceBroadPhase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for BruteForceBroadPhase {
    fn is_incremental(&self) -> bool {
        false
    }

    fn create_proxy(&mut self, shape: ShapeId, aabb: &Aabb) -> ProxyId {
        let id = self.proxies.insert(Proxy {
            shape,
            aabb: *aabb,
            leaf: u32::MAX,
            moved: false,
        });
        self.order.push(id);
        id
    }

    fn destroy_proxy(&mut self, proxy: ProxyId) {
        if self.proxies.remove(proxy).is_some() {
            self.order.retain(|p| *p != proxy);
        }
    }

    fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, _displacement: Vec3) {
        if let Some(p) = self.proxies.get_mut(proxy) {
            p.aabb = *aabb;
        }
    }

    fn collect_pairs(&mut self) {
        self.pair_buffer.clear();
        for i in 0..self.order.len() {
            for j in (i + 1)..self.order.len() {
                let id1 = self.order[i];
                let id2 = self.order[j];
                let (Some(p1), Some(p2)) = (self.proxies.get(id1), self.proxies.get(id2))
                else {
                    continue;
                };
                if p1.aabb.overlaps(&p2.aabb) {
                    self.pair_buffer.push(ProxyPair {
                        proxy1: id1,
                        proxy2: id2,
                        shape1: p1.shape,
                        shape2: p2.shape,
                    });
                }
            }
        }
    }

    fn pairs(&self) -> &[ProxyPair] {
        &self.pair_buffer
    }

    fn proxy_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.proxies.get(proxy).map(|p| p.aabb)
    }

    fn ray_cast(&self, begin: Vec3, end: Vec3, callback: &mut dyn FnMut(ShapeId)) {
        for id in &self.order {
            if let Some(p) = self.proxies.get(*id) {
                if p.aabb.intersects_segment(begin, end) {
                    callback(p.shape);
                }
            }
        }
    }

    fn convex_cast(
        &self,
        convex: &Geometry,
        begin: &Transform,
        translation: Vec3,
        callback: &mut dyn FnMut(ShapeId),
    ) {
        let swept = swept_aabb(convex, begin, translation);
        for id in &self.order {
            if let Some(p) = self.proxies.get(*id) {
                if p.aabb.overlaps(&swept) {
                    callback(p.shape);
                }
            }
        }
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ShapeId)) {
        for id in &self.order {
            if let Some(p) = self.proxies.get(*id) {
                if p.aabb.overlaps(aabb) {
                    callback(p.shape);
                }
            }
        }
    }
}

/// Conservative bounds of a convex geometry swept along `translation`.
pub(crate) fn swept_aabb(convex: &Geometry, begin: &Transform, translation: Vec3) -> Aabb {
    let start = convex.compute_aabb(begin);
    let end_tf = Transform::new(begin.position + translation, begin.rotation);
    let end = convex.compute_aabb(&end_tf);
    Aabb::combine(&start, &end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(center: Vec3, half: f64) -> Aabb {
        Aabb::new(center - Vec3::splat(half), center + Vec3::splat(half))
    }

    fn shape_id(n: u32) -> ShapeId {
        Id::new(n, 0)
    }

    #[test]
    fn brute_force_reports_each_overlap_once() {
        let mut bp = BruteForceBroadPhase::new();
        bp.create_proxy(shape_id(0), &aabb(Vec3::ZERO, 1.0));
        bp.create_proxy(shape_id(1), &aabb(Vec3::new(1.5, 0.0, 0.0), 1.0));
        bp.create_proxy(shape_id(2), &aabb(Vec3::new(10.0, 0.0, 0.0), 1.0));
        bp.collect_pairs();
        assert_eq!(bp.pairs().len(), 1);
        bp.collect_pairs();
        assert_eq!(bp.pairs().len(), 1, "pair list is rebuilt, not appended");
    }

    #[test]
    fn destroyed_proxy_stops_pairing() {
        let mut bp = BruteForceBroadPhase::new();
        let a = bp.create_proxy(shape_id(0), &aabb(Vec3::ZERO, 1.0));
        bp.create_proxy(shape_id(1), &aabb(Vec3::ZERO, 1.0));
        bp.collect_pairs();
        assert_eq!(bp.pairs().len(), 1);
        bp.destroy_proxy(a);
        bp.collect_pairs();
        assert!(bp.pairs().is_empty());
    }

    #[test]
    fn ray_cast_filters_by_segment() {
        let mut bp = BruteForceBroadPhase::new();
        bp.create_proxy(shape_id(0), &aabb(Vec3::ZERO, 1.0));
        bp.create_proxy(shape_id(1), &aabb(Vec3::new(0.0, 10.0, 0.0), 1.0));
        let mut hits = Vec::new();
        bp.ray_cast(
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            &mut |s| hits.push(s),
        );
        assert_eq!(hits, vec![shape_id(0)]);
    }
}
