//! Dynamic bounding-volume-hierarchy broad phase.
//!
//! Leaves carry fat AABBs; small motions stay inside the fat bounds and
//! skip re-insertion entirely. Pair collection walks only the moved leaves
//! against the tree unless too many proxies moved, in which case one full
//! self-collide pass is cheaper.

use crate::collision::broadphase::{swept_aabb, BroadPhase, Proxy, ProxyId, ProxyPair};
use crate::collision::geometry::Geometry;
use crate::config::{BVH_INCREMENTAL_COLLISION_THRESHOLD, BVH_PROXY_PADDING};
use crate::core::shape::ShapeId;
use crate::utils::allocator::Arena;
use crate::utils::math::{Aabb, Real, Transform, Vec3};

const NULL: u32 = u32::MAX;

/// How the insertion point for a new leaf is chosen while descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertionStrategy {
    /// Descend into the child whose center is nearer.
    #[default]
    Simple,
    /// Descend by smallest surface-area increase.
    MinimizeSurfaceArea,
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    children: [u32; 2],
    child_index: u8,
    parent: u32,
    height: i32,
    proxy: Option<ProxyId>,
    aabb: Aabb,
}

impl Default for BvhNode {
    fn default() -> Self {
        Self {
            children: [NULL; 2],
            child_index: 0,
            parent: NULL,
            height: 0,
            proxy: None,
            aabb: Aabb::default(),
        }
    }
}

/// The balanced binary AABB tree.
struct BvhTree {
    nodes: Vec<BvhNode>,
    free: Vec<u32>,
    root: u32,
    strategy: InsertionStrategy,
    balancing_enabled: bool,
}

impl BvhTree {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NULL,
            strategy: InsertionStrategy::default(),
            balancing_enabled: true,
        }
    }

    fn pick(&mut self) -> u32 {
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = BvhNode::default();
            return id;
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(BvhNode::default());
        id
    }

    fn pool(&mut self, node: u32) {
        self.free.push(node);
    }

    fn node(&self, id: u32) -> &BvhNode {
        &self.nodes[id as usize]
    }

    fn set_child(&mut self, parent: u32, index: usize, child: u32) {
        self.nodes[parent as usize].children[index] = child;
        self.nodes[child as usize].parent = parent;
        self.nodes[child as usize].child_index = index as u8;
    }

    fn compute_aabb(&mut self, id: u32) {
        let [c1, c2] = self.nodes[id as usize].children;
        self.nodes[id as usize].aabb =
            Aabb::combine(&self.nodes[c1 as usize].aabb, &self.nodes[c2 as usize].aabb);
    }

    fn compute_height(&mut self, id: u32) {
        let [c1, c2] = self.nodes[id as usize].children;
        self.nodes[id as usize].height =
            self.nodes[c1 as usize].height.max(self.nodes[c2 as usize].height) + 1;
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL;
            self.nodes[leaf as usize].child_index = 0;
            return;
        }

        // descend to the insertion position
        let mut sibling = self.root;
        while self.node(sibling).height > 0 {
            match self.decide_insertion(sibling, leaf) {
                Some(next) => sibling = self.node(sibling).children[next],
                None => break,
            }
        }

        let parent = self.node(sibling).parent;
        let sibling_index = self.node(sibling).child_index as usize;
        let node = self.pick();
        if parent == NULL {
            self.root = node;
            self.nodes[node as usize].parent = NULL;
            self.nodes[node as usize].child_index = 0;
        } else {
            self.set_child(parent, sibling_index, node);
        }
        self.set_child(node, sibling_index, sibling);
        self.set_child(node, sibling_index ^ 1, leaf);

        // walk up fixing bounds, heights, and balance
        let mut current = node;
        while current != NULL {
            if self.balancing_enabled {
                current = self.balance(current);
            }
            self.compute_height(current);
            self.compute_aabb(current);
            current = self.node(current).parent;
        }
    }

    fn delete_leaf(&mut self, leaf: u32) {
        if self.root == leaf {
            self.root = NULL;
            return;
        }
        let parent = self.node(leaf).parent;
        let sibling =
            self.node(parent).children[(self.node(leaf).child_index ^ 1) as usize];
        let grandparent = self.node(parent).parent;
        if grandparent == NULL {
            self.nodes[sibling as usize].parent = NULL;
            self.nodes[sibling as usize].child_index = 0;
            self.root = sibling;
            self.pool(parent);
            return;
        }
        let parent_index = self.node(parent).child_index as usize;
        self.set_child(grandparent, parent_index, sibling);
        self.pool(parent);

        let mut current = grandparent;
        while current != NULL {
            if self.balancing_enabled {
                current = self.balance(current);
            }
            self.compute_height(current);
            self.compute_aabb(current);
            current = self.node(current).parent;
        }
    }

    fn decide_insertion(&self, current: u32, leaf: u32) -> Option<usize> {
        match self.strategy {
            InsertionStrategy::Simple => {
                let center = self.node(leaf).aabb.min + self.node(leaf).aabb.max;
                let [c1, c2] = self.node(current).children;
                let d1 = self.node(c1).aabb.min + self.node(c1).aabb.max - center;
                let d2 = self.node(c2).aabb.min + self.node(c2).aabb.max - center;
                if d1.length_squared() < d2.length_squared() {
                    Some(0)
                } else {
                    Some(1)
                }
            }
            InsertionStrategy::MinimizeSurfaceArea => {
                let [c1, c2] = self.node(current).children;
                let leaf_aabb = self.node(leaf).aabb;
                let current_aabb = self.node(current).aabb;

                let old_area = current_aabb.surface_area();
                let new_area = Aabb::combine(&current_aabb, &leaf_aabb).surface_area();

                // cost of pairing the leaf with the current node here
                let creating_cost = new_area * 2.0;
                let incremental_cost = (new_area - old_area) * 2.0;

                let child_cost = |child: u32| -> Real {
                    let child_aabb = self.node(child).aabb;
                    let combined = Aabb::combine(&child_aabb, &leaf_aabb).surface_area();
                    if self.node(child).height == 0 {
                        incremental_cost + combined
                    } else {
                        incremental_cost + (combined - child_aabb.surface_area())
                    }
                };
                let cost1 = child_cost(c1);
                let cost2 = child_cost(c2);

                if creating_cost < cost1 && creating_cost < cost2 {
                    None
                } else if cost1 < cost2 {
                    Some(0)
                } else {
                    Some(1)
                }
            }
        }
    }

    /// One tree-rotation rebalancing step; returns the node that now sits at
    /// the original position.
    fn balance(&mut self, node: u32) -> u32 {
        if self.node(node).height < 2 {
            return node;
        }

        let parent = self.node(node).parent;
        let node_index = self.node(node).child_index as usize;
        let [l, r] = self.node(node).children;
        let balance = self.node(l).height - self.node(r).height;

        if balance > 1 {
            let [ll, lr] = self.node(l).children;
            if self.node(ll).height > self.node(lr).height {
                // rotate the lower left-subtree across
                self.set_child(l, 1, node);
                self.set_child(node, 0, lr);
            } else {
                self.set_child(l, 0, node);
                self.set_child(node, 0, ll);
            }
            self.compute_aabb(node);
            self.compute_height(node);
            self.compute_aabb(l);
            self.compute_height(l);
            if parent != NULL {
                self.set_child(parent, node_index, l);
            } else {
                self.root = l;
                self.nodes[l as usize].parent = NULL;
            }
            return l;
        }
        if balance < -1 {
            let [rl, rr] = self.node(r).children;
            if self.node(rl).height > self.node(rr).height {
                self.set_child(r, 1, node);
                self.set_child(node, 1, rr);
            } else {
                self.set_child(r, 0, node);
                self.set_child(node, 1, rl);
            }
            self.compute_aabb(node);
            self.compute_height(node);
            self.compute_aabb(r);
            self.compute_height(r);
            if parent != NULL {
                self.set_child(parent, node_index, r);
            } else {
                self.root = r;
                self.nodes[r as usize].parent = NULL;
            }
            return r;
        }
        node
    }
}

/// Broad phase backed by the dynamic BVH.
pub struct BvhBroadPhase {
    proxies: Arena<Proxy>,
    tree: BvhTree,
    moved: Vec<ProxyId>,
    pair_buffer: Vec<ProxyPair>,
    num_proxies: usize,
    test_count: usize,
}

impl Default for BvhBroadPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl BvhBroadPhase {
    pub fn new() -> Self {
        Self {
            proxies: Arena::new(),
            tree: BvhTree::new(),
            moved: Vec::new(),
            pair_buffer: Vec::new(),
            num_proxies: 0,
            test_count: 0,
        }
    }

    pub fn set_insertion_strategy(&mut self, strategy: InsertionStrategy) {
        self.tree.strategy = strategy;
    }

    /// Number of node-pair visits during the last `collect_pairs`.
    pub fn test_count(&self) -> usize {
        self.test_count
    }

    fn fatten(aabb: &Aabb, displacement: Vec3) -> Aabb {
        let mut fat = aabb.expand(BVH_PROXY_PADDING);
        fat.min += displacement.min(Vec3::ZERO);
        fat.max += displacement.max(Vec3::ZERO);
        fat
    }

    fn queue_moved(&mut self, id: ProxyId) {
        let Some(p) = self.proxies.get_mut(id) else {
            return;
        };
        if p.moved {
            return;
        }
        p.moved = true;
        self.moved.push(id);
    }

    fn insert_proxy_leaf(&mut self, id: ProxyId) {
        let leaf = self.tree.pick();
        let p = self.proxies.get_mut(id).unwrap();
        p.leaf = leaf;
        self.tree.nodes[leaf as usize].proxy = Some(id);
        self.tree.nodes[leaf as usize].aabb = p.aabb;
        self.tree.insert_leaf(leaf);
    }

    fn delete_proxy_leaf(&mut self, id: ProxyId) {
        let Some(p) = self.proxies.get_mut(id) else {
            return;
        };
        let leaf = p.leaf;
        p.leaf = NULL;
        if leaf != NULL {
            self.tree.delete_leaf(leaf);
            self.tree.nodes[leaf as usize].proxy = None;
            self.tree.pool(leaf);
        }
    }

    fn collide(&mut self, n1: u32, n2: u32) {
        self.test_count += 1;
        let leaf1 = self.tree.node(n1).height == 0;
        let leaf2 = self.tree.node(n2).height == 0;

        if n1 == n2 {
            if leaf1 {
                return;
            }
            let [c1, c2] = self.tree.node(n1).children;
            self.collide(c1, c2);
            self.collide(c1, c1);
            self.collide(c2, c2);
            return;
        }

        if !self
            .tree
            .node(n1)
            .aabb
            .overlaps(&self.tree.node(n2).aabb)
        {
            return;
        }

        if leaf1 && leaf2 {
            let p1 = self.tree.node(n1).proxy.unwrap();
            let p2 = self.tree.node(n2).proxy.unwrap();
            if let (Some(pr1), Some(pr2)) = (self.proxies.get(p1), self.proxies.get(p2)) {
                self.pair_buffer.push(ProxyPair {
                    proxy1: p1,
                    proxy2: p2,
                    shape1: pr1.shape,
                    shape2: pr2.shape,
                });
            }
            return;
        }

        // split the deeper subtree first
        if leaf2 || (!leaf1 && self.tree.node(n1).height >= self.tree.node(n2).height) {
            let [c1, c2] = self.tree.node(n1).children;
            self.collide(c1, n2);
            self.collide(c2, n2);
        } else {
            let [c1, c2] = self.tree.node(n2).children;
            self.collide(n1, c1);
            self.collide(n1, c2);
        }
    }

    fn ray_cast_recursive(
        &self,
        node: u32,
        begin: Vec3,
        end: Vec3,
        callback: &mut dyn FnMut(ShapeId),
    ) {
        if node == NULL {
            return;
        }
        let n = self.tree.node(node);
        if !n.aabb.intersects_segment(begin, end) {
            return;
        }
        if n.height == 0 {
            if let Some(p) = n.proxy.and_then(|id| self.proxies.get(id)) {
                callback(p.shape);
            }
            return;
        }
        self.ray_cast_recursive(n.children[0], begin, end, callback);
        self.ray_cast_recursive(n.children[1], begin, end, callback);
    }

    fn sweep_recursive(&self, node: u32, swept: &Aabb, callback: &mut dyn FnMut(ShapeId)) {
        if node == NULL {
            return;
        }
        let n = self.tree.node(node);
        if !n.aabb.overlaps(swept) {
            return;
        }
        if n.height == 0 {
            if let Some(p) = n.proxy.and_then(|id| self.proxies.get(id)) {
                callback(p.shape);
            }
            return;
        }
        self.sweep_recursive(n.children[0], swept, callback);
        self.sweep_recursive(n.children[1], swept, callback);
    }
}

impl BroadPhase for BvhBroadPhase {
    fn is_incremental(&self) -> bool {
        true
    }

    fn create_proxy(&mut self, shape: ShapeId, aabb: &Aabb) -> ProxyId {
        let fat = Self::fatten(aabb, Vec3::ZERO);
        let id = self.proxies.insert(Proxy {
            shape,
            aabb: fat,
            leaf: NULL,
            moved: false,
        });
        self.num_proxies += 1;
        self.insert_proxy_leaf(id);
        // a fresh proxy must be collided against the tree this step
        self.queue_moved(id);
        id
    }

    fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.delete_proxy_leaf(proxy);
        if self.proxies.remove(proxy).is_some() {
            self.num_proxies -= 1;
        }
    }

    fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, displacement: Vec3) {
        let Some(p) = self.proxies.get(proxy) else {
            return;
        };
        if p.aabb.contains(aabb) {
            // still inside the fat bounds; nothing to do
            return;
        }
        let fat = Self::fatten(aabb, displacement);
        if let Some(p) = self.proxies.get_mut(proxy) {
            p.aabb = fat;
        }
        self.queue_moved(proxy);
    }

    fn collect_pairs(&mut self) {
        self.pair_buffer.clear();
        self.test_count = 0;
        if self.num_proxies < 2 {
            for id in std::mem::take(&mut self.moved) {
                if let Some(p) = self.proxies.get_mut(id) {
                    p.moved = false;
                }
            }
            return;
        }

        let incremental_collision = (self.moved.len() as Real) / (self.num_proxies as Real)
            < BVH_INCREMENTAL_COLLISION_THRESHOLD;

        let moved = std::mem::take(&mut self.moved);
        for id in moved {
            let Some(p) = self.proxies.get(id) else {
                continue;
            };
            if !p.moved {
                continue;
            }
            // re-insert at the new position
            self.delete_proxy_leaf(id);
            self.insert_proxy_leaf(id);
            if incremental_collision {
                let leaf = self.proxies.get(id).unwrap().leaf;
                self.collide(self.tree.root, leaf);
            }
            if let Some(p) = self.proxies.get_mut(id) {
                p.moved = false;
            }
        }
        if !incremental_collision {
            self.collide(self.tree.root, self.tree.root);
        }

        // self-collide emits each leaf pair once; the moved-leaf passes can
        // report a pair from both endpoints
        self.pair_buffer.sort_unstable_by_key(|p| {
            let (a, b) = if p.proxy1 <= p.proxy2 {
                (p.proxy1, p.proxy2)
            } else {
                (p.proxy2, p.proxy1)
            };
            (a, b)
        });
        self.pair_buffer.dedup_by(|a, b| {
            (a.proxy1 == b.proxy1 && a.proxy2 == b.proxy2)
                || (a.proxy1 == b.proxy2 && a.proxy2 == b.proxy1)
        });
    }

    fn pairs(&self) -> &[ProxyPair] {
        &self.pair_buffer
    }

    fn proxy_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.proxies.get(proxy).map(|p| p.aabb)
    }

    fn ray_cast(&self, begin: Vec3, end: Vec3, callback: &mut dyn FnMut(ShapeId)) {
        self.ray_cast_recursive(self.tree.root, begin, end, callback);
    }

    fn convex_cast(
        &self,
        convex: &Geometry,
        begin: &Transform,
        translation: Vec3,
        callback: &mut dyn FnMut(ShapeId),
    ) {
        let swept = swept_aabb(convex, begin, translation);
        self.sweep_recursive(self.tree.root, &swept, callback);
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ShapeId)) {
        self.sweep_recursive(self.tree.root, aabb, callback);
    }
}

/// Either broad-phase behind one value.
pub enum AnyBroadPhase {
    BruteForce(crate::collision::broadphase::BruteForceBroadPhase),
    Bvh(BvhBroadPhase),
}

impl AnyBroadPhase {
    pub fn new(kind: crate::collision::broadphase::BroadPhaseKind) -> Self {
        match kind {
            crate::collision::broadphase::BroadPhaseKind::BruteForce => {
                AnyBroadPhase::BruteForce(crate::collision::broadphase::BruteForceBroadPhase::new())
            }
            crate::collision::broadphase::BroadPhaseKind::Bvh => {
                AnyBroadPhase::Bvh(BvhBroadPhase::new())
            }
        }
    }

    fn inner(&self) -> &dyn BroadPhase {
        match self {
            AnyBroadPhase::BruteForce(bp) => bp,
            AnyBroadPhase::Bvh(bp) => bp,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BroadPhase {
        match self {
            AnyBroadPhase::BruteForce(bp) => bp,
            AnyBroadPhase::Bvh(bp) => bp,
        }
    }
}

impl BroadPhase for AnyBroadPhase {
    fn is_incremental(&self) -> bool {
        self.inner().is_incremental()
    }
    fn create_proxy(&mut self, shape: ShapeId, aabb: &Aabb) -> ProxyId {
        self.inner_mut().create_proxy(shape, aabb)
    }
    fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.inner_mut().destroy_proxy(proxy)
    }
    fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, displacement: Vec3) {
        self.inner_mut().move_proxy(proxy, aabb, displacement)
    }
    fn collect_pairs(&mut self) {
        self.inner_mut().collect_pairs()
    }
    fn pairs(&self) -> &[ProxyPair] {
        self.inner().pairs()
    }
    fn proxy_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.inner().proxy_aabb(proxy)
    }
    fn ray_cast(&self, begin: Vec3, end: Vec3, callback: &mut dyn FnMut(ShapeId)) {
        self.inner().ray_cast(begin, end, callback)
    }
    fn convex_cast(
        &self,
        convex: &Geometry,
        begin: &Transform,
        translation: Vec3,
        callback: &mut dyn FnMut(ShapeId),
    ) {
        self.inner().convex_cast(convex, begin, translation, callback)
    }
    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ShapeId)) {
        self.inner().aabb_test(aabb, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::Id;

    fn aabb(center: Vec3, half: f64) -> Aabb {
        Aabb::new(center - Vec3::splat(half), center + Vec3::splat(half))
    }

    fn shape_id(n: u32) -> ShapeId {
        Id::new(n, 0)
    }

    #[test]
    fn fat_aabb_contains_tight_aabb() {
        let mut bp = BvhBroadPhase::new();
        let tight = aabb(Vec3::ZERO, 1.0);
        let p = bp.create_proxy(shape_id(0), &tight);
        let fat = bp.proxy_aabb(p).unwrap();
        assert!(fat.contains(&tight));
        bp.collect_pairs();
        assert!(bp.proxy_aabb(p).unwrap().contains(&tight));
    }

    #[test]
    fn small_motion_keeps_fat_aabb() {
        let mut bp = BvhBroadPhase::new();
        let p = bp.create_proxy(shape_id(0), &aabb(Vec3::ZERO, 1.0));
        bp.collect_pairs();
        let fat_before = bp.proxy_aabb(p).unwrap();
        let nudged = aabb(Vec3::new(0.05, 0.0, 0.0), 1.0);
        bp.move_proxy(p, &nudged, Vec3::new(0.05, 0.0, 0.0));
        assert_eq!(bp.proxy_aabb(p).unwrap(), fat_before);
        assert!(bp.moved.is_empty());
    }

    #[test]
    fn large_motion_reinserts_and_pairs() {
        let mut bp = BvhBroadPhase::new();
        let a = bp.create_proxy(shape_id(0), &aabb(Vec3::ZERO, 1.0));
        bp.create_proxy(shape_id(1), &aabb(Vec3::new(10.0, 0.0, 0.0), 1.0));
        bp.collect_pairs();
        assert!(bp.pairs().is_empty());

        bp.move_proxy(
            a,
            &aabb(Vec3::new(9.0, 0.0, 0.0), 1.0),
            Vec3::new(9.0, 0.0, 0.0),
        );
        bp.collect_pairs();
        assert_eq!(bp.pairs().len(), 1);
    }

    #[test]
    fn many_proxies_pair_like_brute_force() {
        use crate::collision::broadphase::BruteForceBroadPhase;

        let mut bvh = BvhBroadPhase::new();
        let mut brute = BruteForceBroadPhase::new();
        // a line of proxies with every neighbor overlapping
        for i in 0..20 {
            let c = Vec3::new(i as Real * 1.5, 0.0, 0.0);
            bvh.create_proxy(shape_id(i), &aabb(c, 1.0));
            brute.create_proxy(shape_id(i), &aabb(c, 1.0));
        }
        bvh.collect_pairs();
        brute.collect_pairs();
        // the BVH works on fat AABBs, so it may report a superset
        assert!(bvh.pairs().len() >= brute.pairs().len());
        let canonical = |pairs: &[ProxyPair]| {
            let mut set: Vec<(u32, u32)> = pairs
                .iter()
                .map(|p| {
                    let a = p.shape1.index() as u32;
                    let b = p.shape2.index() as u32;
                    (a.min(b), a.max(b))
                })
                .collect();
            set.sort_unstable();
            set
        };
        let brute_pairs = canonical(brute.pairs());
        let bvh_pairs = canonical(bvh.pairs());
        for pair in &brute_pairs {
            assert!(bvh_pairs.contains(pair), "missing pair {pair:?}");
        }
    }

    #[test]
    fn tree_stays_balanced_under_sequential_insertion() {
        let mut bp = BvhBroadPhase::new();
        for i in 0..64 {
            bp.create_proxy(shape_id(i), &aabb(Vec3::new(i as Real * 2.5, 0.0, 0.0), 1.0));
        }
        let root_height = bp.tree.node(bp.tree.root).height;
        // a degenerate list would be height 63; a balanced tree is O(log n)
        assert!(root_height <= 16, "height was {root_height}");
    }

    #[test]
    fn surface_area_strategy_builds_a_working_tree() {
        let mut bp = BvhBroadPhase::new();
        bp.set_insertion_strategy(InsertionStrategy::MinimizeSurfaceArea);
        for i in 0..32 {
            bp.create_proxy(
                shape_id(i),
                &aabb(Vec3::new((i % 8) as Real * 1.5, (i / 8) as Real * 1.5, 0.0), 1.0),
            );
        }
        bp.collect_pairs();
        // neighbors at distance 1.5 overlap; the grid yields plenty of pairs
        assert!(!bp.pairs().is_empty());
        let root_height = bp.tree.node(bp.tree.root).height;
        assert!(root_height <= 12, "height was {root_height}");
    }

    #[test]
    fn ray_cast_visits_only_intersected_leaves() {
        let mut bp = BvhBroadPhase::new();
        for i in 0..8 {
            bp.create_proxy(shape_id(i), &aabb(Vec3::new(i as Real * 4.0, 0.0, 0.0), 1.0));
        }
        let mut hits = Vec::new();
        bp.ray_cast(
            Vec3::new(4.0, -5.0, 0.0),
            Vec3::new(4.0, 5.0, 0.0),
            &mut |s| hits.push(s),
        );
        assert_eq!(hits, vec![shape_id(1)]);
    }
}
