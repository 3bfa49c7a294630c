//! Contact manifolds: point persistence, warm-start bookkeeping, and the
//! incremental/total update paths.

use crate::collision::narrowphase::{DetectorResult, DetectorResultPoint};
use crate::config::{CONTACT_PERSISTENCE_THRESHOLD, MAX_MANIFOLD_POINTS};
use crate::utils::math::{contact_basis, Real, Transform, Vec3};

/// Accumulated impulses of one manifold point, persisted across steps for
/// warm starting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactImpulse {
    /// Impulse along the contact normal.
    pub impulse_n: Real,
    /// Impulse along the tangent.
    pub impulse_t: Real,
    /// Impulse along the binormal.
    pub impulse_b: Real,
    /// Accumulated position impulse.
    pub impulse_p: Real,
    /// Lateral (friction) impulse in world coordinates.
    pub impulse_l: Vec3,
}

impl ContactImpulse {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Carries impulses over to a re-detected point. The position impulse is
    /// deliberately not copied; position-correction state restarts on
    /// manifold churn.
    pub fn copy_from(&mut self, other: &ContactImpulse) {
        self.impulse_n = other.impulse_n;
        self.impulse_t = other.impulse_t;
        self.impulse_b = other.impulse_b;
        self.impulse_l = other.impulse_l;
    }
}

/// A single persistent contact point.
#[derive(Debug, Clone, Copy)]
pub struct ManifoldPoint {
    /// Position relative to the first body, in its local frame.
    pub local_pos1: Vec3,
    /// Position relative to the second body, in its local frame.
    pub local_pos2: Vec3,
    /// Local position rotated into world orientation (not translated).
    pub rel_pos1: Vec3,
    /// Local position rotated into world orientation (not translated).
    pub rel_pos2: Vec3,
    /// World position on the first shape.
    pub pos1: Vec3,
    /// World position on the second shape.
    pub pos2: Vec3,
    /// Overlap along the manifold normal; negative when separated.
    pub depth: Real,
    pub impulse: ContactImpulse,
    /// Whether the point can seed the solver with last step's impulses.
    pub warm_started: bool,
    pub disabled: bool,
    /// Detector-assigned feature id; -1 when unset.
    pub id: i32,
}

impl Default for ManifoldPoint {
    fn default() -> Self {
        Self {
            local_pos1: Vec3::ZERO,
            local_pos2: Vec3::ZERO,
            rel_pos1: Vec3::ZERO,
            rel_pos2: Vec3::ZERO,
            pos1: Vec3::ZERO,
            pos2: Vec3::ZERO,
            depth: 0.0,
            impulse: ContactImpulse::default(),
            warm_started: false,
            disabled: false,
            id: -1,
        }
    }
}

impl ManifoldPoint {
    fn initialize(&mut self, point: &DetectorResultPoint, tf1: &Transform, tf2: &Transform) {
        self.pos1 = point.position1;
        self.pos2 = point.position2;
        self.rel_pos1 = self.pos1 - tf1.position;
        self.rel_pos2 = self.pos2 - tf2.position;
        self.local_pos1 = tf1.rotation.transpose() * self.rel_pos1;
        self.local_pos2 = tf2.rotation.transpose() * self.rel_pos2;
        self.depth = point.depth;
        self.impulse.clear();
        self.id = point.id as i32;
        self.warm_started = false;
        self.disabled = false;
    }

    fn update_depth_and_positions(
        &mut self,
        point: &DetectorResultPoint,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        self.pos1 = point.position1;
        self.pos2 = point.position2;
        self.rel_pos1 = self.pos1 - tf1.position;
        self.rel_pos2 = self.pos2 - tf2.position;
        self.local_pos1 = tf1.rotation.transpose() * self.rel_pos1;
        self.local_pos2 = tf2.rotation.transpose() * self.rel_pos2;
        self.depth = point.depth;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A contact manifold: up to four points sharing one contact frame. The
/// normal points from the second shape toward the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manifold {
    pub normal: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
    pub num_points: usize,
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
}

impl Manifold {
    pub fn clear(&mut self) {
        for p in &mut self.points {
            p.clear();
        }
        self.num_points = 0;
    }

    /// Rebuilds the orthonormal contact frame from a new normal.
    pub fn build_basis(&mut self, normal: Vec3) {
        self.normal = normal;
        let (tangent, binormal) = contact_basis(normal);
        self.tangent = tangent;
        self.binormal = binormal;
    }

    /// Re-derives world and relative positions from the cached local
    /// positions under the given body transforms, and refreshes depths
    /// against the manifold normal.
    pub fn update_depths_and_positions(&mut self, tf1: &Transform, tf2: &Transform) {
        for p in &mut self.points[..self.num_points] {
            p.rel_pos1 = tf1.rotation * p.local_pos1;
            p.rel_pos2 = tf2.rotation * p.local_pos2;
            p.pos1 = tf1.position + p.rel_pos1;
            p.pos2 = tf2.position + p.rel_pos2;
            p.depth = -self.normal.dot(p.pos1 - p.pos2);
        }
    }

    pub fn deepest_depth(&self) -> Real {
        let mut max: Real = 0.0;
        for p in &self.points[..self.num_points] {
            if p.depth > max {
                max = p.depth;
            }
        }
        max
    }
}

/// Applies detector results to a manifold, preserving impulses of surviving
/// points.
#[derive(Debug, Default)]
pub struct ManifoldUpdater {
    old_points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    num_old_points: usize,
}

impl ManifoldUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the manifold with the detector result, carrying impulses
    /// over by point id.
    pub fn total_update(
        &mut self,
        manifold: &mut Manifold,
        result: &DetectorResult,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        self.save_old_data(manifold);

        manifold.num_points = result.num_points;
        for i in 0..result.num_points {
            let p = &mut manifold.points[i];
            p.initialize(&result.points[i], tf1, tf2);
            // restore impulses of the point this one continues
            for old in &self.old_points[..self.num_old_points] {
                if p.id == old.id {
                    p.impulse.copy_from(&old.impulse);
                    p.warm_started = true;
                    break;
                }
            }
        }
    }

    /// Merges a single new sample into the manifold: existing points are
    /// refreshed from body transforms, the nearest existing point is
    /// updated in place (or the sample is added), and stale points are
    /// pruned.
    pub fn incremental_update(
        &mut self,
        manifold: &mut Manifold,
        result: &DetectorResult,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        manifold.update_depths_and_positions(tf1, tf2);
        for p in &mut manifold.points[..manifold.num_points] {
            p.warm_started = true;
        }

        debug_assert_eq!(result.num_points, 1);
        let new_point = &result.points[0];

        match self.find_nearest_point_index(manifold, new_point, tf1, tf2) {
            Some(index) => {
                manifold.points[index].update_depth_and_positions(new_point, tf1, tf2)
            }
            None => self.add_manifold_point(manifold, new_point, tf1, tf2),
        }

        self.remove_outdated_points(manifold);
    }

    fn save_old_data(&mut self, manifold: &Manifold) {
        self.num_old_points = manifold.num_points;
        self.old_points[..manifold.num_points]
            .copy_from_slice(&manifold.points[..manifold.num_points]);
    }

    fn find_nearest_point_index(
        &self,
        manifold: &Manifold,
        target: &DetectorResultPoint,
        tf1: &Transform,
        tf2: &Transform,
    ) -> Option<usize> {
        let mut nearest_sq = CONTACT_PERSISTENCE_THRESHOLD * CONTACT_PERSISTENCE_THRESHOLD;
        let mut index = None;
        let rp1 = target.position1 - tf1.position;
        let rp2 = target.position2 - tf2.position;
        for (i, p) in manifold.points[..manifold.num_points].iter().enumerate() {
            let d1 = (p.rel_pos1 - rp1).length_squared();
            let d2 = (p.rel_pos2 - rp2).length_squared();
            let d = d1.min(d2);
            if d < nearest_sq {
                nearest_sq = d;
                index = Some(i);
            }
        }
        index
    }

    fn add_manifold_point(
        &mut self,
        manifold: &mut Manifold,
        point: &DetectorResultPoint,
        tf1: &Transform,
        tf2: &Transform,
    ) {
        if manifold.num_points == MAX_MANIFOLD_POINTS {
            let target = self.compute_target_index(manifold, point, tf1);
            manifold.points[target].initialize(point, tf1, tf2);
            return;
        }
        let num = manifold.num_points;
        manifold.points[num].initialize(point, tf1, tf2);
        manifold.num_points += 1;
    }

    /// Chooses the slot to replace when the manifold is full: keep the set
    /// maximizing the spanned quad area, never evicting the deepest point.
    fn compute_target_index(
        &self,
        manifold: &Manifold,
        new_point: &DetectorResultPoint,
        tf1: &Transform,
    ) -> usize {
        let p = &manifold.points;
        let mut max_depth = p[0].depth;
        let mut max_depth_index = 0;
        for (i, point) in p.iter().enumerate().skip(1) {
            if point.depth > max_depth {
                max_depth = point.depth;
                max_depth_index = i;
            }
        }

        let rp1 = new_point.position1 - tf1.position;

        let a1 = quad_area_fast(p[1].rel_pos1, p[2].rel_pos1, p[3].rel_pos1, rp1);
        let a2 = quad_area_fast(p[0].rel_pos1, p[2].rel_pos1, p[3].rel_pos1, rp1);
        let a3 = quad_area_fast(p[0].rel_pos1, p[1].rel_pos1, p[3].rel_pos1, rp1);
        let a4 = quad_area_fast(p[0].rel_pos1, p[1].rel_pos1, p[2].rel_pos1, rp1);

        let mut max = a1;
        let mut target = 0;
        if (a2 > max && max_depth_index != 1) || max_depth_index == 0 {
            max = a2;
            target = 1;
        }
        if a3 > max && max_depth_index != 2 {
            max = a3;
            target = 2;
        }
        if a4 > max && max_depth_index != 3 {
            target = 3;
        }
        target
    }

    fn remove_outdated_points(&mut self, manifold: &mut Manifold) {
        for index in (0..manifold.num_points).rev() {
            let p = &manifold.points[index];
            let diff = p.pos1 - p.pos2;
            let dot_n = manifold.normal.dot(diff);
            if dot_n > CONTACT_PERSISTENCE_THRESHOLD {
                // separated along the normal
                remove_manifold_point(manifold, index);
                continue;
            }
            let tangential = diff - manifold.normal * dot_n;
            if tangential.length_squared()
                > CONTACT_PERSISTENCE_THRESHOLD * CONTACT_PERSISTENCE_THRESHOLD
            {
                // slid too far within the contact plane
                remove_manifold_point(manifold, index);
            }
        }
    }
}

fn remove_manifold_point(manifold: &mut Manifold, index: usize) {
    manifold.num_points -= 1;
    let last = manifold.num_points;
    if index != last {
        manifold.points.swap(index, last);
    }
    manifold.points[last].clear();
}

/// Largest spanned-quad area (squared, up to constant factor) among the
/// three pairings of diagonals of four points.
fn quad_area_fast(p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> Real {
    let v12 = p2 - p1;
    let v34 = p4 - p3;
    let v13 = p3 - p1;
    let v24 = p4 - p2;
    let v14 = p4 - p1;
    let v23 = p3 - p2;

    let a1 = v12.cross(v34).length_squared();
    let a2 = v13.cross(v24).length_squared();
    let a3 = v14.cross(v23).length_squared();

    a1.max(a2).max(a3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pos: Vec3, depth: Real, id: u32) -> DetectorResult {
        let mut r = DetectorResult::default();
        r.incremental = true;
        r.set_normal(Vec3::Y);
        r.add_point(pos, pos + Vec3::new(0.0, depth, 0.0), depth, id);
        r
    }

    fn incremental(manifold: &mut Manifold, updater: &mut ManifoldUpdater, r: &DetectorResult) {
        let tf = Transform::IDENTITY;
        manifold.build_basis(r.normal);
        updater.incremental_update(manifold, r, &tf, &tf);
    }

    #[test]
    fn incremental_update_accumulates_distinct_points() {
        let mut manifold = Manifold::default();
        let mut updater = ManifoldUpdater::new();
        for (i, x) in [0.0, 0.2, 0.4, 0.6].iter().enumerate() {
            let r = sample(Vec3::new(*x, 0.0, 0.0), 0.01, i as u32);
            incremental(&mut manifold, &mut updater, &r);
        }
        assert_eq!(manifold.num_points, 4);
    }

    #[test]
    fn near_sample_updates_in_place() {
        let mut manifold = Manifold::default();
        let mut updater = ManifoldUpdater::new();
        incremental(&mut manifold, &mut updater, &sample(Vec3::ZERO, 0.01, 0));
        manifold.points[0].impulse.impulse_n = 5.0;
        // within the persistence threshold of the existing point
        incremental(
            &mut manifold,
            &mut updater,
            &sample(Vec3::new(0.01, 0.0, 0.0), 0.02, 1),
        );
        assert_eq!(manifold.num_points, 1);
        assert_eq!(manifold.points[0].impulse.impulse_n, 5.0);
        assert!(manifold.points[0].warm_started);
    }

    #[test]
    fn fifth_point_replaces_by_area_keeping_deepest() {
        let mut manifold = Manifold::default();
        let mut updater = ManifoldUpdater::new();
        // a small cluster plus one deep point at a corner
        incremental(&mut manifold, &mut updater, &sample(Vec3::new(0.0, 0.0, 0.0), 0.5, 0));
        incremental(&mut manifold, &mut updater, &sample(Vec3::new(0.1, 0.0, 0.0), 0.01, 1));
        incremental(&mut manifold, &mut updater, &sample(Vec3::new(0.1, 0.0, 0.1), 0.01, 2));
        incremental(&mut manifold, &mut updater, &sample(Vec3::new(0.0, 0.0, 0.1), 0.01, 3));
        assert_eq!(manifold.num_points, 4);

        let deepest_pos = manifold.points[0].pos1;
        incremental(
            &mut manifold,
            &mut updater,
            &sample(Vec3::new(0.35, 0.0, 0.35), 0.01, 4),
        );
        assert_eq!(manifold.num_points, 4);
        // the deepest point survived the replacement
        assert!(manifold.points[..4]
            .iter()
            .any(|p| (p.pos1 - deepest_pos).length() < 1e-12));
        // the new sample is present
        assert!(manifold.points[..4].iter().any(|p| p.id == 4));
    }

    #[test]
    fn separated_points_are_pruned() {
        let mut manifold = Manifold::default();
        let mut updater = ManifoldUpdater::new();
        incremental(&mut manifold, &mut updater, &sample(Vec3::ZERO, 0.01, 0));
        // re-run with the same geometry but bodies pulled apart: pos1 ends
        // up far above pos2 along the normal
        let mut r = DetectorResult::default();
        r.incremental = true;
        r.set_normal(Vec3::Y);
        r.add_point(
            Vec3::new(3.0, 1.0, 0.0),
            Vec3::new(3.0, 0.99, 0.0),
            0.01,
            1,
        );
        let tf1 = Transform::from_position(Vec3::new(0.0, CONTACT_PERSISTENCE_THRESHOLD * 2.0, 0.0));
        let tf2 = Transform::IDENTITY;
        manifold.build_basis(r.normal);
        updater.incremental_update(&mut manifold, &r, &tf1, &tf2);
        // the old point separated along the normal and is dropped; only the
        // fresh sample remains
        assert_eq!(manifold.num_points, 1);
        assert_eq!(manifold.points[0].id, 1);
    }

    #[test]
    fn total_update_restores_impulses_by_id() {
        let mut manifold = Manifold::default();
        let mut updater = ManifoldUpdater::new();
        let tf = Transform::IDENTITY;

        let mut r = DetectorResult::default();
        r.set_normal(Vec3::Y);
        r.add_point(Vec3::ZERO, Vec3::ZERO, 0.1, 7);
        r.add_point(Vec3::X, Vec3::X, 0.1, 8);
        manifold.build_basis(r.normal);
        updater.total_update(&mut manifold, &r, &tf, &tf);
        manifold.points[0].impulse.impulse_n = 3.0;
        manifold.points[0].impulse.impulse_p = 2.0;

        let mut r2 = DetectorResult::default();
        r2.set_normal(Vec3::Y);
        r2.add_point(Vec3::ZERO, Vec3::ZERO, 0.15, 7);
        r2.add_point(Vec3::Z, Vec3::Z, 0.05, 9);
        updater.total_update(&mut manifold, &r2, &tf, &tf);

        assert_eq!(manifold.num_points, 2);
        assert_eq!(manifold.points[0].impulse.impulse_n, 3.0);
        assert!(manifold.points[0].warm_started);
        // the position impulse is not carried across updates
        assert_eq!(manifold.points[0].impulse.impulse_p, 0.0);
        assert!(!manifold.points[1].warm_started);
    }
}
