//! Contact lifecycle: creation from broad-phase pairs, refresh, destruction,
//! and the narrow-phase manifold update pass.

use crate::collision::broadphase::BroadPhase;
use crate::collision::narrowphase::Narrowphase;
use crate::core::rigidbody::{ContactId, RigidBody};
use crate::core::shape::{Shape, ShapeId};
use crate::dynamics::contact::{Contact, ContactCallback};
use crate::utils::allocator::Arena;

type CallbackArena = Arena<Box<dyn ContactCallback>>;

/// Which lifecycle hook to fire.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ContactEvent {
    Begin,
    PreSolve,
    PostSolve,
    End,
}

/// Manages the world's contacts. Contacts are created when two shape AABBs
/// begin to overlap and destroyed when they stop; in between, the narrow
/// phase keeps their manifolds current.
#[derive(Default)]
pub struct ContactManager {
    pub(crate) contacts: Arena<Contact>,
    /// Insertion-ordered contact list; the iteration order of every pass.
    pub(crate) order: Vec<ContactId>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_contacts(&self) -> usize {
        self.order.len()
    }

    /// Runs the broad phase and synchronizes the contact list with its pair
    /// output.
    pub(crate) fn update_contacts(
        &mut self,
        broad_phase: &mut dyn BroadPhase,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        joints: &crate::utils::allocator::Arena<crate::dynamics::joint::Joint>,
        callbacks: &mut CallbackArena,
    ) {
        broad_phase.collect_pairs();
        self.create_contacts(broad_phase, bodies, shapes, joints);
        self.destroy_outdated_contacts(broad_phase, bodies, shapes, joints, callbacks);
    }

    fn create_contacts(
        &mut self,
        broad_phase: &dyn BroadPhase,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        joints: &crate::utils::allocator::Arena<crate::dynamics::joint::Joint>,
    ) {
        // the pair buffer belongs to the broad phase; copy out to decouple
        // borrows while contacts are created
        let pairs: Vec<_> = broad_phase.pairs().to_vec();
        for pair in pairs {
            // canonical order by proxy id
            let (sid1, sid2) = if pair.proxy1 <= pair.proxy2 {
                (pair.shape1, pair.shape2)
            } else {
                (pair.shape2, pair.shape1)
            };
            let (Some(s1), Some(s2)) = (shapes.get(sid1), shapes.get(sid2)) else {
                continue;
            };

            if !should_collide(s1, s2, bodies, joints) {
                continue;
            }

            // search the shorter contact list of the two bodies for the
            // same pair
            let b1 = bodies.get(s1.body).unwrap();
            let b2 = bodies.get(s2.body).unwrap();
            let search = if b1.contacts.len() < b2.contacts.len() {
                &b1.contacts
            } else {
                &b2.contacts
            };
            let mut found = false;
            for cid in search {
                if let Some(c) = self.contacts.get(*cid) {
                    let (c1, c2) = (
                        shapes.get(c.shape1).map(|s| s.id),
                        shapes.get(c.shape2).map(|s| s.id),
                    );
                    if c1 == Some(s1.id) && c2 == Some(s2.id) {
                        found = true;
                        let c = self.contacts.get_mut(*cid).unwrap();
                        c.latest = true;
                        break;
                    }
                }
            }
            if found {
                continue;
            }

            let mut contact = Contact::new(sid1, sid2, s1.body, s2.body);
            contact.latest = true;
            contact
                .constraint
                .set_materials(s1.friction, s2.friction, s1.restitution, s2.restitution);
            let cid = self.contacts.insert(contact);
            self.order.push(cid);
            bodies.get_mut(s1.body).unwrap().contacts.push(cid);
            bodies.get_mut(s2.body).unwrap().contacts.push(cid);
        }
    }

    fn destroy_outdated_contacts(
        &mut self,
        broad_phase: &dyn BroadPhase,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        joints: &crate::utils::allocator::Arena<crate::dynamics::joint::Joint>,
        callbacks: &mut CallbackArena,
    ) {
        let incremental = broad_phase.is_incremental();
        let mut to_destroy = Vec::new();

        for cid in &self.order {
            let Some(contact) = self.contacts.get_mut(*cid) else {
                continue;
            };
            if contact.latest {
                // overlapping this step; age it for the next one
                contact.latest = false;
                contact.should_be_skipped = false;
                continue;
            }
            if !incremental {
                // every overlapping pair was re-reported, so this one ended
                to_destroy.push(*cid);
                continue;
            }

            let (Some(s1), Some(s2)) = (shapes.get(contact.shape1), shapes.get(contact.shape2))
            else {
                to_destroy.push(*cid);
                continue;
            };
            let b1 = bodies.get(contact.body1).unwrap();
            let b2 = bodies.get(contact.body2).unwrap();
            let active1 = !b1.sleeping() && !b1.is_static();
            let active2 = !b2.sleeping() && !b2.is_static();
            if !active1 && !active2 {
                // neither endpoint can move; leave the contact untouched
                contact.should_be_skipped = true;
                continue;
            }

            let overlapping = match (s1.proxy, s2.proxy) {
                (Some(p1), Some(p2)) => broad_phase.overlap(p1, p2),
                _ => false,
            };
            if !overlapping || !should_collide(s1, s2, bodies, joints) {
                to_destroy.push(*cid);
                continue;
            }
            contact.should_be_skipped = false;
        }

        for cid in to_destroy {
            self.destroy_contact(cid, bodies, shapes, Some(&mut *callbacks));
        }
    }

    /// Detaches and frees a contact. When a callback arena is provided and
    /// the contact was touching, `end_contact` fires first.
    pub(crate) fn destroy_contact(
        &mut self,
        cid: ContactId,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        callbacks: Option<&mut CallbackArena>,
    ) {
        let Some(contact) = self.contacts.get(cid) else {
            return;
        };
        if contact.touching {
            if let Some(callbacks) = callbacks {
                self.fire_event(cid, ContactEvent::End, bodies, shapes, callbacks);
            }
        }
        let contact = self.contacts.remove(cid).unwrap();
        if let Some(b) = bodies.get_mut(contact.body1) {
            b.contacts.retain(|c| *c != cid);
            b.wake_up();
        }
        if let Some(b) = bodies.get_mut(contact.body2) {
            b.contacts.retain(|c| *c != cid);
            b.wake_up();
        }
        self.order.retain(|c| *c != cid);
    }

    /// Destroys every contact involving `shape`.
    pub(crate) fn destroy_contacts_of_shape(
        &mut self,
        shape: ShapeId,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        callbacks: &mut CallbackArena,
    ) {
        let doomed: Vec<ContactId> = self
            .order
            .iter()
            .copied()
            .filter(|cid| {
                self.contacts
                    .get(*cid)
                    .is_some_and(|c| c.shape1 == shape || c.shape2 == shape)
            })
            .collect();
        for cid in doomed {
            self.destroy_contact(cid, bodies, shapes, Some(&mut *callbacks));
        }
    }

    /// Narrow-phase pass: runs the detector of every non-skipped contact,
    /// updates its manifold, fires lifecycle callbacks, and picks the
    /// position-correction algorithm.
    pub(crate) fn update_manifolds(
        &mut self,
        narrowphase: &mut Narrowphase,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        callbacks: &mut CallbackArena,
    ) {
        for i in 0..self.order.len() {
            let cid = self.order[i];
            let Some(contact) = self.contacts.get_mut(cid) else {
                continue;
            };
            if contact.should_be_skipped {
                continue;
            }
            let (Some(s1), Some(s2)) = (shapes.get(contact.shape1), shapes.get(contact.shape2))
            else {
                continue;
            };

            let was_touching = contact.touching;

            narrowphase.detect(
                &mut contact.result,
                &s1.geometry,
                &s2.geometry,
                &s1.transform,
                &s2.transform,
                &mut contact.cached_data,
            );

            let tf1 = bodies.get(contact.body1).unwrap().transform;
            let tf2 = bodies.get(contact.body2).unwrap().transform;

            if contact.result.num_points > 0 {
                contact.manifold.build_basis(contact.result.normal);
                if contact.result.incremental {
                    contact
                        .updater
                        .incremental_update(&mut contact.manifold, &contact.result, &tf1, &tf2);
                } else {
                    contact
                        .updater
                        .total_update(&mut contact.manifold, &contact.result, &tf1, &tf2);
                }
            } else {
                contact.manifold.clear();
            }

            contact.touching = contact.manifold.num_points > 0;
            if contact.touching {
                contact.select_position_correction();
            }

            let touching = contact.touching;
            if touching && !was_touching {
                self.fire_event(cid, ContactEvent::Begin, bodies, shapes, callbacks);
            }
            if !touching && was_touching {
                self.fire_event(cid, ContactEvent::End, bodies, shapes, callbacks);
            }
            if touching {
                self.fire_event(cid, ContactEvent::PreSolve, bodies, shapes, callbacks);
            }
        }
    }

    /// Fires `post_solve` on every currently-touching contact.
    pub(crate) fn post_solve(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        callbacks: &mut CallbackArena,
    ) {
        for i in 0..self.order.len() {
            let cid = self.order[i];
            if self.contacts.get(cid).is_some_and(|c| c.touching) {
                self.fire_event(cid, ContactEvent::PostSolve, bodies, shapes, callbacks);
            }
        }
    }

    fn fire_event(
        &self,
        cid: ContactId,
        event: ContactEvent,
        bodies: &mut Arena<RigidBody>,
        shapes: &Arena<Shape>,
        callbacks: &mut CallbackArena,
    ) {
        let Some(contact) = self.contacts.get(cid) else {
            return;
        };
        let cb1 = shapes.get(contact.shape1).and_then(|s| s.contact_callback);
        let mut cb2 = shapes.get(contact.shape2).and_then(|s| s.contact_callback);
        if cb1 == cb2 {
            cb2 = None; // avoid firing the same hook twice
        }
        for cb_id in [cb1, cb2].into_iter().flatten() {
            let Some((b1, b2)) = bodies.get2_mut(contact.body1, contact.body2) else {
                continue;
            };
            let Some(callback) = callbacks.get_mut(cb_id) else {
                continue;
            };
            let view = contact.view();
            match event {
                ContactEvent::Begin => callback.begin_contact(&view, b1, b2),
                ContactEvent::PreSolve => callback.pre_solve(&view, b1, b2),
                ContactEvent::PostSolve => callback.post_solve(&view, b1, b2),
                ContactEvent::End => callback.end_contact(&view, b1, b2),
            }
        }
    }
}

/// Collision filter: rejects same-body pairs, pairs with no dynamic body,
/// group/mask mismatches, and pairs connected by a joint that disables
/// collision. The joint search walks the shorter of the two bodies' joint
/// lists.
fn should_collide(
    s1: &Shape,
    s2: &Shape,
    bodies: &Arena<RigidBody>,
    joints: &crate::utils::allocator::Arena<crate::dynamics::joint::Joint>,
) -> bool {
    if s1.body == s2.body {
        return false;
    }
    let (Some(b1), Some(b2)) = (bodies.get(s1.body), bodies.get(s2.body)) else {
        return false;
    };
    if !b1.is_dynamic() && !b2.is_dynamic() {
        return false;
    }
    if s1.collision_group & s2.collision_mask == 0 || s2.collision_group & s1.collision_mask == 0
    {
        return false;
    }

    let (search, other) = if b1.joints.len() < b2.joints.len() {
        (&b1.joints, s2.body)
    } else {
        (&b2.joints, s1.body)
    };
    for jid in search {
        if let Some(joint) = joints.get(*jid) {
            let connects_other = joint.body1 == other || joint.body2 == other;
            if connects_other && !joint.allow_collision() {
                return false;
            }
        }
    }
    true
}
