//! Owns the broadphase and the live contacts of a world.

use slotmap::SlotMap;

use crate::collision::broadphase::BroadPhase;
use crate::pooling::WorldPool;

use super::callbacks::{ContactFilter, ContactListener, DefaultContactFilter};
use super::contact::{Contact, ContactKind, ContactPools};
use super::fixture::{Fixture, FixtureProxyRef};
use super::joints::Joint;
use super::rigid_body::{Body, BodyType, ContactEdge};
use super::{BodyHandle, ContactKey, FixtureHandle, JointHandle};

/// Can two bodies collide at all? At least one must be dynamic and no joint
/// between them may disable collision.
pub(crate) fn bodies_should_collide(
    bodies: &SlotMap<BodyHandle, Body>,
    joints: &SlotMap<JointHandle, Joint>,
    handle_a: BodyHandle,
    handle_b: BodyHandle,
) -> bool {
    let (Some(body_a), Some(body_b)) = (bodies.get(handle_a), bodies.get(handle_b)) else {
        return false;
    };
    if !body_a.can_collide_with(body_b) {
        return false;
    }

    // Does a joint override collision?
    !body_b.joints.iter().any(|edge| {
        edge.other == handle_a
            && joints
                .get(edge.joint)
                .is_some_and(|joint| !joint.collide_connected())
    })
}

pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<FixtureProxyRef>,
    pub(crate) contacts: SlotMap<ContactKey, Contact>,
    pub(crate) filter: Box<dyn ContactFilter>,
    pub(crate) listener: Option<Box<dyn ContactListener>>,
    keys: Vec<ContactKey>,
}

impl Default for ContactManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactManager {
    pub fn new() -> Self {
        Self {
            broad_phase: BroadPhase::new(),
            contacts: SlotMap::with_key(),
            filter: Box::new(DefaultContactFilter),
            listener: None,
            keys: Vec::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn broad_phase(&self) -> &BroadPhase<FixtureProxyRef> {
        &self.broad_phase
    }

    /// Create contacts for new broadphase pairs.
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        joints: &SlotMap<JointHandle, Joint>,
        pools: &mut ContactPools,
    ) {
        let Self {
            broad_phase,
            contacts,
            filter,
            ..
        } = self;

        let mut pairs = PairContext {
            contacts,
            filter: filter.as_ref(),
            bodies,
            fixtures,
            joints,
            pools,
        };
        broad_phase.update_pairs(|proxy_a, proxy_b| pairs.add_pair(*proxy_a, *proxy_b));
    }

    /// Narrowphase for every contact: re-filter flagged contacts, destroy
    /// contacts whose proxies no longer overlap, update the rest.
    pub(crate) fn collide(
        &mut self,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        joints: &SlotMap<JointHandle, Joint>,
        pool: &mut WorldPool,
    ) {
        let Self {
            broad_phase,
            contacts,
            filter,
            listener,
            keys,
        } = self;

        keys.clear();
        keys.extend(contacts.keys());

        for &key in keys.iter() {
            let Some(contact) = contacts.get(key) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };
            let handle_a = contact.body_a;
            let handle_b = contact.body_b;

            // Is this contact flagged for filtering?
            if contact.flags.filter {
                if !bodies_should_collide(bodies, joints, handle_a, handle_b)
                    || !filter.should_collide(fixture_a, fixture_b)
                {
                    Self::destroy_contact(contacts, listener, bodies, &mut pool.contacts, key);
                    continue;
                }
                if let Some(contact) = contacts.get_mut(key) {
                    contact.flags.filter = false;
                }
            }

            let Some(contact) = contacts.get(key) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(handle_a), bodies.get(handle_b)) else {
                continue;
            };

            // At least one body must be awake and it must be dynamic or kinematic.
            let active_a = body_a.awake && body_a.body_type != BodyType::Static;
            let active_b = body_b.awake && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            let overlap = match (
                fixture_a.proxy_id(contact.child_index_a),
                fixture_b.proxy_id(contact.child_index_b),
            ) {
                (Some(proxy_a), Some(proxy_b)) => broad_phase.test_overlap(proxy_a, proxy_b),
                _ => false,
            };

            // Destroy contacts that cease to overlap in the broadphase.
            if !overlap {
                Self::destroy_contact(contacts, listener, bodies, &mut pool.contacts, key);
                continue;
            }

            let xf_a = body_a.xf;
            let xf_b = body_b.xf;

            let Some(contact) = contacts.get_mut(key) else {
                continue;
            };
            let changed = contact.update(
                fixture_a,
                fixture_b,
                &xf_a,
                &xf_b,
                pool,
                listener.as_deref_mut(),
            );
            if changed {
                for handle in [handle_a, handle_b] {
                    if let Some(body) = bodies.get_mut(handle) {
                        body.set_awake(true);
                    }
                }
            }
        }
    }

    /// Re-run the narrowphase for one contact at the bodies' current
    /// transforms. Used by the time of impact solver.
    pub(crate) fn update_contact(
        &mut self,
        key: ContactKey,
        bodies: &SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        pool: &mut WorldPool,
    ) {
        let Some(contact) = self.contacts.get_mut(key) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) =
            (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b))
        else {
            return;
        };
        contact.update(
            fixture_a,
            fixture_b,
            &body_a.xf,
            &body_b.xf,
            pool,
            self.listener.as_deref_mut(),
        );
    }

    /// Destroy a contact, firing `end_contact` if it was touching.
    pub(crate) fn destroy(
        &mut self,
        key: ContactKey,
        bodies: &mut SlotMap<BodyHandle, Body>,
        pools: &mut ContactPools,
    ) {
        Self::destroy_contact(&mut self.contacts, &mut self.listener, bodies, pools, key);
    }

    fn destroy_contact(
        contacts: &mut SlotMap<ContactKey, Contact>,
        listener: &mut Option<Box<dyn ContactListener>>,
        bodies: &mut SlotMap<BodyHandle, Body>,
        pools: &mut ContactPools,
        key: ContactKey,
    ) {
        let Some(contact) = contacts.remove(key) else {
            return;
        };

        if contact.is_touching() {
            if let Some(listener) = listener.as_deref_mut() {
                listener.end_contact(&contact);
            }
        }

        // Bodies that lose a solid touching contact must re-check their support.
        let wake = contact.manifold.point_count > 0 && !contact.sensor;
        for handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(handle) {
                body.contacts.retain(|edge| edge.contact != key);
                if wake {
                    body.set_awake(true);
                }
            }
        }

        tracing::trace!(kind = ?contact.kind, "contact destroyed");
        pools.push(contact);
    }
}

/// Borrowed world state needed to turn a broadphase pair into a contact.
struct PairContext<'a> {
    contacts: &'a mut SlotMap<ContactKey, Contact>,
    filter: &'a dyn ContactFilter,
    bodies: &'a mut SlotMap<BodyHandle, Body>,
    fixtures: &'a SlotMap<FixtureHandle, Fixture>,
    joints: &'a SlotMap<JointHandle, Joint>,
    pools: &'a mut ContactPools,
}

impl PairContext<'_> {
    fn add_pair(&mut self, proxy_a: FixtureProxyRef, proxy_b: FixtureProxyRef) {
        let (Some(fixture_a), Some(fixture_b)) = (
            self.fixtures.get(proxy_a.fixture),
            self.fixtures.get(proxy_b.fixture),
        ) else {
            return;
        };

        let body_a = fixture_a.body;
        let body_b = fixture_b.body;

        // Are the fixtures on the same body?
        if body_a == body_b {
            return;
        }

        // Does a contact already exist?
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        let exists = body
            .contacts
            .iter()
            .filter(|edge| edge.other == body_a)
            .filter_map(|edge| self.contacts.get(edge.contact))
            .any(|c| {
                let same = c.fixture_a == proxy_a.fixture
                    && c.child_index_a == proxy_a.child_index
                    && c.fixture_b == proxy_b.fixture
                    && c.child_index_b == proxy_b.child_index;
                let swapped = c.fixture_a == proxy_b.fixture
                    && c.child_index_a == proxy_b.child_index
                    && c.fixture_b == proxy_a.fixture
                    && c.child_index_b == proxy_a.child_index;
                same || swapped
            });
        if exists {
            return;
        }

        if !bodies_should_collide(self.bodies, self.joints, body_a, body_b) {
            return;
        }

        if !self.filter.should_collide(fixture_a, fixture_b) {
            return;
        }

        let Some((kind, swap)) =
            ContactKind::for_pair(fixture_a.shape_type(), fixture_b.shape_type())
        else {
            return;
        };

        let (proxy_a, fixture_a, proxy_b, fixture_b) = if swap {
            (proxy_b, fixture_b, proxy_a, fixture_a)
        } else {
            (proxy_a, fixture_a, proxy_b, fixture_b)
        };

        let mut contact = self.pools.pop(kind);
        contact.init(
            kind,
            proxy_a.fixture,
            fixture_a,
            proxy_a.child_index,
            proxy_b.fixture,
            fixture_b,
            proxy_b.child_index,
        );
        let body_a = contact.body_a;
        let body_b = contact.body_b;
        let sensor = contact.sensor;
        let key = self.contacts.insert(contact);

        // Connect to the island graph and wake the bodies.
        for (handle, other) in [(body_a, body_b), (body_b, body_a)] {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.contacts.push(ContactEdge {
                    contact: key,
                    other,
                });
                if !sensor {
                    body.set_awake(true);
                }
            }
        }

        tracing::trace!(?kind, "contact created");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::fixture::FixtureDef;
    use crate::dynamics::rigid_body::BodyDef;
    use crate::shape::{CircleShape, PolygonShape};
    use glam::Vec2;

    struct Scene {
        bodies: SlotMap<BodyHandle, Body>,
        fixtures: SlotMap<FixtureHandle, Fixture>,
        joints: SlotMap<JointHandle, Joint>,
        manager: ContactManager,
        pool: WorldPool,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: SlotMap::with_key(),
                fixtures: SlotMap::with_key(),
                joints: SlotMap::with_key(),
                manager: ContactManager::new(),
                pool: WorldPool::new(32, 2),
            }
        }

        fn add(&mut self, def: BodyDef, fixture: FixtureDef) -> (BodyHandle, FixtureHandle) {
            let body = self.bodies.insert(Body::new(&def));
            let xf = self.bodies[body].xf;
            let handle = self.fixtures.insert(Fixture::new(body, &fixture));
            self.fixtures[handle].create_proxies(handle, &mut self.manager.broad_phase, &xf);
            self.bodies[body].fixtures.push(handle);
            (body, handle)
        }

        fn find(&mut self) {
            self.manager.find_new_contacts(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                &mut self.pool.contacts,
            );
        }

        fn collide(&mut self) {
            self.manager
                .collide(&mut self.bodies, &self.fixtures, &self.joints, &mut self.pool);
        }

        fn move_body(&mut self, body: BodyHandle, to: Vec2) {
            let xf1 = self.bodies[body].xf;
            self.bodies[body].set_transform_raw(to, 0.0);
            let xf2 = self.bodies[body].xf;
            for handle in self.bodies[body].fixtures.clone() {
                self.fixtures[handle].synchronize(&mut self.manager.broad_phase, &xf1, &xf2);
            }
        }
    }

    #[test]
    fn test_pair_becomes_touching_contact() {
        let mut scene = Scene::new();
        let (a, _) = scene.add(BodyDef::dynamic(Vec2::ZERO), FixtureDef::new(CircleShape::new(1.0)));
        let (b, _) = scene.add(
            BodyDef::dynamic(Vec2::new(1.5, 0.0)),
            FixtureDef::new(CircleShape::new(1.0)),
        );

        scene.find();
        assert_eq!(scene.manager.contact_count(), 1);
        assert_eq!(scene.bodies[a].contact_count(), 1);
        assert_eq!(scene.bodies[b].contact_count(), 1);

        // A second update never duplicates the contact.
        scene.manager.broad_phase.touch_proxy(scene.fixtures.values().next().unwrap().proxies[0].proxy_id);
        scene.find();
        assert_eq!(scene.manager.contact_count(), 1);

        scene.collide();
        let contact = scene.manager.contacts().next().unwrap();
        assert!(contact.is_touching());
        assert_eq!(contact.manifold().point_count, 1);
    }

    #[test]
    fn test_shapes_are_ordered_by_kind() {
        let mut scene = Scene::new();
        let (_, circle) = scene.add(BodyDef::dynamic(Vec2::ZERO), FixtureDef::new(CircleShape::new(0.5)));
        let (_, boxed) = scene.add(
            BodyDef::fixed(Vec2::new(0.0, -0.9)),
            FixtureDef::new(PolygonShape::new_box(2.0, 0.5)),
        );
        scene.find();
        let contact = scene.manager.contacts().next().unwrap();
        assert_eq!(contact.kind(), ContactKind::PolygonCircle);
        assert_eq!(contact.fixture_a(), boxed);
        assert_eq!(contact.fixture_b(), circle);
    }

    #[test]
    fn test_static_pairs_are_skipped() {
        let mut scene = Scene::new();
        scene.add(BodyDef::fixed(Vec2::ZERO), FixtureDef::new(CircleShape::new(1.0)));
        scene.add(BodyDef::kinematic(Vec2::new(0.5, 0.0)), FixtureDef::new(CircleShape::new(1.0)));
        scene.find();
        assert_eq!(scene.manager.contact_count(), 0);
    }

    #[test]
    fn test_separated_contact_returns_to_pool() {
        let mut scene = Scene::new();
        scene.add(BodyDef::fixed(Vec2::ZERO), FixtureDef::new(CircleShape::new(1.0)));
        let (b, _) = scene.add(
            BodyDef::dynamic(Vec2::new(1.5, 0.0)),
            FixtureDef::new(CircleShape::new(1.0)),
        );
        scene.find();
        let idle = scene.pool.contacts.available(ContactKind::Circle);
        scene.collide();
        assert!(scene.manager.contacts().next().unwrap().is_touching());

        scene.move_body(b, Vec2::new(10.0, 0.0));
        scene.collide();
        assert_eq!(scene.manager.contact_count(), 0);
        assert_eq!(scene.bodies[b].contact_count(), 0);
        assert_eq!(scene.pool.contacts.available(ContactKind::Circle), idle + 1);
    }

    #[test]
    fn test_flagged_contact_is_refiltered() {
        let mut scene = Scene::new();
        scene.add(BodyDef::dynamic(Vec2::ZERO), FixtureDef::new(CircleShape::new(1.0)));
        let (_, fixture) = scene.add(
            BodyDef::dynamic(Vec2::new(1.0, 0.0)),
            FixtureDef::new(CircleShape::new(1.0)),
        );
        scene.find();
        assert_eq!(scene.manager.contact_count(), 1);

        scene.fixtures[fixture].filter.group_index = -1;
        scene.collide();
        // Not flagged: the cached decision stands.
        assert_eq!(scene.manager.contact_count(), 1);

        scene.fixtures[fixture].filter.mask_bits = 0;
        for contact in scene.manager.contacts.values_mut() {
            contact.flag_for_filtering();
        }
        scene.collide();
        assert_eq!(scene.manager.contact_count(), 0);
    }
}
