//! Contacts between fixture pairs whose proxies overlap.
//!
//! A contact exists while the fat AABBs overlap. It is touching while its
//! manifold has points (or, for sensors, while the shapes overlap).

use crate::collision::manifold::{Manifold, WorldManifold};
use crate::collision::narrowphase::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon,
    collide_polygon_and_circle, collide_polygons, test_overlap,
};
use crate::math::Transform;
use crate::pooling::{MutableStack, WorldPool};
use crate::shape::{Shape, ShapeType};

use super::callbacks::ContactListener;
use super::fixture::Fixture;
use super::{BodyHandle, FixtureHandle};

/// Friction mixing law: geometric mean.
#[inline]
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing law: the bouncier fixture wins.
#[inline]
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

/// Shape pair handled by a contact. Shape A is always the first named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContactKind {
    #[default]
    Circle,
    PolygonCircle,
    Polygon,
    EdgeCircle,
    EdgePolygon,
    ChainCircle,
    ChainPolygon,
}

impl ContactKind {
    pub const COUNT: usize = 7;

    pub const ALL: [ContactKind; Self::COUNT] = [
        ContactKind::Circle,
        ContactKind::PolygonCircle,
        ContactKind::Polygon,
        ContactKind::EdgeCircle,
        ContactKind::EdgePolygon,
        ContactKind::ChainCircle,
        ContactKind::ChainPolygon,
    ];

    /// Contact kind for a shape pair and whether the fixtures must be swapped
    /// so that shape A comes first. `None` for pairs that never collide
    /// (edges and chains against each other).
    pub fn for_pair(type_a: ShapeType, type_b: ShapeType) -> Option<(ContactKind, bool)> {
        use ShapeType::*;
        let found = match (type_a, type_b) {
            (Circle, Circle) => (ContactKind::Circle, false),
            (Polygon, Circle) => (ContactKind::PolygonCircle, false),
            (Circle, Polygon) => (ContactKind::PolygonCircle, true),
            (Polygon, Polygon) => (ContactKind::Polygon, false),
            (Edge, Circle) => (ContactKind::EdgeCircle, false),
            (Circle, Edge) => (ContactKind::EdgeCircle, true),
            (Edge, Polygon) => (ContactKind::EdgePolygon, false),
            (Polygon, Edge) => (ContactKind::EdgePolygon, true),
            (Chain, Circle) => (ContactKind::ChainCircle, false),
            (Circle, Chain) => (ContactKind::ChainCircle, true),
            (Chain, Polygon) => (ContactKind::ChainPolygon, false),
            (Polygon, Chain) => (ContactKind::ChainPolygon, true),
            (Edge | Chain, Edge | Chain) => return None,
        };
        Some(found)
    }
}

/// One free list of contacts per [`ContactKind`].
pub struct ContactPools {
    stacks: [MutableStack<Contact>; ContactKind::COUNT],
}

impl ContactPools {
    pub fn new(initial_size: usize) -> Self {
        Self {
            stacks: std::array::from_fn(|_| MutableStack::new(initial_size, Contact::default)),
        }
    }

    pub(crate) fn pop(&mut self, kind: ContactKind) -> Contact {
        self.stacks[kind as usize].pop()
    }

    pub(crate) fn push(&mut self, contact: Contact) {
        self.stacks[contact.kind as usize].push(contact);
    }

    /// Idle contacts of a kind.
    pub fn available(&self, kind: ContactKind) -> usize {
        self.stacks[kind as usize].len()
    }

    /// Contacts of a kind ever created by the pool.
    pub fn capacity(&self, kind: ContactKind) -> usize {
        self.stacks[kind as usize].capacity()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ContactFlags {
    /// Used while building islands.
    pub island: bool,
    pub touching: bool,
    /// Disabled by the user for the current step.
    pub enabled: bool,
    /// Filtering must be re-evaluated.
    pub filter: bool,
    /// `toi` holds a valid time of impact.
    pub toi: bool,
}

/// Contact between two fixture children.
#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub(crate) kind: ContactKind,
    pub(crate) flags: ContactFlags,

    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) child_index_a: usize,
    pub(crate) child_index_b: usize,

    pub(crate) manifold: Manifold,

    pub(crate) toi_count: u32,
    pub(crate) toi: f32,

    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,

    mixed_friction: f32,
    mixed_restitution: f32,

    // Snapshot from the last update, for listeners and the solver.
    pub(crate) sensor: bool,
    pub(crate) radius_a: f32,
    pub(crate) radius_b: f32,
    xf_a: Transform,
    xf_b: Transform,
    user_data_a: u64,
    user_data_b: u64,
}

impl Contact {
    /// Reset a pooled contact for a new fixture pair. Fixtures must already be
    /// ordered for `kind`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn init(
        &mut self,
        kind: ContactKind,
        handle_a: FixtureHandle,
        fixture_a: &Fixture,
        child_index_a: usize,
        handle_b: FixtureHandle,
        fixture_b: &Fixture,
        child_index_b: usize,
    ) {
        let mixed_friction = mix_friction(fixture_a.friction, fixture_b.friction);
        let mixed_restitution = mix_restitution(fixture_a.restitution, fixture_b.restitution);

        *self = Contact {
            kind,
            flags: ContactFlags {
                enabled: true,
                ..Default::default()
            },
            fixture_a: handle_a,
            fixture_b: handle_b,
            body_a: fixture_a.body,
            body_b: fixture_b.body,
            child_index_a,
            child_index_b,
            manifold: Manifold::default(),
            toi_count: 0,
            toi: 0.0,
            friction: mixed_friction,
            restitution: mixed_restitution,
            tangent_speed: 0.0,
            mixed_friction,
            mixed_restitution,
            sensor: fixture_a.is_sensor || fixture_b.is_sensor,
            radius_a: fixture_a.shape.radius(),
            radius_b: fixture_b.shape.radius(),
            xf_a: Transform::IDENTITY,
            xf_b: Transform::IDENTITY,
            user_data_a: fixture_a.user_data,
            user_data_b: fixture_b.user_data,
        };
    }

    pub fn kind(&self) -> ContactKind {
        self.kind
    }

    /// Local-space manifold. Empty for sensors.
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// World-space manifold as of the last update.
    pub fn world_manifold(&self) -> WorldManifold {
        WorldManifold::new(
            &self.manifold,
            &self.xf_a,
            self.radius_a,
            &self.xf_b,
            self.radius_b,
        )
    }

    pub fn is_touching(&self) -> bool {
        self.flags.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.enabled
    }

    /// Disable the contact for the current step. Use from
    /// [`ContactListener::pre_solve`]; contacts are re-enabled every update.
    pub fn set_enabled(&mut self, flag: bool) {
        self.flags.enabled = flag;
    }

    /// Either fixture is a sensor.
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_index_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_index_b
    }

    /// User data of fixture A.
    pub fn user_data_a(&self) -> u64 {
        self.user_data_a
    }

    pub fn user_data_b(&self) -> u64 {
        self.user_data_b
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Override the mixed friction. Persists until [`Self::reset_friction`].
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn reset_friction(&mut self) {
        self.friction = self.mixed_friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn reset_restitution(&mut self) {
        self.restitution = self.mixed_restitution;
    }

    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    /// Desired tangent speed for conveyor belt behavior, in meters per second.
    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    /// Flag for re-filtering on the next collide.
    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags.filter = true;
    }

    /// Compute the manifold for the current transforms.
    pub(crate) fn evaluate(
        &self,
        manifold: &mut Manifold,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        pool: &mut WorldPool,
    ) {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(manifold, a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => {
                collide_polygon_and_circle(manifold, a, xf_a, b, xf_b)
            }
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(manifold, a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => {
                collide_edge_and_circle(manifold, a, xf_a, b, xf_b)
            }
            (Shape::Edge(a), Shape::Polygon(b)) => {
                collide_edge_and_polygon(manifold, a, xf_a, b, xf_b, &mut pool.vecs)
            }
            (Shape::Chain(chain), Shape::Circle(b)) => {
                let edge = chain.child_edge(self.child_index_a);
                collide_edge_and_circle(manifold, &edge, xf_a, b, xf_b)
            }
            (Shape::Chain(chain), Shape::Polygon(b)) => {
                let edge = chain.child_edge(self.child_index_a);
                collide_edge_and_polygon(manifold, &edge, xf_a, b, xf_b, &mut pool.vecs)
            }
            _ => {
                debug_assert!(false, "{:?} contact with mismatched shapes", self.kind);
                manifold.point_count = 0;
            }
        }
    }

    /// Refresh the manifold and touching state, carrying impulses over from
    /// matching points, and report state changes to the listener. Returns
    /// true when a solid contact started or stopped touching.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        fixture_b: &Fixture,
        xf_a: &Transform,
        xf_b: &Transform,
        pool: &mut WorldPool,
        listener: Option<&mut (dyn ContactListener + 'static)>,
    ) -> bool {
        let old_manifold = self.manifold;

        // Re-enable this contact.
        self.flags.enabled = true;

        let was_touching = self.flags.touching;
        self.sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        self.xf_a = *xf_a;
        self.xf_b = *xf_b;
        self.user_data_a = fixture_a.user_data;
        self.user_data_b = fixture_b.user_data;

        let touching;
        let mut changed = false;
        if self.sensor {
            touching = test_overlap(
                &mut pool.distance,
                &fixture_a.shape,
                self.child_index_a,
                &fixture_b.shape,
                self.child_index_b,
                xf_a,
                xf_b,
            );
            // Sensors don't generate manifolds.
            self.manifold.point_count = 0;
        } else {
            let mut manifold = Manifold::default();
            self.evaluate(&mut manifold, &fixture_a.shape, xf_a, &fixture_b.shape, xf_b, pool);
            self.manifold = manifold;
            touching = self.manifold.point_count > 0;

            // Match new contact ids to old contact ids and copy the stored
            // impulses to warm start the solver.
            for mp2 in self.manifold.points_mut() {
                mp2.normal_impulse = 0.0;
                mp2.tangent_impulse = 0.0;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|mp1| mp1.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }

            changed = touching != was_touching;
        }

        self.flags.touching = touching;

        let Some(listener) = listener else {
            return changed;
        };

        if !was_touching && touching {
            tracing::trace!(kind = ?self.kind, "contact began");
            listener.begin_contact(self);
        }

        if was_touching && !touching {
            tracing::trace!(kind = ?self.kind, "contact ended");
            listener.end_contact(self);
        }

        if !self.sensor && touching {
            listener.pre_solve(self, &old_manifold);
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::ManifoldType;
    use crate::dynamics::callbacks::ContactImpulse;
    use crate::dynamics::fixture::FixtureDef;
    use crate::shape::{ChainShape, CircleShape, PolygonShape};
    use glam::Vec2;

    const EPS: f32 = 1e-5;

    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
        disable: bool,
    }

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, _contact: &Contact) {
            self.events.push("begin");
        }

        fn end_contact(&mut self, _contact: &Contact) {
            self.events.push("end");
        }

        fn pre_solve(&mut self, contact: &mut Contact, _old_manifold: &Manifold) {
            self.events.push("pre");
            if self.disable {
                contact.set_enabled(false);
            }
        }

        fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {
            self.events.push("post");
        }
    }

    fn fixture(def: FixtureDef) -> Fixture {
        Fixture::new(BodyHandle::default(), &def)
    }

    fn circle_contact(a: &Fixture, b: &Fixture) -> Contact {
        let mut contact = Contact::default();
        contact.init(
            ContactKind::Circle,
            FixtureHandle::default(),
            a,
            0,
            FixtureHandle::default(),
            b,
            0,
        );
        contact
    }

    #[test]
    fn test_kind_for_pair_orders_shapes() {
        use ShapeType::*;
        assert_eq!(
            ContactKind::for_pair(Circle, Polygon),
            Some((ContactKind::PolygonCircle, true))
        );
        assert_eq!(
            ContactKind::for_pair(Chain, Polygon),
            Some((ContactKind::ChainPolygon, false))
        );
        assert_eq!(
            ContactKind::for_pair(Polygon, Edge),
            Some((ContactKind::EdgePolygon, true))
        );
        assert_eq!(ContactKind::for_pair(Edge, Chain), None);
        assert_eq!(ContactKind::for_pair(Edge, Edge), None);
    }

    #[test]
    fn test_pools_recycle_per_kind() {
        let mut pools = ContactPools::new(2);
        let mut contact = pools.pop(ContactKind::Polygon);
        contact.kind = ContactKind::Polygon;
        assert_eq!(pools.available(ContactKind::Polygon), 1);
        assert_eq!(pools.available(ContactKind::Circle), 2);

        pools.push(contact);
        assert_eq!(pools.available(ContactKind::Polygon), 2);

        let held: Vec<_> = (0..3).map(|_| pools.pop(ContactKind::EdgeCircle)).collect();
        assert_eq!(held.len(), 3);
        assert_eq!(pools.capacity(ContactKind::EdgeCircle), 4);
    }

    #[test]
    fn test_mixing_laws() {
        let a = fixture(FixtureDef::new(CircleShape::new(1.0)).with_friction(0.4).with_restitution(0.1));
        let b = fixture(FixtureDef::new(CircleShape::new(1.0)).with_friction(0.9).with_restitution(0.5));
        let mut contact = circle_contact(&a, &b);
        assert!((contact.friction() - 0.6).abs() < EPS);
        assert_eq!(contact.restitution(), 0.5);

        contact.set_friction(0.0);
        contact.set_restitution(1.0);
        contact.reset_friction();
        contact.reset_restitution();
        assert!((contact.friction() - 0.6).abs() < EPS);
        assert_eq!(contact.restitution(), 0.5);
    }

    #[test]
    fn test_update_reports_transitions() {
        let a = fixture(FixtureDef::new(CircleShape::new(1.0)));
        let b = fixture(FixtureDef::new(CircleShape::new(1.0)));
        let mut contact = circle_contact(&a, &b);
        let mut pool = WorldPool::new(16, 2);
        let mut recorder = Recorder::default();

        let xf_a = Transform::IDENTITY;
        let near = Transform::from_translation(Vec2::new(1.5, 0.0));
        let far = Transform::from_translation(Vec2::new(2.5, 0.0));

        let changed = contact.update(&a, &b, &xf_a, &near, &mut pool, Some(&mut recorder));
        assert!(changed);
        assert!(contact.is_touching());
        assert_eq!(contact.manifold().manifold_type, ManifoldType::Circles);

        let wm = contact.world_manifold();
        assert!((wm.normal - Vec2::X).length() < EPS);
        assert!((wm.separations[0] + 0.5).abs() < EPS);

        contact.update(&a, &b, &xf_a, &near, &mut pool, Some(&mut recorder));
        let changed = contact.update(&a, &b, &xf_a, &far, &mut pool, Some(&mut recorder));
        assert!(changed);
        assert!(!contact.is_touching());

        assert_eq!(recorder.events, vec!["begin", "pre", "pre", "end"]);
    }

    #[test]
    fn test_update_carries_impulses_by_id() {
        let a = fixture(FixtureDef::new(PolygonShape::new_box(0.5, 0.5)));
        let b = fixture(FixtureDef::new(PolygonShape::new_box(2.0, 0.5)));
        let mut contact = Contact::default();
        contact.init(
            ContactKind::Polygon,
            FixtureHandle::default(),
            &a,
            0,
            FixtureHandle::default(),
            &b,
            0,
        );
        let mut pool = WorldPool::new(16, 2);

        let xf_a = Transform::from_translation(Vec2::new(0.0, 0.99));
        let xf_b = Transform::IDENTITY;
        contact.update(&a, &b, &xf_a, &xf_b, &mut pool, None);
        assert_eq!(contact.manifold().point_count, 2);
        for (i, mp) in contact.manifold.points_mut().iter_mut().enumerate() {
            mp.normal_impulse = 1.0 + i as f32;
            mp.tangent_impulse = 0.5;
        }

        // Same features touch after a small slide.
        let xf_a = Transform::from_translation(Vec2::new(0.01, 0.99));
        let changed = contact.update(&a, &b, &xf_a, &xf_b, &mut pool, None);
        assert!(!changed);
        let impulses: Vec<f32> = contact
            .manifold()
            .points()
            .iter()
            .map(|mp| mp.normal_impulse)
            .collect();
        assert_eq!(impulses, vec![1.0, 2.0]);
        assert!(contact.manifold().points().iter().all(|mp| mp.tangent_impulse == 0.5));
    }

    #[test]
    fn test_sensor_touches_without_manifold() {
        let a = fixture(FixtureDef::new(CircleShape::new(1.0)).sensor());
        let b = fixture(FixtureDef::new(CircleShape::new(1.0)));
        let mut contact = circle_contact(&a, &b);
        let mut pool = WorldPool::new(16, 2);
        let mut recorder = Recorder::default();

        let xf_b = Transform::from_translation(Vec2::new(1.0, 0.0));
        let changed =
            contact.update(&a, &b, &Transform::IDENTITY, &xf_b, &mut pool, Some(&mut recorder));
        assert!(!changed);
        assert!(contact.is_touching());
        assert!(contact.is_sensor());
        assert_eq!(contact.manifold().point_count, 0);
        assert_eq!(recorder.events, vec!["begin"]);
        assert_eq!(pool.distance.gjk_calls, 1);
    }

    #[test]
    fn test_pre_solve_can_disable() {
        let a = fixture(FixtureDef::new(CircleShape::new(1.0)));
        let b = fixture(FixtureDef::new(CircleShape::new(1.0)));
        let mut contact = circle_contact(&a, &b);
        let mut pool = WorldPool::new(16, 2);
        let mut recorder = Recorder {
            disable: true,
            ..Default::default()
        };

        let xf_b = Transform::from_translation(Vec2::new(1.0, 0.0));
        contact.update(&a, &b, &Transform::IDENTITY, &xf_b, &mut pool, Some(&mut recorder));
        assert!(contact.is_touching());
        assert!(!contact.is_enabled());

        // Re-enabled by the next update.
        contact.update(&a, &b, &Transform::IDENTITY, &xf_b, &mut pool, None);
        assert!(contact.is_enabled());
    }

    #[test]
    fn test_chain_contact_uses_child_edge() {
        let chain = ChainShape::new_chain(&[
            Vec2::new(-4.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
        ])
        .unwrap();
        let a = fixture(FixtureDef::new(chain));
        let b = fixture(FixtureDef::new(CircleShape::new(0.5)));
        let mut contact = Contact::default();
        contact.init(
            ContactKind::ChainCircle,
            FixtureHandle::default(),
            &a,
            1,
            FixtureHandle::default(),
            &b,
            0,
        );
        let mut pool = WorldPool::new(16, 2);
        let xf_b = Transform::from_translation(Vec2::new(2.0, 0.45));
        contact.update(&a, &b, &Transform::IDENTITY, &xf_b, &mut pool, None);
        assert!(contact.is_touching());
        let wm = contact.world_manifold();
        assert!((wm.normal - Vec2::Y).length() < 1e-4);

        // The same circle over the first segment only touches child 0.
        let xf_b = Transform::from_translation(Vec2::new(-2.0, 0.45));
        contact.update(&a, &b, &Transform::IDENTITY, &xf_b, &mut pool, None);
        assert!(!contact.is_touching());
    }
}
