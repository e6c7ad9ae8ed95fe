//! Hooks for game code: contact events and collision filtering.
//!
//! Callbacks only see contact data, never the world. Bodies and fixtures
//! cannot be created or destroyed from inside a callback; queue such
//! requests and apply them after [`crate::dynamics::World::step`].

use crate::collision::manifold::Manifold;
use crate::settings::MAX_MANIFOLD_POINTS;

use super::contact::Contact;
use super::fixture::Fixture;

/// Impulses the solver applied to a contact, for damage or sound feedback.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Receives contact events. Every method defaults to a no-op.
pub trait ContactListener {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching. Also called when a touching contact is
    /// destroyed.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called after the manifold is updated and before solving, for every
    /// touching solid contact. `old_manifold` is the previous step's
    /// manifold. The contact may be disabled for this step.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Called after solving with the impulses actually applied, for
    /// touching, solid, awake contacts.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Decides whether two fixtures may collide. Evaluated when a pair is created
/// and again only after a fixture's filter data changes.
pub trait ContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool;
}

/// Group and category/mask filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        let filter_a = fixture_a.filter();
        let filter_b = fixture_b.filter();

        if filter_a.group_index == filter_b.group_index && filter_a.group_index != 0 {
            return filter_a.group_index > 0;
        }

        (filter_a.mask_bits & filter_b.category_bits) != 0
            && (filter_a.category_bits & filter_b.mask_bits) != 0
    }
}
