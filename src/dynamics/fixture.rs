//! Fixtures attach shapes to bodies.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::collision::broadphase::{BroadPhase, ProxyId};
use crate::math::Transform;
use crate::shape::{MassData, Shape, ShapeType};

use super::{BodyHandle, FixtureHandle};

/// Collision filtering data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Category bits of this fixture.
    pub category_bits: u16,
    /// Categories this fixture collides with.
    pub mask_bits: u16,
    /// Fixtures sharing a nonzero group always collide (positive) or never
    /// collide (negative), regardless of the bits.
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

/// Parameters for [`crate::dynamics::World::create_fixture`].
#[derive(Debug, Clone)]
pub struct FixtureDef {
    pub shape: Shape,
    pub friction: f32,
    pub restitution: f32,
    /// Mass per unit area.
    pub density: f32,
    /// Sensors detect overlap but produce no collision response.
    pub is_sensor: bool,
    pub filter: Filter,
    /// Opaque handle for game code.
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            friction: 0.2,
            restitution: 0.0,
            density: 0.0,
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// What the broadphase stores for each proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureProxyRef {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FixtureProxy {
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: ProxyId,
}

/// A shape attached to a body, with material and filtering data.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::with_capacity(def.shape.child_count()),
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    /// Takes effect once the body's mass data is reset.
    pub fn set_density(&mut self, density: f32) {
        debug_assert!(density.is_finite() && density >= 0.0);
        self.density = density;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Existing contacts keep their mixed friction until reset.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Existing contacts keep their mixed restitution until reset.
    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// Is the world point inside the shape? `xf` is the body transform.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn raycast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.shape.raycast(input, xf, child_index)
    }

    /// Distance from a world point to the shape boundary and the direction
    /// pointing away from the shape.
    pub fn distance_to(&self, xf: &Transform, p: Vec2, child_index: usize) -> (f32, Vec2) {
        self.shape.compute_distance_to_out(xf, p, child_index)
    }

    /// Fat AABB of a child as last synchronized, if the fixture has proxies.
    pub fn aabb(&self, child_index: usize) -> Option<Aabb> {
        self.proxies
            .iter()
            .find(|proxy| proxy.child_index == child_index)
            .map(|proxy| proxy.aabb)
    }

    pub(crate) fn proxy_id(&self, child_index: usize) -> Option<ProxyId> {
        self.proxies
            .iter()
            .find(|proxy| proxy.child_index == child_index)
            .map(|proxy| proxy.proxy_id)
    }

    pub(crate) fn create_proxies(
        &mut self,
        handle: FixtureHandle,
        broad_phase: &mut BroadPhase<FixtureProxyRef>,
        xf: &Transform,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(
                aabb,
                FixtureProxyRef {
                    fixture: handle,
                    child_index,
                },
            );
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<FixtureProxyRef>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Move the proxies to cover the swept motion from `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<FixtureProxyRef>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        let displacement = xf2.p - xf1.p;
        for proxy in &mut self.proxies {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = Aabb::combine(&aabb1, &aabb2);
            broad_phase.move_proxy(proxy.proxy_id, proxy.aabb, displacement);
        }
    }

    /// Re-check this fixture's pairs on the next broadphase update.
    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<FixtureProxyRef>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{ChainShape, CircleShape, PolygonShape};

    #[test]
    fn test_fixture_def_builders() {
        let def = FixtureDef::new(CircleShape::new(0.5))
            .with_density(2.0)
            .with_friction(0.6)
            .sensor()
            .with_user_data(7);
        assert_eq!(def.density, 2.0);
        assert_eq!(def.friction, 0.6);
        assert!(def.is_sensor);
        assert_eq!(def.user_data, 7);
        assert_eq!(def.filter, Filter::default());
    }

    #[test]
    fn test_chain_fixture_has_proxy_per_edge() {
        let chain = ChainShape::new_chain(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(3.0, 1.0),
        ])
        .unwrap();
        let mut fixture = Fixture::new(BodyHandle::default(), &FixtureDef::new(chain));
        let mut bp = BroadPhase::new();
        fixture.create_proxies(FixtureHandle::default(), &mut bp, &Transform::IDENTITY);
        assert_eq!(fixture.proxies.len(), 3);
        assert_eq!(bp.proxy_count(), 3);
        assert!(fixture.aabb(2).is_some());
        assert!(fixture.aabb(3).is_none());

        fixture.destroy_proxies(&mut bp);
        assert_eq!(bp.proxy_count(), 0);
        assert!(fixture.proxies.is_empty());
    }

    #[test]
    fn test_synchronize_covers_swept_motion() {
        let def = FixtureDef::new(PolygonShape::new_box(0.5, 0.5));
        let mut fixture = Fixture::new(BodyHandle::default(), &def);
        let mut bp = BroadPhase::new();
        let xf1 = Transform::IDENTITY;
        fixture.create_proxies(FixtureHandle::default(), &mut bp, &xf1);

        let xf2 = Transform::from_translation(Vec2::new(3.0, 0.0));
        fixture.synchronize(&mut bp, &xf1, &xf2);

        let swept = fixture.aabb(0).unwrap();
        assert!(swept.contains_point(Vec2::new(-0.5, 0.0)));
        assert!(swept.contains_point(Vec2::new(3.5, 0.0)));
        let fat = bp.fat_aabb(fixture.proxies[0].proxy_id);
        assert!(fat.contains(&swept));
    }
}
