//! The world owns every body, fixture, joint and contact and steps them.

use glam::Vec2;
use slotmap::SlotMap;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::collision::broadphase::BroadPhase;
use crate::collision::distance::DistanceProxy;
use crate::collision::time_of_impact::{ToiInput, ToiState};
use crate::error::{PhysicsError, PoolError, Result};
use crate::pooling::WorldPool;
use crate::settings::{EPSILON, MAX_SUB_STEPS, MAX_TOI_CONTACTS, MIN_POOL_SIZE};
use crate::shape::{MassData, Shape};

use super::callbacks::{ContactFilter, ContactListener};
use super::contact::Contact;
use super::contact_manager::ContactManager;
use super::fixture::{Filter, Fixture, FixtureDef, FixtureProxyRef};
use super::island::{Island, IslandContext};
use super::joints::{Joint, JointDef, JointKind};
use super::rigid_body::{Body, BodyDef, BodyType, JointEdge};
use super::{BodyHandle, ContactKey, FixtureHandle, JointHandle, PhysicsConfig, TimeStep};

/// Position iterations for time of impact sub-steps.
const TOI_POSITION_ITERATIONS: u32 = 20;

/// A physics world.
///
/// Bodies, fixtures and joints are addressed by generation-checked handles;
/// using a handle after its object was destroyed yields an error instead of
/// touching a recycled slot.
pub struct World {
    config: PhysicsConfig,
    accumulator: f64,

    bodies: SlotMap<BodyHandle, Body>,
    fixtures: SlotMap<FixtureHandle, Fixture>,
    joints: SlotMap<JointHandle, Joint>,
    contact_manager: ContactManager,
    pool: WorldPool,

    island: Island,
    stack: Vec<BodyHandle>,
    seeds: Vec<BodyHandle>,
    keys: Vec<ContactKey>,

    new_fixtures: bool,
    step_complete: bool,
    /// Inverse of the previous step's dt, for the warm starting ratio.
    inv_dt0: f32,
}

impl Default for World {
    fn default() -> Self {
        Self::with_checked_config(PhysicsConfig::default())
    }
}

impl World {
    /// Create a new physics world with the given configuration.
    /// Fails when `config.pool_size` is below [`MIN_POOL_SIZE`], the deepest
    /// scoped checkout a step can make.
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        if config.pool_size < MIN_POOL_SIZE {
            return Err(PoolError::Undersized {
                size: config.pool_size,
                min: MIN_POOL_SIZE,
            }
            .into());
        }
        Ok(Self::with_checked_config(config))
    }

    fn with_checked_config(config: PhysicsConfig) -> Self {
        debug_assert!(config.pool_size >= MIN_POOL_SIZE);
        tracing::info!(gravity = ?config.gravity, "creating physics world");
        let pool = WorldPool::new(config.pool_size, config.pool_container_size);
        Self {
            config,
            accumulator: 0.0,
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contact_manager: ContactManager::new(),
            pool,
            island: Island::default(),
            stack: Vec::new(),
            seeds: Vec::new(),
            keys: Vec::new(),
            new_fixtures: false,
            step_complete: true,
            inv_dt0: 0.0,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    /// Disabling sleep wakes every body.
    pub fn set_allow_sleep(&mut self, flag: bool) {
        if flag == self.config.allow_sleep {
            return;
        }
        self.config.allow_sleep = flag;
        if !flag {
            for body in self.bodies.values_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn set_warm_starting(&mut self, flag: bool) {
        self.config.warm_starting = flag;
    }

    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.config.continuous_physics = flag;
    }

    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.config.sub_stepping = flag;
    }

    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.config.auto_clear_forces = flag;
    }

    /// Install the listener that receives contact events.
    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.contact_manager.listener = Some(listener);
    }

    pub fn clear_contact_listener(&mut self) {
        self.contact_manager.listener = None;
    }

    /// Replace the default group/category/mask filter.
    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_manager.filter = filter;
    }

    // Bodies

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        let handle = self.bodies.insert(Body::new(def));
        tracing::debug!(?handle, body_type = ?def.body_type, "body created");
        handle
    }

    /// Destroy a body with its joints, contacts and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::InvalidBody)?;
        let joint_handles: Vec<JointHandle> = body.joints.iter().map(|edge| edge.joint).collect();
        let contact_keys: Vec<ContactKey> = body.contacts.iter().map(|edge| edge.contact).collect();

        for joint in joint_handles {
            self.destroy_joint(joint)?;
        }

        for key in contact_keys {
            self.contact_manager
                .destroy(key, &mut self.bodies, &mut self.pool.contacts);
        }

        let Some(body) = self.bodies.remove(handle) else {
            return Err(PhysicsError::InvalidBody);
        };
        for fixture_handle in body.fixtures {
            if let Some(mut fixture) = self.fixtures.remove(fixture_handle) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        tracing::debug!(?handle, "body destroyed");
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&Body> {
        self.bodies.get(handle).ok_or(PhysicsError::InvalidBody)
    }

    /// Mutable access for velocities, forces, impulses, damping and sleep.
    /// Changes that touch the broadphase go through the world instead.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        body.set_transform_raw(position, angle);
        let xf = body.xf;
        for &fixture_handle in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.new_fixtures = true;
        Ok(())
    }

    /// Change the body type. Mass is recomputed and existing contacts are
    /// destroyed.
    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        self.reset_mass_data(handle)?;

        let Some(body) = self.bodies.get_mut(handle) else {
            return Err(PhysicsError::InvalidBody);
        };
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        body.set_awake(true);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        let contact_keys: Vec<ContactKey> = body.contacts.iter().map(|edge| edge.contact).collect();
        for key in contact_keys {
            self.contact_manager
                .destroy(key, &mut self.bodies, &mut self.pool.contacts);
        }

        // Touch the proxies so that new contacts will be created.
        if let Some(body) = self.bodies.get(handle) {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get(fixture_handle) {
                    fixture.touch_proxies(&mut self.contact_manager.broad_phase);
                }
            }
        }
        tracing::debug!(?handle, ?body_type, "body type changed");
        Ok(())
    }

    /// An inactive body keeps its fixtures but has no proxies or contacts.
    pub fn set_body_active(&mut self, handle: BodyHandle, flag: bool) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.active == flag {
            return Ok(());
        }
        body.active = flag;

        if flag {
            let xf = body.xf;
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    let broad_phase = &mut self.contact_manager.broad_phase;
                    fixture.create_proxies(fixture_handle, broad_phase, &xf);
                }
            }
            // Contacts are created on the next step.
            self.new_fixtures = true;
        } else {
            for &fixture_handle in &body.fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            let contact_keys: Vec<ContactKey> =
                body.contacts.iter().map(|edge| edge.contact).collect();
            for key in contact_keys {
                self.contact_manager
                    .destroy(key, &mut self.bodies, &mut self.pool.contacts);
            }
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, flag: bool) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        if body.fixed_rotation == flag {
            return Ok(());
        }
        body.fixed_rotation = flag;
        body.angular_velocity = 0.0;
        self.reset_mass_data(handle)
    }

    /// Recompute mass, center of mass and inertia from the fixtures.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        let mut total = MassData::default();
        for &fixture_handle in &body.fixtures {
            let Some(fixture) = self.fixtures.get(fixture_handle) else {
                continue;
            };
            if fixture.density == 0.0 {
                continue;
            }
            let data = fixture.mass_data();
            total.mass += data.mass;
            total.center += data.center * data.mass;
            total.inertia += data.inertia;
        }
        if total.mass > 0.0 {
            total.center /= total.mass;
        }
        body.apply_mass_data(&total);
        Ok(())
    }

    /// Override the mass properties. `inertia` is about the body origin.
    /// Ignored for non-dynamic bodies.
    pub fn set_mass_data(&mut self, handle: BodyHandle, data: &MassData) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody)?;
        body.apply_mass_data(data);
        Ok(())
    }

    // Fixtures

    /// Attach a fixture. A positive density updates the body's mass.
    pub fn create_fixture(
        &mut self,
        body_handle: BodyHandle,
        def: &FixtureDef,
    ) -> Result<FixtureHandle> {
        let body = self
            .bodies
            .get_mut(body_handle)
            .ok_or(PhysicsError::InvalidBody)?;

        let handle = self.fixtures.insert(Fixture::new(body_handle, def));
        body.fixtures.push(handle);

        if body.active {
            let xf = body.xf;
            if let Some(fixture) = self.fixtures.get_mut(handle) {
                fixture.create_proxies(handle, &mut self.contact_manager.broad_phase, &xf);
            }
        }

        if def.density > 0.0 {
            self.reset_mass_data(body_handle)?;
        }

        // Let the world know we have a new fixture. This will cause new
        // contacts to be created at the beginning of the next step.
        self.new_fixtures = true;

        tracing::debug!(?handle, shape = ?def.shape.shape_type(), "fixture created");
        Ok(handle)
    }

    /// Detach and destroy a fixture along with its contacts.
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<()> {
        let mut fixture = self
            .fixtures
            .remove(handle)
            .ok_or(PhysicsError::InvalidFixture)?;
        let body_handle = fixture.body;

        if let Some(body) = self.bodies.get_mut(body_handle) {
            body.fixtures.retain(|&f| f != handle);
            let contacts = &self.contact_manager.contacts;
            let contact_keys: Vec<ContactKey> = body
                .contacts
                .iter()
                .map(|edge| edge.contact)
                .filter(|&key| {
                    contacts
                        .get(key)
                        .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle)
                })
                .collect();
            for key in contact_keys {
                self.contact_manager
                    .destroy(key, &mut self.bodies, &mut self.pool.contacts);
            }
        }

        fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        tracing::debug!(?handle, "fixture destroyed");

        self.reset_mass_data(body_handle)
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Result<&Fixture> {
        self.fixtures.get(handle).ok_or(PhysicsError::InvalidFixture)
    }

    /// Mutable access for friction, restitution, density and user data.
    /// Call [`World::reset_mass_data`] after changing the density.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Result<&mut Fixture> {
        self.fixtures.get_mut(handle).ok_or(PhysicsError::InvalidFixture)
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Change the collision filter. Contacts of this fixture are re-filtered
    /// on the next step.
    pub fn set_filter_data(&mut self, handle: FixtureHandle, filter: Filter) -> Result<()> {
        let fixture = self
            .fixtures
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidFixture)?;
        fixture.filter = filter;

        if let Some(body) = self.bodies.get(fixture.body) {
            for edge in &body.contacts {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    if contact.fixture_a == handle || contact.fixture_b == handle {
                        contact.flag_for_filtering();
                    }
                }
            }
        }

        // Touch each proxy so that new pairs may be created.
        fixture.touch_proxies(&mut self.contact_manager.broad_phase);
        Ok(())
    }

    /// Sensors detect overlap but produce no collision response.
    pub fn set_sensor(&mut self, handle: FixtureHandle, flag: bool) -> Result<()> {
        let fixture = self
            .fixtures
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidFixture)?;
        if fixture.is_sensor != flag {
            fixture.is_sensor = flag;
            if let Some(body) = self.bodies.get_mut(fixture.body) {
                body.set_awake(true);
            }
        }
        Ok(())
    }

    /// World-space outline of a fixture: polygon and chain vertices, edge
    /// end points or a circle's center. The slice is reused by the next call
    /// with the same vertex count.
    pub fn world_vertices(&mut self, handle: FixtureHandle) -> Result<&[Vec2]> {
        let fixture = self.fixtures.get(handle).ok_or(PhysicsError::InvalidFixture)?;
        let body = self
            .bodies
            .get(fixture.body)
            .ok_or(PhysicsError::InvalidBody)?;
        let xf = body.xf;

        let out = self.pool.vec2_arrays.get(fixture.shape.vertex_count());
        match &fixture.shape {
            Shape::Circle(circle) => out[0] = xf.apply(circle.center),
            Shape::Edge(edge) => {
                out[0] = xf.apply(edge.vertex1);
                out[1] = xf.apply(edge.vertex2);
            }
            Shape::Polygon(polygon) => {
                for (dst, &v) in out.iter_mut().zip(polygon.vertices()) {
                    *dst = xf.apply(v);
                }
            }
            Shape::Chain(chain) => {
                for (dst, &v) in out.iter_mut().zip(chain.vertices()) {
                    *dst = xf.apply(v);
                }
            }
        }
        Ok(out)
    }

    // Joints

    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> Result<JointHandle> {
        let def = def.into();
        let handle_a = def.body_a();
        let handle_b = def.body_b();
        if handle_a == handle_b {
            return Err(PhysicsError::SelfJoint);
        }
        if !self.bodies.contains_key(handle_a) {
            return Err(PhysicsError::InvalidBody);
        }
        let xf_b = self.bodies.get(handle_b).ok_or(PhysicsError::InvalidBody)?.xf;

        let handle = self.joints.insert(Joint::new(&def, &xf_b));

        // Connect to the bodies' joint lists.
        for (body, other) in [(handle_a, handle_b), (handle_b, handle_a)] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joints.push(JointEdge {
                    joint: handle,
                    other,
                });
            }
        }

        // If the joint prevents collisions, then flag any contacts for filtering.
        if !def.collide_connected() {
            self.flag_contacts_between(handle_a, handle_b);
        }

        tracing::debug!(?handle, "joint created");
        Ok(handle)
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        let joint = self.joints.remove(handle).ok_or(PhysicsError::InvalidJoint)?;

        for body in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joints.retain(|edge| edge.joint != handle);
                body.set_awake(true);
            }
        }

        // If the joint prevented collisions, then flag any contacts for filtering.
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }

        tracing::debug!(?handle, "joint destroyed");
        Ok(())
    }

    pub fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints.get(handle).ok_or(PhysicsError::InvalidJoint)
    }

    /// Mutable access to a joint. Both bodies are woken so the change takes
    /// effect immediately.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut Joint> {
        let joint = self
            .joints
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidJoint)?;
        for body in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.set_awake(true);
            }
        }
        Ok(joint)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Move a mouse joint's target and wake the dragged body.
    pub fn set_mouse_target(&mut self, handle: JointHandle, target: Vec2) -> Result<()> {
        let joint = self
            .joints
            .get_mut(handle)
            .ok_or(PhysicsError::InvalidJoint)?;
        let JointKind::Mouse(mouse) = &mut joint.kind else {
            return Err(PhysicsError::InvalidJoint);
        };
        mouse.set_target(target);
        if let Some(body) = self.bodies.get_mut(joint.body_b) {
            body.set_awake(true);
        }
        Ok(())
    }

    fn flag_contacts_between(&mut self, handle_a: BodyHandle, handle_b: BodyHandle) {
        let Some(body_b) = self.bodies.get(handle_b) else {
            return;
        };
        for edge in &body_b.contacts {
            if edge.other == handle_a {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    contact.flag_for_filtering();
                }
            }
        }
    }

    // Contacts

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contact_manager.contacts()
    }

    /// Contacts (touching or not) the body takes part in.
    pub fn body_contacts(&self, handle: BodyHandle) -> Result<impl Iterator<Item = &Contact>> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::InvalidBody)?;
        let contacts = &self.contact_manager.contacts;
        Ok(body
            .contacts
            .iter()
            .filter_map(move |edge| contacts.get(edge.contact)))
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    /// Sum of tree node perimeters over the root perimeter.
    pub fn tree_quality(&self) -> f32 {
        self.contact_manager.broad_phase.tree_quality()
    }

    pub fn pool(&self) -> &WorldPool {
        &self.pool
    }

    // Queries

    /// Report every fixture whose fat AABB overlaps `aabb`. Return false
    /// from the callback to stop.
    pub fn query_aabb<F: FnMut(FixtureHandle) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy_id| match broad_phase.user_data(proxy_id) {
            Some(proxy) => callback(proxy.fixture),
            None => true,
        });
    }

    /// Cast a ray from `p1` to `p2`. The callback receives the fixture, hit
    /// point, normal and fraction and returns how to continue: -1 ignores
    /// the fixture, 0 terminates, `fraction` clips the ray to this hit and 1
    /// continues unclipped.
    pub fn raycast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(FixtureHandle, Vec2, Vec2, f32) -> f32,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        let input = RayCastInput::new(p1, p2);
        broad_phase.raycast(&input, |sub_input, proxy_id| {
            let Some(proxy) = broad_phase.user_data(proxy_id) else {
                return sub_input.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(proxy.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.raycast(sub_input, &body.xf, proxy.child_index) {
                Some(output) => {
                    let fraction = output.fraction;
                    let point = p1 * (1.0 - fraction) + p2 * fraction;
                    callback(proxy.fixture, point, output.normal, fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    /// First fixture whose shape contains the world point.
    pub fn test_point(&self, point: Vec2) -> Option<FixtureHandle> {
        let aabb = Aabb::new(point - Vec2::splat(0.001), point + Vec2::splat(0.001));
        let mut found = None;
        self.query_aabb(&aabb, |handle| {
            let hit = self.fixtures.get(handle).is_some_and(|fixture| {
                self.bodies
                    .get(fixture.body)
                    .is_some_and(|body| fixture.test_point(&body.xf, point))
            });
            if hit {
                found = Some(handle);
            }
            !hit
        });
        found
    }

    // Stepping

    /// Step the simulation forward by `delta_time` seconds.
    ///
    /// Uses a fixed timestep accumulator to ensure deterministic simulation.
    /// Returns the number of fixed steps taken.
    pub fn step(&mut self, delta_time: f64) -> u32 {
        self.accumulator += delta_time;

        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps
        {
            self.step_fixed(self.config.fixed_timestep as f32);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            tracing::debug!(accumulator = self.accumulator, "dropping simulation backlog");
            self.accumulator = 0.0;
        }
        substeps
    }

    /// Advance by exactly `dt` seconds: collide, solve, continuous collision.
    pub fn step_fixed(&mut self, dt: f32) {
        // If new fixtures were added, we need to find the new contacts.
        if self.new_fixtures {
            self.contact_manager.find_new_contacts(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                &mut self.pool.contacts,
            );
            self.new_fixtures = false;
        }

        let step = TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations: self.config.velocity_iterations,
            position_iterations: self.config.position_iterations,
            warm_starting: self.config.warm_starting,
        };

        // Update contacts. This is where some contacts are destroyed.
        self.contact_manager
            .collide(&mut self.bodies, &self.fixtures, &self.joints, &mut self.pool);

        // Integrate velocities, solve velocity constraints, and integrate positions.
        if self.step_complete && step.dt > 0.0 {
            self.solve(&step);
        }

        // Handle TOI events.
        if self.config.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step);
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.config.auto_clear_forces {
            self.clear_forces();
        }

        debug_assert!(self.pool.is_balanced());
    }

    /// Zero the force and torque accumulators of every body.
    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    fn solve(&mut self, step: &TimeStep) {
        let Self {
            config,
            bodies,
            fixtures,
            joints,
            contact_manager,
            pool,
            island,
            stack,
            seeds,
            ..
        } = self;

        // Update previous transforms and clear all the island flags.
        for body in bodies.values_mut() {
            body.xf0 = body.xf;
            body.island_flag = false;
        }
        for contact in contact_manager.contacts.values_mut() {
            contact.flags.island = false;
        }
        for joint in joints.values_mut() {
            joint.island_flag = false;
        }

        // Build and simulate all awake islands.
        seeds.clear();
        seeds.extend(bodies.keys());
        for &seed in seeds.iter() {
            let Some(body) = bodies.get_mut(seed) else {
                continue;
            };
            if body.island_flag || !body.awake || !body.active {
                continue;
            }
            // The seed can be dynamic or kinematic.
            if body.body_type == BodyType::Static {
                continue;
            }

            island.clear();
            stack.clear();
            stack.push(seed);
            body.island_flag = true;

            // Perform a depth first search on the constraint graph.
            while let Some(handle) = stack.pop() {
                let Some(body) = bodies.get_mut(handle) else {
                    continue;
                };
                debug_assert!(body.active);
                island.add_body(handle, body);

                // Make sure the body is awake.
                body.set_awake(true);

                // Islands don't propagate across static bodies.
                if body.body_type == BodyType::Static {
                    continue;
                }

                for i in 0..body_contact_len(bodies, handle) {
                    let Some(edge) = bodies.get(handle).and_then(|b| b.contacts.get(i).copied())
                    else {
                        break;
                    };
                    let Some(contact) = contact_manager.contacts.get_mut(edge.contact) else {
                        continue;
                    };

                    // Has this contact already been added to an island?
                    if contact.flags.island {
                        continue;
                    }

                    // Is this contact solid and touching?
                    if !contact.flags.enabled || !contact.flags.touching {
                        continue;
                    }

                    // Skip sensors.
                    if is_sensor_pair(fixtures, contact) {
                        continue;
                    }

                    island.add_contact(edge.contact);
                    contact.flags.island = true;

                    let Some(other) = bodies.get_mut(edge.other) else {
                        continue;
                    };
                    if other.island_flag {
                        continue;
                    }
                    stack.push(edge.other);
                    other.island_flag = true;
                }

                for i in 0..body_joint_len(bodies, handle) {
                    let Some(edge) = bodies.get(handle).and_then(|b| b.joints.get(i).copied())
                    else {
                        break;
                    };
                    let Some(joint) = joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if joint.island_flag {
                        continue;
                    }

                    // Don't simulate joints connected to inactive bodies.
                    let Some(other) = bodies.get_mut(edge.other) else {
                        continue;
                    };
                    if !other.active {
                        continue;
                    }

                    island.add_joint(edge.joint);
                    joint.island_flag = true;

                    if other.island_flag {
                        continue;
                    }
                    stack.push(edge.other);
                    other.island_flag = true;
                }
            }

            let mut ctx = IslandContext {
                bodies: &mut *bodies,
                contacts: &mut contact_manager.contacts,
                joints: &mut *joints,
                pool: &mut *pool,
                listener: contact_manager.listener.as_deref_mut(),
            };
            island.solve(step, config, &mut ctx);

            // Allow static bodies to participate in other islands.
            for &handle in &island.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    if body.body_type == BodyType::Static {
                        body.island_flag = false;
                    }
                }
            }
        }

        // Synchronize fixtures. A body that was not in an island did not move.
        for body in bodies.values() {
            if !body.island_flag || body.body_type == BodyType::Static {
                continue;
            }
            synchronize_fixtures(body, fixtures, &mut contact_manager.broad_phase);
        }

        // Look for new contacts.
        contact_manager.find_new_contacts(bodies, fixtures, joints, &mut pool.contacts);
    }

    /// Find time of impact events and resolve them one sub-step at a time,
    /// earliest first.
    fn solve_toi(&mut self, step: &TimeStep) {
        let Self {
            config,
            bodies,
            fixtures,
            joints,
            contact_manager,
            pool,
            island,
            keys,
            step_complete,
            ..
        } = self;

        if *step_complete {
            for body in bodies.values_mut() {
                body.island_flag = false;
                body.sweep.alpha0 = 0.0;
            }
            for contact in contact_manager.contacts.values_mut() {
                // Invalidate TOI
                contact.flags.toi = false;
                contact.flags.island = false;
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        loop {
            // Find the first TOI.
            let mut min_contact = None;
            let mut min_alpha = 1.0f32;

            for (key, contact) in contact_manager.contacts.iter_mut() {
                // Is this contact disabled?
                if !contact.flags.enabled {
                    continue;
                }

                // Prevent excessive sub-stepping.
                if contact.toi_count > MAX_SUB_STEPS {
                    continue;
                }

                let alpha = if contact.flags.toi {
                    // This contact has a valid cached TOI.
                    contact.toi
                } else {
                    let (Some(fixture_a), Some(fixture_b)) =
                        (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
                    else {
                        continue;
                    };

                    // Is there a sensor?
                    if fixture_a.is_sensor || fixture_b.is_sensor {
                        continue;
                    }

                    let Some([body_a, body_b]) =
                        bodies.get_disjoint_mut([contact.body_a, contact.body_b])
                    else {
                        continue;
                    };
                    debug_assert!(
                        body_a.body_type == BodyType::Dynamic
                            || body_b.body_type == BodyType::Dynamic
                    );

                    // Is at least one body active (awake and dynamic or kinematic)?
                    let active_a = body_a.awake && body_a.body_type != BodyType::Static;
                    let active_b = body_b.awake && body_b.body_type != BodyType::Static;
                    if !active_a && !active_b {
                        continue;
                    }

                    // Are these two non-bullet dynamic bodies?
                    let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
                    let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;
                    if !collide_a && !collide_b {
                        continue;
                    }

                    // Put the sweeps onto the same time interval.
                    let mut alpha0 = body_a.sweep.alpha0;
                    if body_a.sweep.alpha0 < body_b.sweep.alpha0 {
                        alpha0 = body_b.sweep.alpha0;
                        body_a.sweep.advance(alpha0);
                    } else if body_b.sweep.alpha0 < body_a.sweep.alpha0 {
                        alpha0 = body_a.sweep.alpha0;
                        body_b.sweep.advance(alpha0);
                    }
                    debug_assert!(alpha0 < 1.0);

                    // Compute the time of impact in interval [0, min_toi].
                    let input = ToiInput {
                        proxy_a: DistanceProxy::new(&fixture_a.shape, contact.child_index_a),
                        proxy_b: DistanceProxy::new(&fixture_b.shape, contact.child_index_b),
                        sweep_a: body_a.sweep,
                        sweep_b: body_b.sweep,
                        t_max: 1.0,
                    };
                    let output = pool.toi.compute(&mut pool.distance, &input);

                    // Beta is the fraction of the remaining portion of the step.
                    let alpha = if output.state == ToiState::Touching {
                        (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                    } else {
                        1.0
                    };

                    contact.toi = alpha;
                    contact.flags.toi = true;
                    alpha
                };

                if alpha < min_alpha {
                    // This is the minimum TOI found so far.
                    min_contact = Some(key);
                    min_alpha = alpha;
                }
            }

            let Some(min_key) = min_contact.filter(|_| min_alpha < 1.0 - 10.0 * EPSILON) else {
                // No more TOI events. Done!
                *step_complete = true;
                break;
            };

            // Advance the bodies to the TOI.
            let Some(contact) = contact_manager.contacts.get(min_key) else {
                break;
            };
            let handle_a = contact.body_a;
            let handle_b = contact.body_b;
            let Some([body_a, body_b]) = bodies.get_disjoint_mut([handle_a, handle_b]) else {
                break;
            };
            let backup_a = body_a.sweep;
            let backup_b = body_b.sweep;
            body_a.advance(min_alpha);
            body_b.advance(min_alpha);

            // The TOI contact likely has some new contact points.
            contact_manager.update_contact(min_key, bodies, fixtures, pool);
            let Some(contact) = contact_manager.contacts.get_mut(min_key) else {
                break;
            };
            contact.flags.toi = false;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.flags.enabled || !contact.flags.touching {
                // Restore the sweeps.
                contact.set_enabled(false);
                if let Some([body_a, body_b]) = bodies.get_disjoint_mut([handle_a, handle_b]) {
                    body_a.sweep = backup_a;
                    body_b.sweep = backup_b;
                    body_a.synchronize_transform();
                    body_b.synchronize_transform();
                }
                continue;
            }
            contact.flags.island = true;

            // Build the island
            island.clear();
            for handle in [handle_a, handle_b] {
                if let Some(body) = bodies.get_mut(handle) {
                    body.set_awake(true);
                    body.island_flag = true;
                    island.add_body(handle, body);
                }
            }
            island.add_contact(min_key);

            // Get contacts on body A and body B.
            for handle in [handle_a, handle_b] {
                let Some(body) = bodies.get(handle) else {
                    continue;
                };
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                let bullet = body.bullet;
                keys.clear();
                keys.extend(body.contacts.iter().map(|edge| edge.contact));

                for &key in keys.iter() {
                    if island.body_count() == 2 * MAX_TOI_CONTACTS
                        || island.contacts.len() == MAX_TOI_CONTACTS
                    {
                        break;
                    }

                    let Some(contact) = contact_manager.contacts.get(key) else {
                        continue;
                    };

                    // Has this contact already been added to the island?
                    if contact.flags.island {
                        continue;
                    }

                    // Skip sensors.
                    if is_sensor_pair(fixtures, contact) {
                        continue;
                    }

                    let other_handle = if contact.body_a == handle {
                        contact.body_b
                    } else {
                        contact.body_a
                    };
                    let Some(other) = bodies.get_mut(other_handle) else {
                        continue;
                    };

                    // Only add static, kinematic, or bullet bodies.
                    if other.body_type == BodyType::Dynamic && !bullet && !other.bullet {
                        continue;
                    }

                    // Tentatively advance the body to the TOI.
                    let backup = other.sweep;
                    if !other.island_flag {
                        other.advance(min_alpha);
                    }

                    // Update the contact points
                    contact_manager.update_contact(key, bodies, fixtures, pool);

                    let Some(contact) = contact_manager.contacts.get_mut(key) else {
                        continue;
                    };
                    let Some(other) = bodies.get_mut(other_handle) else {
                        continue;
                    };

                    // Was the contact disabled by the user? Are there contact points?
                    if !contact.flags.enabled || !contact.flags.touching {
                        other.sweep = backup;
                        other.synchronize_transform();
                        continue;
                    }

                    // Add the contact to the island
                    contact.flags.island = true;
                    island.add_contact(key);

                    // Has the other body already been added to the island?
                    if other.island_flag {
                        continue;
                    }

                    // Add the other body to the island.
                    other.island_flag = true;
                    if other.body_type != BodyType::Static {
                        other.set_awake(true);
                    }
                    island.add_body(other_handle, other);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };
            let toi_index_a = bodies.get(handle_a).map_or(0, |b| b.island_index);
            let toi_index_b = bodies.get(handle_b).map_or(1, |b| b.island_index);

            let mut ctx = IslandContext {
                bodies: &mut *bodies,
                contacts: &mut contact_manager.contacts,
                joints: &mut *joints,
                pool: &mut *pool,
                listener: contact_manager.listener.as_deref_mut(),
            };
            island.solve_toi(&sub_step, config, toi_index_a, toi_index_b, &mut ctx);

            // Reset island flags and synchronize broad-phase proxies.
            for &handle in &island.bodies {
                let Some(body) = bodies.get_mut(handle) else {
                    continue;
                };
                body.island_flag = false;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                synchronize_fixtures(body, fixtures, &mut contact_manager.broad_phase);

                // Invalidate all contact TOIs on this displaced body.
                for edge in &body.contacts {
                    if let Some(contact) = contact_manager.contacts.get_mut(edge.contact) {
                        contact.flags.toi = false;
                        contact.flags.island = false;
                    }
                }
            }

            // Commit fixture proxy movements to the broad-phase so that new
            // contacts are created. Also, some contacts can be destroyed.
            contact_manager.find_new_contacts(bodies, fixtures, joints, &mut pool.contacts);

            if config.sub_stepping {
                *step_complete = false;
                break;
            }
        }
    }
}

/// Move a body's proxies to cover its motion over the last step.
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut SlotMap<FixtureHandle, Fixture>,
    broad_phase: &mut BroadPhase<FixtureProxyRef>,
) {
    let xf1 = body.sweep_start_transform();
    for &handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle) {
            fixture.synchronize(broad_phase, &xf1, &body.xf);
        }
    }
}

fn is_sensor_pair(fixtures: &SlotMap<FixtureHandle, Fixture>, contact: &Contact) -> bool {
    let sensor = |handle| fixtures.get(handle).is_some_and(|f: &Fixture| f.is_sensor);
    sensor(contact.fixture_a) || sensor(contact.fixture_b)
}

fn body_contact_len(bodies: &SlotMap<BodyHandle, Body>, handle: BodyHandle) -> usize {
    bodies.get(handle).map_or(0, |body| body.contacts.len())
}

fn body_joint_len(bodies: &SlotMap<BodyHandle, Body>, handle: BodyHandle) -> usize {
    bodies.get(handle).map_or(0, |body| body.joints.len())
}
