//! Rigid bodies.

use glam::Vec2;

use crate::math::{cross, cross_sv, Rot, Sweep, Transform};
use crate::shape::MassData;

use super::{BodyHandle, ContactKey, FixtureHandle, JointHandle};

/// Rigid body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Immovable. Zero mass, zero velocity.
    #[default]
    Static,
    /// Moved by its velocity only. Zero mass.
    Kinematic,
    /// Affected by forces and collisions.
    Dynamic,
}

/// Parameters for [`crate::dynamics::World::create_body`].
#[derive(Debug, Clone, Copy)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Vec2,
    /// World angle in radians.
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Continuous collision against other dynamic bodies.
    pub bullet: bool,
    pub active: bool,
    pub gravity_scale: f32,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn dynamic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Default::default()
        }
    }

    pub fn kinematic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Default::default()
        }
    }

    pub fn fixed(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// A contact this body takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContactEdge {
    pub contact: ContactKey,
    pub other: BodyHandle,
}

/// A joint attached to this body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JointEdge {
    pub joint: JointHandle,
    pub other: BodyHandle,
}

/// A rigid body. Created and owned by a [`crate::dynamics::World`].
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,

    pub(crate) island_flag: bool,
    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) active: bool,

    pub(crate) island_index: usize,

    /// Body origin transform.
    pub(crate) xf: Transform,
    /// Transform at the start of the step, for interpolation.
    pub(crate) xf0: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contacts: Vec<ContactEdge>,
    pub(crate) joints: Vec<JointEdge>,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };

        Self {
            body_type: def.body_type,
            island_flag: false,
            awake: def.awake,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            active: def.active,
            island_index: 0,
            xf,
            xf0: xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            fixtures: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Body origin transform.
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// Body origin transform at the start of the last step.
    pub fn previous_transform(&self) -> &Transform {
        &self.xf0
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at a world point. Wakes the body.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Apply an impulse at a world point. Sleeping bodies are only affected
    /// when `wake` is set.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if !self.awake {
            if !wake {
                return;
            }
            self.set_awake(true);
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * cross(point - self.sweep.c, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inv(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.apply_inv(world_vector)
    }

    /// Velocity of a point attached to this body, given in world coordinates.
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Putting a body to sleep clears its velocity and forces.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    /// Bodies connected to this one by a joint.
    pub fn joint_partners(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.joints.iter().map(|edge| edge.other)
    }

    /// Number of contacts (touching or not) this body takes part in.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// At least one of the two bodies must be dynamic.
    pub(crate) fn can_collide_with(&self, other: &Body) -> bool {
        self.body_type == BodyType::Dynamic || other.body_type == BodyType::Dynamic
    }

    /// Origin transform from the sweep's end state.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Origin transform at the start of the sweep.
    pub(crate) fn sweep_start_transform(&self) -> Transform {
        let q = Rot::from_angle(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.apply(self.sweep.local_center),
            q,
        }
    }

    /// Move the body to `alpha` within the current step, without
    /// re-synchronizing its fixtures.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Install mass properties computed from the fixtures.
    pub(crate) fn apply_mass_data(&mut self, data: &MassData) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;

        if self.body_type != BodyType::Dynamic {
            self.sweep.local_center = Vec2::ZERO;
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        self.mass = data.mass;
        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
        } else {
            // Dynamic bodies always have positive mass.
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if data.inertia > 0.0 && !self.fixed_rotation {
            self.inertia = data.inertia - self.mass * data.center.length_squared();
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        }

        // Move the center of mass and keep the velocity of the old center.
        let old_center = self.sweep.c;
        self.sweep.local_center = data.center;
        self.sweep.c = self.xf.apply(data.center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }

    pub(crate) fn set_transform_raw(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn dynamic_body() -> Body {
        Body::new(&BodyDef::dynamic(Vec2::new(1.0, 2.0)))
    }

    #[test]
    fn test_new_dynamic_body_has_unit_mass() {
        let body = dynamic_body();
        assert_eq!(body.mass(), 1.0);
        assert_eq!(body.world_center(), Vec2::new(1.0, 2.0));

        let fixed = Body::new(&BodyDef::fixed(Vec2::ZERO));
        assert_eq!(fixed.mass(), 0.0);
    }

    #[test]
    fn test_sleep_clears_motion() {
        let mut body = dynamic_body();
        body.set_linear_velocity(Vec2::new(3.0, 0.0));
        body.apply_torque(2.0);
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.torque, 0.0);

        // Impulses do not wake a sleeping body unless asked to.
        body.apply_linear_impulse(Vec2::X, body.world_center(), false);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        body.apply_linear_impulse(Vec2::X, body.world_center(), true);
        assert!(body.is_awake());
        assert!((body.linear_velocity().x - 1.0).abs() < EPS);
    }

    #[test]
    fn test_static_body_ignores_velocity() {
        let mut body = Body::new(&BodyDef::default());
        body.set_linear_velocity(Vec2::ONE);
        body.apply_force_to_center(Vec2::ONE);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.force, Vec2::ZERO);
    }

    #[test]
    fn test_mass_data_shifts_center() {
        let mut body = dynamic_body();
        body.apply_mass_data(&MassData {
            mass: 2.0,
            center: Vec2::new(0.5, 0.0),
            inertia: 2.0 * 0.25 + 1.0,
        });
        assert_eq!(body.mass(), 2.0);
        assert!((body.world_center() - Vec2::new(1.5, 2.0)).length() < EPS);
        assert!((body.inertia - 1.0).abs() < EPS);
        assert!((body.inertia() - 1.5).abs() < EPS);
    }

    #[test]
    fn test_point_conversions() {
        let mut body = dynamic_body();
        body.set_transform_raw(Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2);
        let world = body.world_point(Vec2::new(1.0, 0.0));
        assert!((world - Vec2::new(1.0, 1.0)).length() < EPS);
        assert!((body.local_point(world) - Vec2::new(1.0, 0.0)).length() < EPS);
        assert!((body.world_vector(Vec2::X) - Vec2::Y).length() < EPS);
    }

    #[test]
    fn test_advance_moves_to_sweep_time() {
        let mut body = dynamic_body();
        body.sweep.c0 = Vec2::ZERO;
        body.sweep.c = Vec2::new(10.0, 0.0);
        body.advance(0.5);
        assert!((body.position() - Vec2::new(5.0, 0.0)).length() < EPS);
        assert_eq!(body.sweep.alpha0, 0.5);
    }
}
