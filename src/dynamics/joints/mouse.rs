//! Mouse joint: drags a point on body B toward a world target with a soft
//! spring of bounded force. Body A is only used for bookkeeping.

use std::f32::consts::PI;

use glam::{Mat2, Vec2};

use crate::dynamics::{BodyHandle, SolverData};
use crate::error::PoolError;
use crate::math::{cross, cross_sv, inverse22, Rot, Transform};
use crate::pooling::WorldPool;

use super::SolverBodies;

#[derive(Debug, Clone)]
pub struct MouseJointDef {
    /// Usually a static ground body.
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Initial world target. The anchor on body B is placed here.
    pub target: Vec2,
    /// Maximum constraint force, typically a multiple of the body weight.
    pub max_force: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl MouseJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            target,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MouseJoint {
    local_anchor_b: Vec2,
    target_a: Vec2,
    frequency_hz: f32,
    damping_ratio: f32,
    beta: f32,

    impulse: Vec2,
    max_force: f32,
    gamma: f32,

    r_b: Vec2,
    mass: Mat2,
    c: Vec2,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef, xf_b: &Transform) -> Self {
        debug_assert!(def.target.is_finite());
        debug_assert!(def.max_force >= 0.0);
        debug_assert!(def.frequency_hz >= 0.0);
        debug_assert!(def.damping_ratio >= 0.0);
        Self {
            local_anchor_b: xf_b.apply_inv(def.target),
            target_a: def.target,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            beta: 0.0,
            impulse: Vec2::ZERO,
            max_force: def.max_force,
            gamma: 0.0,
            r_b: Vec2::ZERO,
            mass: Mat2::ZERO,
            c: Vec2::ZERO,
        }
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn target(&self) -> Vec2 {
        self.target_a
    }

    /// Move the target. Use [`crate::dynamics::World::set_mouse_target`] to
    /// also wake the dragged body.
    pub fn set_target(&mut self, target: Vec2) {
        self.target_a = target;
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz;
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f32) {
        self.damping_ratio = ratio;
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.impulse * inv_dt
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        let c_b = data.positions[sb.index_b].c;
        let a_b = data.positions[sb.index_b].a;
        let mut v_b = data.velocities[sb.index_b].v;
        let mut w_b = data.velocities[sb.index_b].w;

        let q_b = Rot::from_angle(a_b);
        let mass = sb.mass_b;

        // Frequency
        let omega = 2.0 * PI * self.frequency_hz;
        // Damping coefficient
        let d = 2.0 * mass * self.damping_ratio * omega;
        // Spring stiffness
        let k = mass * omega * omega;

        // magic formulas
        // gamma has units of inverse mass.
        // beta has units of inverse time.
        let h = data.step.dt;
        debug_assert!(d + h * k > f32::EPSILON);
        self.gamma = h * (d + h * k);
        if self.gamma != 0.0 {
            self.gamma = 1.0 / self.gamma;
        }
        self.beta = h * k * self.gamma;

        // Compute the effective mass matrix.
        self.r_b = q_b.apply(self.local_anchor_b - sb.local_center_b);
        let (m_b, i_b) = (sb.inv_mass_b, sb.inv_i_b);
        let r_b = self.r_b;

        {
            let mut mats = pool.mats.checkout(2)?;
            let (k_mat, mass_mat) = mats.split_at_mut(1);
            let k_mat = &mut k_mat[0];
            k_mat.x_axis.x = m_b + i_b * r_b.y * r_b.y + self.gamma;
            k_mat.x_axis.y = -i_b * r_b.x * r_b.y;
            k_mat.y_axis.x = k_mat.x_axis.y;
            k_mat.y_axis.y = m_b + i_b * r_b.x * r_b.x + self.gamma;
            mass_mat[0] = inverse22(k_mat);
            self.mass = mass_mat[0];
        }

        self.c = (c_b + r_b - self.target_a) * self.beta;

        // Cheat with some damping.
        w_b *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += self.impulse * m_b;
            w_b += i_b * cross(r_b, self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
        Ok(())
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
    ) {
        let mut v_b = data.velocities[sb.index_b].v;
        let mut w_b = data.velocities[sb.index_b].w;

        // Cdot = v + cross(w, r)
        let c_dot = v_b + cross_sv(w_b, self.r_b);
        let impulse = self.mass * -(c_dot + self.c + self.impulse * self.gamma);

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        let impulse = self.impulse - old_impulse;

        v_b += impulse * sb.inv_mass_b;
        w_b += sb.inv_i_b * cross(self.r_b, impulse);

        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{PhysicsConfig, Position, SolverTuning, TimeStep, Velocity};

    fn drag(max_force: f32) -> (MouseJoint, SolverBodies) {
        let def = MouseJointDef::new(BodyHandle::default(), BodyHandle::default(), Vec2::ZERO)
            .with_max_force(max_force);
        let joint = MouseJoint::new(&def, &Transform::IDENTITY);
        let sb = SolverBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_b: 1.0,
            inv_i_b: 1.0,
            mass_b: 1.0,
            ..Default::default()
        };
        (joint, sb)
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn test_pulls_toward_target() {
        let (mut joint, sb) = drag(1000.0);
        joint.set_target(Vec2::new(1.0, 0.0));
        let mut positions = [Position::default(); 2];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);

        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        for _ in 0..8 {
            joint.solve_velocity_constraints(&sb, &mut data);
        }
        assert!(pool.is_balanced());
        assert!(velocities[1].v.x > 0.0);
        assert!(velocities[1].v.y.abs() < 1e-5);
        assert!(joint.reaction_force(60.0).x > 0.0);
    }

    #[test]
    fn test_force_is_bounded() {
        let (mut joint, sb) = drag(6.0);
        joint.set_target(Vec2::new(100.0, 0.0));
        let mut positions = [Position::default(); 2];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);

        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        for _ in 0..8 {
            joint.solve_velocity_constraints(&sb, &mut data);
        }
        // Accumulated impulse never exceeds dt * max_force.
        assert!((joint.reaction_force(60.0).length() - 6.0).abs() < 1e-3);
        assert!((velocities[1].v.x - 0.1).abs() < 1e-4);
    }
}
