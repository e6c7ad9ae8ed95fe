//! Friction joint: top-down friction between two bodies, capped by a maximum
//! force and torque. It has no position constraint.

use glam::{Mat2, Vec2};

use crate::dynamics::rigid_body::Body;
use crate::dynamics::{BodyHandle, SolverData};
use crate::error::PoolError;
use crate::math::{cross, cross_sv, inverse22};
use crate::pooling::WorldPool;

use super::SolverBodies;

#[derive(Debug, Clone)]
pub struct FrictionJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Maximum friction force in newtons.
    pub max_force: f32,
    /// Maximum friction torque in newton-meters.
    pub max_torque: f32,
}

impl FrictionJointDef {
    pub fn new(
        handle_a: BodyHandle,
        body_a: &Body,
        handle_b: BodyHandle,
        body_b: &Body,
        anchor: Vec2,
    ) -> Self {
        Self {
            body_a: handle_a,
            body_b: handle_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    pub fn with_limits(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    linear_impulse: Vec2,
    angular_impulse: f32,
    max_force: f32,
    max_torque: f32,

    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat2,
    angular_mass: f32,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        debug_assert!(def.max_force >= 0.0 && def.max_torque >= 0.0);
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            max_force: def.max_force,
            max_torque: def.max_torque,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        debug_assert!(force >= 0.0);
        self.max_force = force;
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        debug_assert!(torque >= 0.0);
        self.max_torque = torque;
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.linear_impulse * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.angular_impulse * inv_dt
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        let a_a = data.positions[sb.index_a].a;
        let mut v_a = data.velocities[sb.index_a].v;
        let mut w_a = data.velocities[sb.index_a].w;

        let a_b = data.positions[sb.index_b].a;
        let mut v_b = data.velocities[sb.index_b].v;
        let mut w_b = data.velocities[sb.index_b].w;

        {
            let mut rots = pool.rots.checkout(2)?;
            rots[0].set_angle(a_a);
            rots[1].set_angle(a_b);
            self.r_a = rots[0].apply(self.local_anchor_a - sb.local_center_a);
            self.r_b = rots[1].apply(self.local_anchor_b - sb.local_center_b);
        }

        let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
        let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);
        let (r_a, r_b) = (self.r_a, self.r_b);

        {
            let mut mats = pool.mats.pop()?;
            let k = &mut mats[0];
            k.x_axis.x = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
            k.x_axis.y = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
            k.y_axis.x = k.x_axis.y;
            k.y_axis.y = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
            self.linear_mass = inverse22(k);
        }

        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= p * m_a;
            w_a -= i_a * (cross(r_a, p) + self.angular_impulse);
            v_b += p * m_b;
            w_b += i_b * (cross(r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        data.velocities[sb.index_a].v = v_a;
        data.velocities[sb.index_a].w = w_a;
        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
        Ok(())
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
    ) {
        let mut v_a = data.velocities[sb.index_a].v;
        let mut w_a = data.velocities[sb.index_a].w;
        let mut v_b = data.velocities[sb.index_b].v;
        let mut w_b = data.velocities[sb.index_b].w;

        let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
        let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);
        let (r_a, r_b) = (self.r_a, self.r_b);
        let h = data.step.dt;

        // Angular friction
        {
            let c_dot = w_b - w_a;
            let impulse = -self.angular_mass * c_dot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Linear friction
        {
            let c_dot = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let impulse = -(self.linear_mass * c_dot);

            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize_or_zero() * max_impulse;
            }

            let impulse = self.linear_impulse - old_impulse;
            v_a -= impulse * m_a;
            w_a -= i_a * cross(r_a, impulse);
            v_b += impulse * m_b;
            w_b += i_b * cross(r_b, impulse);
        }

        data.velocities[sb.index_a].v = v_a;
        data.velocities[sb.index_a].w = w_a;
        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
    }
}
