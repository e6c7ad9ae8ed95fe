//! Distance joint: keeps two anchor points at a fixed distance, optionally
//! as a soft spring.

use std::f32::consts::PI;

use glam::Vec2;

use crate::dynamics::rigid_body::Body;
use crate::dynamics::{BodyHandle, SolverData};
use crate::error::PoolError;
use crate::math::{cross, cross_sv, Rot};
use crate::pooling::WorldPool;

use super::SolverBodies;

#[derive(Debug, Clone)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Anchor relative to body A's origin.
    pub local_anchor_a: Vec2,
    /// Anchor relative to body B's origin.
    pub local_anchor_b: Vec2,
    /// Rest length. Must be positive.
    pub length: f32,
    /// Spring frequency in Hz. Zero makes the joint rigid.
    pub frequency_hz: f32,
    /// 0 = no damping, 1 = critical damping.
    pub damping_ratio: f32,
}

impl DistanceJointDef {
    /// Anchors given in world coordinates. The rest length is their current
    /// distance.
    pub fn new(
        handle_a: BodyHandle,
        body_a: &Body,
        handle_b: BodyHandle,
        body_b: &Body,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Self {
        Self {
            body_a: handle_a,
            body_b: handle_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: body_a.local_point(anchor_a),
            local_anchor_b: body_b.local_point(anchor_b),
            length: anchor_a.distance(anchor_b),
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = length;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    bias: f32,
    gamma: f32,
    impulse: f32,

    // Solver temp
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
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
        self.u * (self.impulse * inv_dt)
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        let c_a = data.positions[sb.index_a].c;
        let a_a = data.positions[sb.index_a].a;
        let mut v_a = data.velocities[sb.index_a].v;
        let mut w_a = data.velocities[sb.index_a].w;

        let c_b = data.positions[sb.index_b].c;
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
        self.u = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity.
        let length = self.u.length();
        if length > data.tuning.linear_slop {
            self.u *= 1.0 / length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = cross(self.r_a, self.u);
        let cr_bu = cross(self.r_b, self.u);
        let mut inv_mass = sb.inv_mass_a
            + sb.inv_i_a * cr_au * cr_au
            + sb.inv_mass_b
            + sb.inv_i_b * cr_bu * cr_bu;

        // Compute the effective mass matrix.
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;

            let omega = 2.0 * PI * self.frequency_hz;
            // Damping coefficient
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            // Spring stiffness
            let k = self.mass * omega * omega;

            // Magic formulas
            let h = data.step.dt;
            self.gamma = h * (d + h * k);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step.
            self.impulse *= data.step.dt_ratio;

            let p = self.u * self.impulse;
            v_a -= p * sb.inv_mass_a;
            w_a -= sb.inv_i_a * cross(self.r_a, p);
            v_b += p * sb.inv_mass_b;
            w_b += sb.inv_i_b * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
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

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = v_a + cross_sv(w_a, self.r_a);
        let vp_b = v_b + cross_sv(w_b, self.r_b);
        let c_dot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (c_dot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        v_a -= p * sb.inv_mass_a;
        w_a -= sb.inv_i_a * cross(self.r_a, p);
        v_b += p * sb.inv_mass_b;
        w_b += sb.inv_i_b * cross(self.r_b, p);

        data.velocities[sb.index_a].v = v_a;
        data.velocities[sb.index_a].w = w_a;
        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
    ) -> bool {
        if self.frequency_hz > 0.0 {
            // There is no position correction for soft distance constraints.
            return true;
        }

        let mut c_a = data.positions[sb.index_a].c;
        let mut a_a = data.positions[sb.index_a].a;
        let mut c_b = data.positions[sb.index_b].c;
        let mut a_b = data.positions[sb.index_b].a;

        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);

        let r_a = q_a.apply(self.local_anchor_a - sb.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - sb.local_center_b);
        let d = c_b + r_b - c_a - r_a;

        let length = d.length();
        let u = if length > 0.0 { d / length } else { Vec2::ZERO };
        let max_correction = data.tuning.max_linear_correction;
        let c = (length - self.length).clamp(-max_correction, max_correction);

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * sb.inv_mass_a;
        a_a -= sb.inv_i_a * cross(r_a, p);
        c_b += p * sb.inv_mass_b;
        a_b += sb.inv_i_b * cross(r_b, p);

        data.positions[sb.index_a].c = c_a;
        data.positions[sb.index_a].a = a_a;
        data.positions[sb.index_b].c = c_b;
        data.positions[sb.index_b].a = a_b;

        c.abs() < data.tuning.linear_slop
    }
}
