//! Weld joint: glues two bodies together at an anchor. With a frequency the
//! angular part becomes a soft spring.

use std::f32::consts::PI;

use glam::{Mat2, Mat3, Vec2, Vec3};

use crate::dynamics::rigid_body::Body;
use crate::dynamics::{BodyHandle, SolverData};
use crate::error::PoolError;
use crate::math::{cross, cross_sv, inverse22, solve33, solve33_as_22, sym_inverse33, Rot};
use crate::pooling::WorldPool;
use crate::settings::ANGULAR_SLOP;

use super::SolverBodies;

#[derive(Debug, Clone)]
pub struct WeldJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the welded state.
    pub reference_angle: f32,
    /// Angular spring frequency in Hz. Zero makes the weld rigid.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    /// Weld at a world anchor, locking the current relative angle.
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
            reference_angle: body_b.angle() - body_a.angle(),
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Debug, Clone)]
pub struct WeldJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    bias: f32,
    gamma: f32,
    /// Linear impulse in x/y, angular impulse in z.
    impulse: Vec3,

    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: Vec3::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
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
        Vec2::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.impulse.z * inv_dt
    }

    fn is_soft(&self) -> bool {
        self.frequency_hz > 0.0
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

        let mut mats = pool.mat33s.pop()?;
        let k = &mut mats[0];
        fill_k(k, self.r_a, self.r_b, sb);

        if self.is_soft() {
            let linear = inverse22(&Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate()));
            self.mass = Mat3::from_cols(
                linear.x_axis.extend(0.0),
                linear.y_axis.extend(0.0),
                Vec3::ZERO,
            );

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = a_b - a_a - self.reference_angle;

            // Frequency
            let omega = 2.0 * PI * self.frequency_hz;
            // Damping coefficient
            let d = 2.0 * m * self.damping_ratio * omega;
            // Spring stiffness
            let stiffness = m * omega * omega;

            let h = data.step.dt;
            self.gamma = h * (d + h * stiffness);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * stiffness * self.gamma;

            inv_m += self.gamma;
            self.mass.z_axis.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            self.mass = sym_inverse33(k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (cross(self.r_a, p) + self.impulse.z);
            v_b += p * m_b;
            w_b += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
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

        if self.is_soft() {
            let c_dot2 = w_b - w_a;
            let impulse2 =
                -self.mass.z_axis.z * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            w_a -= i_a * impulse2;
            w_b += i_b * impulse2;

            let c_dot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let linear = Mat2::from_cols(self.mass.x_axis.truncate(), self.mass.y_axis.truncate());
            let impulse1 = -(linear * c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a -= impulse1 * m_a;
            w_a -= i_a * cross(r_a, impulse1);
            v_b += impulse1 * m_b;
            w_b += i_b * cross(r_b, impulse1);
        } else {
            let c_dot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let c_dot = Vec3::new(c_dot1.x, c_dot1.y, w_b - w_a);

            let impulse = -(self.mass * c_dot);
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (cross(r_a, p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (cross(r_b, p) + impulse.z);
        }

        data.velocities[sb.index_a].v = v_a;
        data.velocities[sb.index_a].w = w_a;
        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
    }

    pub(crate) fn solve_position_constraints(
        &mut self,
        sb: &SolverBodies,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<bool, PoolError> {
        let mut c_a = data.positions[sb.index_a].c;
        let mut a_a = data.positions[sb.index_a].a;
        let mut c_b = data.positions[sb.index_b].c;
        let mut a_b = data.positions[sb.index_b].a;

        let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
        let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);

        let r_a = Rot::from_angle(a_a).apply(self.local_anchor_a - sb.local_center_a);
        let r_b = Rot::from_angle(a_b).apply(self.local_anchor_b - sb.local_center_b);

        let mut mats = pool.mat33s.pop()?;
        let k = &mut mats[0];
        fill_k(k, r_a, r_b, sb);

        let c1 = c_b + r_b - c_a - r_a;
        let position_error = c1.length();
        let angular_error;

        if self.is_soft() {
            angular_error = 0.0;

            let p = -solve33_as_22(k, c1);
            c_a -= p * m_a;
            a_a -= i_a * cross(r_a, p);
            c_b += p * m_b;
            a_b += i_b * cross(r_b, p);
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = -solve33(k, Vec3::new(c1.x, c1.y, c2));
            let p = Vec2::new(impulse.x, impulse.y);
            c_a -= p * m_a;
            a_a -= i_a * (cross(r_a, p) + impulse.z);
            c_b += p * m_b;
            a_b += i_b * (cross(r_b, p) + impulse.z);
        }

        data.positions[sb.index_a].c = c_a;
        data.positions[sb.index_a].a = a_a;
        data.positions[sb.index_b].c = c_b;
        data.positions[sb.index_b].a = a_b;

        Ok(position_error <= data.tuning.linear_slop && angular_error <= ANGULAR_SLOP)
    }
}

/// Point-to-point plus angle constraint mass.
///
/// ```text
/// J = [-I -r1_skew I r2_skew]
///     [ 0       -1 0       1]
/// ```
fn fill_k(k: &mut Mat3, r_a: Vec2, r_b: Vec2, sb: &SolverBodies) {
    let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
    let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);
    k.x_axis.x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
    k.y_axis.x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    k.z_axis.x = -r_a.y * i_a - r_b.y * i_b;
    k.x_axis.y = k.y_axis.x;
    k.y_axis.y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
    k.z_axis.y = r_a.x * i_a + r_b.x * i_b;
    k.x_axis.z = k.z_axis.x;
    k.y_axis.z = k.z_axis.y;
    k.z_axis.z = i_a + i_b;
}
