//! Revolute joint: two bodies share an anchor point and rotate freely about
//! it, with an optional angle limit and motor.

use glam::{Mat2, Mat3, Vec2, Vec3};

use crate::dynamics::rigid_body::Body;
use crate::dynamics::{BodyHandle, SolverData};
use crate::error::PoolError;
use crate::math::{cross, cross_sv, solve22, solve33, solve33_as_22, Rot};
use crate::pooling::WorldPool;
use crate::settings::{ANGULAR_SLOP, MAX_ANGULAR_CORRECTION};

use super::SolverBodies;

/// Which side of the angle limit the joint is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper limits are (nearly) equal.
    Equal,
}

#[derive(Debug, Clone)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the reference state.
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    /// Target speed in radians per second.
    pub motor_speed: f32,
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    /// Joint at a world anchor, with the current relative angle as reference.
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
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,
    /// Point-to-point impulse in x/y, limit impulse in z.
    impulse: Vec3,
    motor_impulse: f32,

    enable_motor: bool,
    max_motor_torque: f32,
    motor_speed: f32,

    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    limit_state: LimitState,

    r_a: Vec2,
    r_b: Vec2,
    /// Effective mass for the point-to-point and limit constraints.
    mass: Mat3,
    /// Effective mass for the motor and limit constraints.
    motor_mass: f32,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            enable_motor: def.enable_motor,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            limit_state: LimitState::Inactive,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
            motor_mass: 0.0,
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

    /// Current joint angle in radians.
    pub fn joint_angle(&self, body_a: &Body, body_b: &Body) -> f32 {
        body_b.sweep.a - body_a.sweep.a - self.reference_angle
    }

    /// Current joint angular speed in radians per second.
    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> f32 {
        body_b.angular_velocity - body_a.angular_velocity
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn max_motor_torque(&self) -> f32 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque;
    }

    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        self.motor_impulse * inv_dt
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn lower_limit(&self) -> f32 {
        self.lower_angle
    }

    pub fn upper_limit(&self) -> f32 {
        self.upper_angle
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        debug_assert!(lower <= upper);
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        Vec2::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.impulse.z * inv_dt
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

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        // r_skew = [-ry; rx]
        let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
        let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = i_a + i_b == 0.0;

        {
            let mut mats = pool.mat33s.pop()?;
            let k = &mut mats[0];
            k.x_axis.x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
            k.y_axis.x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
            k.z_axis.x = -r_a.y * i_a - r_b.y * i_b;
            k.x_axis.y = k.y_axis.x;
            k.y_axis.y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
            k.z_axis.y = r_a.x * i_a + r_b.x * i_b;
            k.x_axis.z = k.z_axis.x;
            k.y_axis.z = k.z_axis.y;
            k.z_axis.z = i_a + i_b;
            self.mass = *k;
        }

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = a_b - a_a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step.
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (cross(r_a, p) + self.motor_impulse + self.impulse.z);
            v_b += p * m_b;
            w_b += i_b * (cross(r_b, p) + self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
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
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        let mut v_a = data.velocities[sb.index_a].v;
        let mut w_a = data.velocities[sb.index_a].w;
        let mut v_b = data.velocities[sb.index_b].v;
        let mut w_b = data.velocities[sb.index_b].w;

        let (m_a, m_b) = (sb.inv_mass_a, sb.inv_mass_b);
        let (i_a, i_b) = (sb.inv_i_a, sb.inv_i_b);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = i_a + i_b == 0.0;

        // Solve motor constraint.
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let c_dot = w_b - w_a - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve limit constraint.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let mut vecs = pool.vec3s.checkout(2)?;
            let c_dot1 = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let c_dot2 = w_b - w_a;
            vecs[0] = Vec3::new(c_dot1.x, c_dot1.y, c_dot2);
            vecs[1] = -solve33(&self.mass, vecs[0]);
            let mut impulse = vecs[1];

            match self.limit_state {
                LimitState::Equal => {
                    self.impulse += impulse;
                }
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    let violated = if self.limit_state == LimitState::AtLower {
                        new_impulse < 0.0
                    } else {
                        new_impulse > 0.0
                    };
                    if violated {
                        let rhs = -c_dot1
                            + Vec2::new(self.mass.z_axis.x, self.mass.z_axis.y) * self.impulse.z;
                        let reduced = solve33_as_22(&self.mass, rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (cross(r_a, p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (cross(r_b, p) + impulse.z);
        } else {
            // Solve point to point constraint.
            let c_dot = v_b + cross_sv(w_b, r_b) - v_a - cross_sv(w_a, r_a);
            let impulse = solve33_as_22(&self.mass, -c_dot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            v_a -= impulse * m_a;
            w_a -= i_a * cross(r_a, impulse);
            v_b += impulse * m_b;
            w_b += i_b * cross(r_b, impulse);
        }

        data.velocities[sb.index_a].v = v_a;
        data.velocities[sb.index_a].w = w_a;
        data.velocities[sb.index_b].v = v_b;
        data.velocities[sb.index_b].w = w_b;
        Ok(())
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

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        // Solve angular limit constraint.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = a_b - a_a - self.reference_angle;
            let limit_impulse = match self.limit_state {
                LimitState::Equal => {
                    // Prevent large angular corrections.
                    let c = (angle - self.lower_angle)
                        .clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
                    angular_error = c.abs();
                    -self.motor_mass * c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    // Prevent large angular corrections and allow some slop.
                    let c = (c + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0);
                    -self.motor_mass * c
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    let c = (c - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION);
                    -self.motor_mass * c
                }
                LimitState::Inactive => 0.0,
            };

            a_a -= i_a * limit_impulse;
            a_b += i_b * limit_impulse;
        }

        // Solve point to point constraint.
        let q_a = Rot::from_angle(a_a);
        let q_b = Rot::from_angle(a_b);
        let r_a = q_a.apply(self.local_anchor_a - sb.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - sb.local_center_b);

        let c = c_b + r_b - c_a - r_a;
        let position_error = c.length();

        let impulse = {
            let mut mats = pool.mats.pop()?;
            let k: &mut Mat2 = &mut mats[0];
            k.x_axis.x = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
            k.x_axis.y = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
            k.y_axis.x = k.x_axis.y;
            k.y_axis.y = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
            -solve22(k, c)
        };

        c_a -= impulse * m_a;
        a_a -= i_a * cross(r_a, impulse);
        c_b += impulse * m_b;
        a_b += i_b * cross(r_b, impulse);

        data.positions[sb.index_a].c = c_a;
        data.positions[sb.index_a].a = a_a;
        data.positions[sb.index_b].c = c_b;
        data.positions[sb.index_b].a = a_b;

        Ok(position_error <= data.tuning.linear_slop && angular_error <= ANGULAR_SLOP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{PhysicsConfig, Position, SolverTuning, TimeStep, Velocity};

    /// Static body A at the origin, unit disk B centered at (1, 0), hinged at
    /// the origin.
    fn hinge(def_mut: impl FnOnce(&mut RevoluteJointDef)) -> (RevoluteJoint, SolverBodies) {
        let mut def = RevoluteJointDef {
            body_a: BodyHandle::default(),
            body_b: BodyHandle::default(),
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::new(-1.0, 0.0),
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        };
        def_mut(&mut def);
        let sb = SolverBodies {
            index_a: 0,
            index_b: 1,
            inv_mass_b: 1.0,
            inv_i_b: 2.0,
            mass_b: 1.0,
            ..Default::default()
        };
        (RevoluteJoint::new(&def), sb)
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: false,
        }
    }

    fn state(c: Vec2, a: f32, v: Vec2, w: f32) -> ([Position; 2], [Velocity; 2]) {
        (
            [Position::default(), Position { c, a }],
            [Velocity::default(), Velocity { v, w }],
        )
    }

    #[test]
    fn test_anchor_velocity_is_removed() {
        let (mut joint, sb) = hinge(|_| {});
        let (mut positions, mut velocities) = state(Vec2::new(1.0, 0.0), 0.0, Vec2::new(0.5, -1.0), 0.0);
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);

        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        joint.solve_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        assert!(pool.is_balanced());

        // Velocity of the hinge point on B.
        let anchor_velocity = velocities[1].v + cross_sv(velocities[1].w, Vec2::new(-1.0, 0.0));
        assert!(anchor_velocity.length() < 1e-5);
        // B now swings about the hinge.
        assert!(velocities[1].w < 0.0);
    }

    #[test]
    fn test_motor_drives_relative_speed() {
        let (mut joint, sb) = hinge(|def| {
            def.local_anchor_b = Vec2::ZERO;
            def.enable_motor = true;
            def.motor_speed = 2.0;
            def.max_motor_torque = 1000.0;
        });
        let (mut positions, mut velocities) = state(Vec2::ZERO, 0.0, Vec2::ZERO, 0.0);
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);

        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        joint.solve_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        assert!((velocities[1].w - 2.0).abs() < 1e-4);
        assert!(joint.motor_torque(60.0) > 0.0);
    }

    #[test]
    fn test_weak_motor_is_clamped() {
        let (mut joint, sb) = hinge(|def| {
            def.local_anchor_b = Vec2::ZERO;
            def.enable_motor = true;
            def.motor_speed = 10.0;
            def.max_motor_torque = 6.0;
        });
        let (mut positions, mut velocities) = state(Vec2::ZERO, 0.0, Vec2::ZERO, 0.0);
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);

        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        joint.solve_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        // Impulse limited to dt * max torque = 0.1, times inv inertia 2.
        assert!((velocities[1].w - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_limit_state_tracks_angle() {
        let (mut joint, sb) = hinge(|def| {
            def.enable_limit = true;
            def.lower_angle = -0.25;
            def.upper_angle = 0.25;
        });
        let mut pool = WorldPool::new(8, 2);
        let tuning = SolverTuning::from(&PhysicsConfig::default());

        for (angle, expected) in [
            (0.0, LimitState::Inactive),
            (-0.3, LimitState::AtLower),
            (0.3, LimitState::AtUpper),
        ] {
            let (mut positions, mut velocities) = state(Vec2::new(1.0, 0.0), angle, Vec2::ZERO, 0.0);
            let mut data = SolverData {
                step: step(),
                tuning,
                positions: &mut positions,
                velocities: &mut velocities,
            };
            joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
            assert_eq!(joint.limit_state(), expected);
        }

        joint.set_limits(0.1, 0.1);
        let (mut positions, mut velocities) = state(Vec2::new(1.0, 0.0), 0.0, Vec2::ZERO, 0.0);
        let mut data = SolverData {
            step: step(),
            tuning,
            positions: &mut positions,
            velocities: &mut velocities,
        };
        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();
        assert_eq!(joint.limit_state(), LimitState::Equal);
    }

    #[test]
    fn test_position_solver_rejoins_anchors() {
        let (mut joint, sb) = hinge(|_| {});
        // B drifted away from the hinge.
        let (mut positions, mut velocities) = state(Vec2::new(1.1, 0.05), 0.0, Vec2::ZERO, 0.0);
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };
        let mut pool = WorldPool::new(8, 2);
        joint.init_velocity_constraints(&sb, &mut data, &mut pool).unwrap();

        let mut done = false;
        for _ in 0..10 {
            if joint.solve_position_constraints(&sb, &mut data, &mut pool).unwrap() {
                done = true;
                break;
            }
        }
        assert!(done);
        let q = Rot::from_angle(positions[1].a);
        let anchor = positions[1].c + q.apply(Vec2::new(-1.0, 0.0));
        assert!(anchor.length() < 0.01);
    }
}
