//! Joints constrain the relative motion of two bodies.
//!
//! Each joint type solves its own velocity and position constraints inside
//! the island solver, interleaved with the contact constraints.

pub mod distance;
pub mod friction;
pub mod mouse;
pub mod revolute;
pub mod weld;

use glam::Vec2;
use slotmap::SlotMap;

use crate::error::PoolError;
use crate::math::Transform;
use crate::pooling::WorldPool;

use super::rigid_body::Body;
use super::{BodyHandle, SolverData};

pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use revolute::{LimitState, RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};

/// Parameters for [`crate::dynamics::World::create_joint`].
#[derive(Debug, Clone)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Mouse(MouseJointDef),
    Weld(WeldJointDef),
    Friction(FrictionJointDef),
}

impl JointDef {
    pub fn body_a(&self) -> BodyHandle {
        match self {
            JointDef::Distance(def) => def.body_a,
            JointDef::Revolute(def) => def.body_a,
            JointDef::Mouse(def) => def.body_a,
            JointDef::Weld(def) => def.body_a,
            JointDef::Friction(def) => def.body_a,
        }
    }

    pub fn body_b(&self) -> BodyHandle {
        match self {
            JointDef::Distance(def) => def.body_b,
            JointDef::Revolute(def) => def.body_b,
            JointDef::Mouse(def) => def.body_b,
            JointDef::Weld(def) => def.body_b,
            JointDef::Friction(def) => def.body_b,
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(def) => def.collide_connected,
            JointDef::Revolute(def) => def.collide_connected,
            JointDef::Mouse(def) => def.collide_connected,
            JointDef::Weld(def) => def.collide_connected,
            JointDef::Friction(def) => def.collide_connected,
        }
    }

    pub fn user_data(&self) -> u64 {
        match self {
            JointDef::Distance(def) => def.user_data,
            JointDef::Revolute(def) => def.user_data,
            JointDef::Mouse(def) => def.user_data,
            JointDef::Weld(def) => def.user_data,
            JointDef::Friction(def) => def.user_data,
        }
    }
}

impl From<DistanceJointDef> for JointDef {
    fn from(def: DistanceJointDef) -> Self {
        JointDef::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDef {
    fn from(def: RevoluteJointDef) -> Self {
        JointDef::Revolute(def)
    }
}

impl From<MouseJointDef> for JointDef {
    fn from(def: MouseJointDef) -> Self {
        JointDef::Mouse(def)
    }
}

impl From<WeldJointDef> for JointDef {
    fn from(def: WeldJointDef) -> Self {
        JointDef::Weld(def)
    }
}

impl From<FrictionJointDef> for JointDef {
    fn from(def: FrictionJointDef) -> Self {
        JointDef::Friction(def)
    }
}

/// Type-specific joint state.
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Mouse(MouseJoint),
    Weld(WeldJoint),
    Friction(FrictionJoint),
}

/// Island data of the two jointed bodies, captured when velocity
/// constraints are initialized.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SolverBodies {
    pub index_a: usize,
    pub index_b: usize,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f32,
    pub inv_mass_b: f32,
    pub inv_i_a: f32,
    pub inv_i_b: f32,
    pub mass_b: f32,
}

impl SolverBodies {
    fn new(body_a: &Body, body_b: &Body) -> Self {
        Self {
            index_a: body_a.island_index,
            index_b: body_b.island_index,
            local_center_a: body_a.sweep.local_center,
            local_center_b: body_b.sweep.local_center,
            inv_mass_a: body_a.inv_mass,
            inv_mass_b: body_b.inv_mass,
            inv_i_a: body_a.inv_inertia,
            inv_i_b: body_b.inv_inertia,
            mass_b: body_b.mass,
        }
    }
}

/// A joint between two bodies. Created and owned by a
/// [`crate::dynamics::World`].
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) kind: JointKind,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) island_flag: bool,
    solver_bodies: SolverBodies,
    pub user_data: u64,
}

impl Joint {
    /// `xf_b` is the current transform of body B.
    pub(crate) fn new(def: &JointDef, xf_b: &Transform) -> Self {
        let kind = match def {
            JointDef::Distance(def) => JointKind::Distance(DistanceJoint::new(def)),
            JointDef::Revolute(def) => JointKind::Revolute(RevoluteJoint::new(def)),
            JointDef::Mouse(def) => JointKind::Mouse(MouseJoint::new(def, xf_b)),
            JointDef::Weld(def) => JointKind::Weld(WeldJoint::new(def)),
            JointDef::Friction(def) => JointKind::Friction(FrictionJoint::new(def)),
        };
        Self {
            kind,
            body_a: def.body_a(),
            body_b: def.body_b(),
            collide_connected: def.collide_connected(),
            island_flag: false,
            solver_bodies: SolverBodies::default(),
            user_data: def.user_data(),
        }
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Whether the jointed bodies still collide with each other.
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    /// Reaction force on body B at the joint anchor, in newtons.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Distance(joint) => joint.reaction_force(inv_dt),
            JointKind::Revolute(joint) => joint.reaction_force(inv_dt),
            JointKind::Mouse(joint) => joint.reaction_force(inv_dt),
            JointKind::Weld(joint) => joint.reaction_force(inv_dt),
            JointKind::Friction(joint) => joint.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, in newton-meters.
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Mouse(_) => 0.0,
            JointKind::Revolute(joint) => joint.reaction_torque(inv_dt),
            JointKind::Weld(joint) => joint.reaction_torque(inv_dt),
            JointKind::Friction(joint) => joint.reaction_torque(inv_dt),
        }
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        bodies: &SlotMap<BodyHandle, Body>,
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        if let (Some(body_a), Some(body_b)) = (bodies.get(self.body_a), bodies.get(self.body_b)) {
            self.solver_bodies = SolverBodies::new(body_a, body_b);
        }
        let sb = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(joint) => joint.init_velocity_constraints(sb, data, pool),
            JointKind::Revolute(joint) => joint.init_velocity_constraints(sb, data, pool),
            JointKind::Mouse(joint) => joint.init_velocity_constraints(sb, data, pool),
            JointKind::Weld(joint) => joint.init_velocity_constraints(sb, data, pool),
            JointKind::Friction(joint) => joint.init_velocity_constraints(sb, data, pool),
        }
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<(), PoolError> {
        let sb = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(joint) => {
                joint.solve_velocity_constraints(sb, data);
                Ok(())
            }
            JointKind::Revolute(joint) => joint.solve_velocity_constraints(sb, data, pool),
            JointKind::Mouse(joint) => {
                joint.solve_velocity_constraints(sb, data);
                Ok(())
            }
            JointKind::Weld(joint) => {
                joint.solve_velocity_constraints(sb, data);
                Ok(())
            }
            JointKind::Friction(joint) => {
                joint.solve_velocity_constraints(sb, data);
                Ok(())
            }
        }
    }

    /// Returns true when the position error is within tolerance.
    pub(crate) fn solve_position_constraints(
        &mut self,
        data: &mut SolverData<'_>,
        pool: &mut WorldPool,
    ) -> Result<bool, PoolError> {
        let sb = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(joint) => Ok(joint.solve_position_constraints(sb, data)),
            JointKind::Revolute(joint) => joint.solve_position_constraints(sb, data, pool),
            JointKind::Weld(joint) => joint.solve_position_constraints(sb, data, pool),
            JointKind::Mouse(_) | JointKind::Friction(_) => Ok(true),
        }
    }
}
