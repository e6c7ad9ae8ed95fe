//! Rigid-body dynamics.
//!
//! # Architecture
//!
//! The world runs in a fixed timestep loop:
//!
//! 1. Find new contacts (broadphase pairs)
//! 2. Update contacts (narrowphase, filtering, listener events)
//! 3. Build islands and solve each (integrate velocities, sequential impulses,
//!    integrate positions, position correction)
//! 4. Synchronize fixtures with the broadphase
//! 5. Continuous collision (time of impact sub-steps)
//! 6. Clear force accumulators

pub mod callbacks;
pub mod contact;
pub mod contact_manager;
pub mod fixture;
pub mod island;
pub mod joints;
pub mod rigid_body;
pub mod solver;
pub mod world;

use glam::Vec2;

use crate::settings::{ANGULAR_SLOP, CONTACT_STACK_INIT_SIZE, LINEAR_SLOP};

pub use callbacks::{ContactFilter, ContactImpulse, ContactListener, DefaultContactFilter};
pub use contact::{Contact, ContactKind};
pub use fixture::{Filter, Fixture, FixtureDef};
pub use joints::{
    DistanceJoint, DistanceJointDef, FrictionJoint, FrictionJointDef, Joint, JointDef, JointKind,
    MouseJoint, MouseJointDef, RevoluteJoint, RevoluteJointDef, WeldJoint, WeldJointDef,
};
pub use rigid_body::{Body, BodyDef, BodyType};
pub use world::World;

slotmap::new_key_type! {
    /// Handle to a body. Stale handles are rejected.
    pub struct BodyHandle;
    /// Handle to a fixture.
    pub struct FixtureHandle;
    /// Handle to a joint.
    pub struct JointHandle;
    /// Key of a live contact in the contact manager.
    pub struct ContactKey;
}

/// Configuration for the physics simulation.
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Gravity vector. Default: (0, -10).
    pub gravity: Vec2,
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of sub-steps per frame. Default: 4.
    pub max_substeps: u32,
    /// Velocity constraint iterations. Default: 8.
    pub velocity_iterations: u32,
    /// Position constraint iterations. Default: 3.
    pub position_iterations: u32,
    /// Let resting bodies fall asleep. Default: true.
    pub allow_sleep: bool,
    /// Seed the solver with last step's impulses. Default: true.
    pub warm_starting: bool,
    /// Time of impact sub-stepping for fast bodies. Default: true.
    pub continuous_physics: bool,
    /// Resolve one TOI event per step (debugging aid). Default: false.
    pub sub_stepping: bool,
    /// Clear forces after every step. Default: true.
    pub auto_clear_forces: bool,
    /// Fraction of overlap resolved per position iteration. Default: 0.2.
    pub baumgarte: f32,
    /// Baumgarte factor during TOI sub-steps. Default: 0.75.
    pub toi_baumgarte: f32,
    /// Relative normal speed below which collisions are inelastic. Default: 1.0.
    pub velocity_threshold: f32,
    /// Largest position correction per iteration. Default: 0.2.
    pub max_linear_correction: f32,
    /// Seconds a body must rest before sleeping. Default: 0.5.
    pub time_to_sleep: f32,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    /// Slots per ordered stack in the world pool. Default: 100.
    pub pool_size: usize,
    /// Initial instances per contact pool. Default: 10.
    pub pool_container_size: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 4,
            velocity_iterations: 8,
            position_iterations: 3,
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            velocity_threshold: 1.0,
            max_linear_correction: 0.2,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 * ANGULAR_SLOP,
            pool_size: 100,
            pool_container_size: CONTACT_STACK_INIT_SIZE,
        }
    }
}

/// Per-step solver parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeStep {
    pub dt: f32,
    pub inv_dt: f32,
    /// dt * inv_dt0
    pub dt_ratio: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

/// Solver tuning shared by the contact and joint solvers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverTuning {
    pub baumgarte: f32,
    pub toi_baumgarte: f32,
    pub velocity_threshold: f32,
    pub linear_slop: f32,
    pub max_linear_correction: f32,
}

impl From<&PhysicsConfig> for SolverTuning {
    fn from(config: &PhysicsConfig) -> Self {
        Self {
            baumgarte: config.baumgarte,
            toi_baumgarte: config.toi_baumgarte,
            velocity_threshold: config.velocity_threshold,
            linear_slop: LINEAR_SLOP,
            max_linear_correction: config.max_linear_correction,
        }
    }
}

/// Position of a body's center of mass during the solve.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Island state handed to the constraint solvers.
pub(crate) struct SolverData<'a> {
    pub step: TimeStep,
    pub tuning: SolverTuning,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physics_config_default() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, Vec2::new(0.0, -10.0));
        assert!((config.fixed_timestep - 1.0 / 60.0).abs() < 1e-10);
        assert_eq!(config.max_substeps, 4);
        assert_eq!(config.velocity_iterations, 8);
        assert_eq!(config.position_iterations, 3);
        assert!(config.continuous_physics);
        assert_eq!(config.pool_size, 100);
    }

    #[test]
    fn test_solver_tuning_from_config() {
        let config = PhysicsConfig {
            baumgarte: 0.3,
            ..Default::default()
        };
        let tuning = SolverTuning::from(&config);
        assert_eq!(tuning.baumgarte, 0.3);
        assert_eq!(tuning.linear_slop, LINEAR_SLOP);
    }
}
