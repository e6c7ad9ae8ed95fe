//! Global tuning constants for geometry, the broad-phase and the solvers.
//!
//! Values that callers commonly tune per world (iteration counts, Baumgarte
//! factors, sleep tolerances) live in [`crate::dynamics::PhysicsConfig`]
//! instead.

use std::f32::consts::PI;

/// Machine epsilon for `f32`.
pub const EPSILON: f32 = f32::EPSILON;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Smallest slot count per ordered stack in a world pool: the deepest
/// checkout in one step holds a polygon and its clipped copy.
pub const MIN_POOL_SIZE: usize = 2 * MAX_POLYGON_VERTICES;

/// Margin added to proxy AABBs in the dynamic tree so small motion does not
/// trigger a re-insert.
pub const AABB_EXTENSION: f32 = 0.1;

/// Scales the displacement used to predict a proxy's future AABB.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collision and constraint tolerance.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular collision and constraint tolerance.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius of polygons and edges.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of sub-steps per contact in continuous physics.
pub const MAX_SUB_STEPS: u32 = 8;

/// Maximum number of contacts handled when solving a TOI island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Maximum angular position correction used by joint position solves.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Maximum linear translation of a body per step.
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step.
pub const MAX_ROTATION: f32 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Initial capacity of each per-kind contact pool.
pub const CONTACT_STACK_INIT_SIZE: usize = 10;

/// Upper bound of GJK iterations.
pub const MAX_GJK_ITERATIONS: u32 = 20;

/// Upper bound of conservative-advancement iterations in the TOI solver.
pub const MAX_TOI_ITERATIONS: u32 = 20;

/// Upper bound of root finder iterations in the TOI solver.
pub const MAX_TOI_ROOT_ITERATIONS: u32 = 50;
