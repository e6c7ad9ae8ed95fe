//! Rein 2D Physics
//!
//! An embeddable 2D rigid-body physics engine: shapes, broadphase and
//! narrowphase collision, contacts with listener callbacks, an iterative
//! impulse solver with continuous collision, and joints.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **math** - 2D rotations, transforms, sweeps and small matrix solves
//! 2. **settings** - Engine tuning constants
//! 3. **pooling** - Per-world scratch storage and contact pools
//! 4. **shape** - Circle, edge, polygon and chain geometry
//! 5. **collision** - AABB tree, broadphase, GJK, time of impact, manifolds
//! 6. **dynamics** - Bodies, fixtures, contacts, solver, joints and the world
//! 7. **ecs** - hecs ECS integration (feature = "ecs")
//!
//! # Example
//!
//! ```
//! use rein2d::glam::Vec2;
//! use rein2d::{BodyDef, FixtureDef, PhysicsConfig, PolygonShape, World};
//!
//! let mut world = World::new(PhysicsConfig::default()).unwrap();
//! let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO));
//! world
//!     .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(10.0, 0.5)))
//!     .unwrap();
//!
//! let body = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 4.0)));
//! world
//!     .create_fixture(
//!         body,
//!         &FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
//!     )
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0);
//! }
//! assert!(world.body(body).unwrap().position().y < 4.0);
//! ```

pub mod collision;
pub mod dynamics;
pub mod error;
pub mod math;
pub mod pooling;
pub mod settings;
pub mod shape;

#[cfg(feature = "ecs")]
pub mod ecs;

// Re-export commonly used types
pub use collision::{Aabb, BroadPhase, BroadPhaseStrategy, DynamicTree, Manifold, RayCastInput};

pub use dynamics::{
    BodyDef, BodyHandle, BodyType, Contact, ContactFilter, ContactImpulse, ContactListener,
    DistanceJointDef, Filter, Fixture, FixtureDef, FixtureHandle, FrictionJointDef, JointDef,
    JointHandle, JointKind, MouseJointDef, PhysicsConfig, RevoluteJointDef, WeldJointDef, World,
};

pub use error::{PhysicsError, PoolError, ShapeError};

pub use math::{Rot, Sweep, Transform};

pub use pooling::WorldPool;

pub use shape::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};

#[cfg(feature = "ecs")]
pub use ecs::prelude::*;

// Re-export glam for convenience
pub use glam;
