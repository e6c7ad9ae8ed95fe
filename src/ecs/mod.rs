//! hecs integration.
//!
//! Entities refer to physics bodies through [`PhysicsBody`]. The physics
//! [`crate::dynamics::World`] stays the source of truth; after stepping,
//! [`sync_transforms`] mirrors body poses and velocities into components.

pub mod bridge;
pub mod components;
pub mod systems;

pub use bridge::{despawn_body, spawn_body};
pub use components::physics::{PhysicsBody, Transform2d, Velocity2d};
pub use systems::physics::{step_and_sync, sync_transforms};

pub mod prelude {
    pub use super::bridge::{despawn_body, spawn_body};
    pub use super::components::physics::{PhysicsBody, Transform2d, Velocity2d};
    pub use super::systems::physics::{step_and_sync, sync_transforms};
}
