//! ECS systems.

pub mod physics;
