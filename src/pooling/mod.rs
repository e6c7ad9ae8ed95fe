//! Per-world pools of reusable temporaries.
//!
//! Nothing here is global: every [`crate::dynamics::World`] owns one
//! [`WorldPool`] and passes it down by reference.

pub mod mutable_stack;
pub mod ordered_stack;
pub mod world_pool;

pub use mutable_stack::MutableStack;
pub use ordered_stack::{Checkout, OrderedStack};
pub use world_pool::{Vec2ArrayCache, WorldPool};
