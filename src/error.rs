//! Error types for physics operations.

use thiserror::Error;

/// Errors raised while building shape geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("shape needs at least {min} vertices, got {got}")]
    TooFewVertices { min: usize, got: usize },
    #[error("shape supports at most {max} vertices, got {got}")]
    TooManyVertices { max: usize, got: usize },
    #[error("vertices {index} and {next} are closer than the linear slop")]
    VerticesTooClose { index: usize, next: usize },
    #[error("points do not form a convex hull with positive area")]
    DegenerateHull,
}

/// Errors raised by the object pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("ordered stack overflow: requested {requested}, {available} available")]
    Overflow { requested: usize, available: usize },
    #[error("pool of {size} slots per stack is below the minimum of {min}")]
    Undersized { size: usize, min: usize },
}

/// Top-level error type for world operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhysicsError {
    #[error("body handle is stale or was never created")]
    InvalidBody,
    #[error("fixture handle is stale or was never created")]
    InvalidFixture,
    #[error("joint handle is stale or was never created")]
    InvalidJoint,
    #[error("joint must connect two different bodies")]
    SelfJoint,
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
