//! Collision detection.
//!
//! # Pipeline
//!
//! 1. Broadphase: fat AABBs in a [`DynamicTree`], buffered into candidate pairs
//!    by [`BroadPhase`]
//! 2. Narrowphase: exact manifolds for each shape pair (SAT + clipping for
//!    polygons, Voronoi regions for edges)
//! 3. Distance and time of impact: GJK and conservative advancement for
//!    sensors and continuous collision

pub mod aabb;
pub mod broadphase;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod narrowphase;
pub mod time_of_impact;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use broadphase::{BroadPhase, BroadPhaseStrategy, Pair, ProxyId};
pub use distance::{Distance, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::DynamicTree;
pub use manifold::{
    point_states, ContactFeatureType, ContactId, Manifold, ManifoldPoint, ManifoldType,
    PointState, WorldManifold,
};
pub use narrowphase::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons, test_overlap,
};
pub use time_of_impact::{TimeOfImpact, ToiInput, ToiOutput, ToiState};
