//! Chains of line segments, open or closed.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::error::ShapeError;
use crate::math::Transform;
use crate::settings::{LINEAR_SLOP, POLYGON_RADIUS};

use super::edge::EdgeShape;
use super::MassData;

/// A free-form sequence of line segments with two-sided collision.
///
/// Each segment is a child shape. Ghost vertices connect the segments so
/// shapes slide over the joints without catching on internal corners.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    vertices: Vec<Vec2>,
    prev_vertex: Option<Vec2>,
    next_vertex: Option<Vec2>,
    is_loop: bool,
    pub radius: f32,
}

impl ChainShape {
    /// Open chain through `vertices`. Needs at least two.
    pub fn new_chain(vertices: &[Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 2 {
            return Err(ShapeError::TooFewVertices {
                min: 2,
                got: vertices.len(),
            });
        }
        check_spacing(vertices)?;
        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex: None,
            next_vertex: None,
            is_loop: false,
            radius: POLYGON_RADIUS,
        })
    }

    /// Closed loop through `vertices`; the last vertex connects back to the
    /// first. Needs at least three.
    pub fn new_loop(vertices: &[Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 3 {
            return Err(ShapeError::TooFewVertices {
                min: 3,
                got: vertices.len(),
            });
        }
        check_spacing(vertices)?;

        let mut closed = Vec::with_capacity(vertices.len() + 1);
        closed.extend_from_slice(vertices);
        closed.push(vertices[0]);
        let prev_vertex = Some(closed[closed.len() - 2]);
        let next_vertex = Some(closed[1]);

        Ok(Self {
            vertices: closed,
            prev_vertex,
            next_vertex,
            is_loop: true,
            radius: POLYGON_RADIUS,
        })
    }

    /// Connect an open chain to a neighbour before its first vertex.
    pub fn set_prev_vertex(&mut self, v: Vec2) {
        self.prev_vertex = Some(v);
    }

    /// Connect an open chain to a neighbour after its last vertex.
    pub fn set_next_vertex(&mut self, v: Vec2) {
        self.next_vertex = Some(v);
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// One child per segment.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Materialize segment `index` as an edge with its ghost neighbours.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());
        let v = &self.vertices;

        let v0 = if index > 0 {
            Some(v[index - 1])
        } else {
            self.prev_vertex
        };
        let v3 = if index + 2 < v.len() {
            Some(v[index + 2])
        } else {
            self.next_vertex
        };

        EdgeShape {
            radius: self.radius,
            ..EdgeShape::with_ghosts(v0, v[index], v[index + 1], v3)
        }
    }

    pub fn raycast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        let edge = EdgeShape::new(self.vertices[child], self.vertices[child + 1]);
        edge.raycast(input, xf)
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        let v1 = xf.apply(self.vertices[child]);
        let v2 = xf.apply(self.vertices[child + 1]);
        let r = Vec2::splat(self.radius);
        Aabb::new(v1.min(v2) - r, v1.max(v2) + r)
    }

    pub fn compute_mass(&self, _density: f32) -> MassData {
        MassData::default()
    }

    pub fn compute_distance_to_out(&self, xf: &Transform, p: Vec2, child: usize) -> (f32, Vec2) {
        self.child_edge(child).compute_distance_to_out(xf, p)
    }
}

fn check_spacing(vertices: &[Vec2]) -> Result<(), ShapeError> {
    for (index, pair) in vertices.windows(2).enumerate() {
        if pair[0].distance_squared(pair[1]) <= LINEAR_SLOP * LINEAR_SLOP {
            tracing::warn!(index, "chain vertices too close");
            return Err(ShapeError::VerticesTooClose {
                index,
                next: index + 1,
            });
        }
    }
    Ok(())
}
