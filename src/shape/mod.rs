//! Collision geometry.
//!
//! [`Shape`] is a closed set of geometry kinds. Shapes live in body space and
//! never store a transform; every query takes the body transform explicitly.
//! Chains are the only shapes with more than one child, one per segment.

pub mod chain;
pub mod circle;
pub mod edge;
pub mod polygon;

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Transform;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

/// Discriminant of [`Shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// Mass, center of mass and rotational inertia about the body origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(CircleShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius used by the narrow-phase.
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(s) => s.radius,
            Shape::Edge(s) => s.radius,
            Shape::Polygon(s) => s.radius,
            Shape::Chain(s) => s.radius,
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(s) => s.child_count(),
            _ => 1,
        }
    }

    /// Is `p` (world space) inside the shape? Edges and chains have no area.
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Shape::Circle(s) => s.test_point(xf, p),
            Shape::Polygon(s) => s.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn raycast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(s) => s.raycast(input, xf),
            Shape::Edge(s) => s.raycast(input, xf),
            Shape::Polygon(s) => s.raycast(input, xf),
            Shape::Chain(s) => s.raycast(input, xf, child),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        match self {
            Shape::Circle(s) => s.compute_aabb(xf),
            Shape::Edge(s) => s.compute_aabb(xf),
            Shape::Polygon(s) => s.compute_aabb(xf),
            Shape::Chain(s) => s.compute_aabb(xf, child),
        }
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(s) => s.compute_mass(density),
            Shape::Edge(s) => s.compute_mass(density),
            Shape::Polygon(s) => s.compute_mass(density),
            Shape::Chain(s) => s.compute_mass(density),
        }
    }

    /// Signed distance from `p` to the surface of `child`, with the outward
    /// direction.
    pub fn compute_distance_to_out(&self, xf: &Transform, p: Vec2, child: usize) -> (f32, Vec2) {
        match self {
            Shape::Circle(s) => s.compute_distance_to_out(xf, p),
            Shape::Edge(s) => s.compute_distance_to_out(xf, p),
            Shape::Polygon(s) => s.compute_distance_to_out(xf, p),
            Shape::Chain(s) => s.compute_distance_to_out(xf, p, child),
        }
    }

    /// Number of outline vertices, used to size draw buffers.
    pub fn vertex_count(&self) -> usize {
        match self {
            Shape::Circle(_) => 1,
            Shape::Edge(_) => 2,
            Shape::Polygon(s) => s.count(),
            Shape::Chain(s) => s.vertices().len(),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Shape::Circle(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Shape::Edge(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Shape::Polygon(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Shape::Chain(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shapes() -> Vec<Shape> {
        vec![
            CircleShape::with_center(Vec2::new(0.3, -0.2), 0.75).into(),
            EdgeShape::new(Vec2::new(-1.0, 0.5), Vec2::new(2.0, -0.5)).into(),
            PolygonShape::new_oriented_box(1.0, 0.25, Vec2::new(0.5, 0.5), 0.4).into(),
            ChainShape::new_chain(&[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(2.0, 0.0),
            ])
            .unwrap()
            .into(),
        ]
    }

    #[test]
    fn test_aabb_contains_hits_and_points() {
        let xf = Transform::new(Vec2::new(3.0, -2.0), 1.1);
        for shape in sample_shapes() {
            for child in 0..shape.child_count() {
                let aabb = shape.compute_aabb(&xf, child);
                assert!(aabb.is_valid());
                let fat = aabb.fattened(crate::settings::AABB_EXTENSION);
                assert!(fat.contains(&aabb));

                // Any ray hit lands inside the shape's AABB.
                let center = aabb.center();
                let input = RayCastInput::new(center + Vec2::new(-10.0, 7.0), center);
                if let Some(hit) = shape.raycast(&input, &xf, child) {
                    assert!(hit.fraction >= 0.0 && hit.fraction <= input.max_fraction);
                    assert!(hit.normal.dot(input.p2 - input.p1) <= 0.0);
                    assert!(aabb.fattened(1e-3).contains_point(input.point_at(hit.fraction)));
                }
            }
        }
    }

    #[test]
    fn test_raycast_hits_lie_on_surface() {
        let xf = Transform::new(Vec2::new(3.0, -2.0), 1.1);
        for shape in sample_shapes() {
            for child in 0..shape.child_count() {
                // Every sample child is symmetric about its AABB center.
                let target = shape.compute_aabb(&xf, child).center();
                for angle in [0.0f32, 1.2, 2.5, 4.4] {
                    let dir = Vec2::from_angle(angle);
                    let input = RayCastInput::new(target + dir * 10.0, target - dir * 10.0);
                    let Some(hit) = shape.raycast(&input, &xf, child) else {
                        panic!("{:?} child {child} missed at angle {angle}", shape.shape_type());
                    };
                    assert!((0.0..=1.0).contains(&hit.fraction));
                    assert!(hit.normal.dot(-dir) <= 0.0);

                    // Segment rays hit the core line; distances count the skin.
                    let skin = match shape {
                        Shape::Edge(_) | Shape::Chain(_) => shape.radius(),
                        _ => 0.0,
                    };
                    let point = input.point_at(hit.fraction);
                    let (distance, _) = shape.compute_distance_to_out(&xf, point, child);
                    assert!(
                        (distance + skin).abs() < 1e-3,
                        "{:?} child {child}: hit {point:?} is {distance} off the surface",
                        shape.shape_type()
                    );
                }
            }
        }
    }

    #[test]
    fn test_child_counts() {
        let shapes = sample_shapes();
        let counts: Vec<usize> = shapes.iter().map(Shape::child_count).collect();
        assert_eq!(counts, vec![1, 1, 1, 2]);
        assert_eq!(shapes[3].shape_type(), ShapeType::Chain);
        assert!(!shapes[1].test_point(&Transform::IDENTITY, Vec2::new(0.5, 0.0)));
    }
}
