//! Line segment shape with optional ghost neighbours.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Transform;
use crate::settings::POLYGON_RADIUS;

use super::MassData;

/// A line segment from `vertex1` to `vertex2`.
///
/// `vertex0` and `vertex3` are the neighbouring vertices of a chain. They only
/// smooth collision normals and never collide themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeShape {
    pub vertex0: Option<Vec2>,
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    pub vertex3: Option<Vec2>,
    pub radius: f32,
}

impl Default for EdgeShape {
    fn default() -> Self {
        Self::new(Vec2::ZERO, Vec2::ZERO)
    }
}

impl EdgeShape {
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex0: None,
            vertex1: v1,
            vertex2: v2,
            vertex3: None,
            radius: POLYGON_RADIUS,
        }
    }

    /// Edge with both ghost neighbours set.
    pub fn with_ghosts(v0: Option<Vec2>, v1: Vec2, v2: Vec2, v3: Option<Vec2>) -> Self {
        Self {
            vertex0: v0,
            vertex3: v3,
            ..Self::new(v1, v2)
        }
    }

    /// Segment ray cast. Both sides of the edge report hits.
    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the edge's frame of reference.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = Vec2::new(e.y, -e.x).normalize_or_zero();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;
        let rr = e.length_squared();
        if rr == 0.0 {
            return None;
        }

        let s = (q - v1).dot(e) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let normal = if numerator > 0.0 {
            -xf.q.apply(normal)
        } else {
            xf.q.apply(normal)
        };
        Some(RayCastOutput {
            normal,
            fraction: t,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        let r = Vec2::splat(self.radius);
        Aabb::new(v1.min(v2) - r, v1.max(v2) + r)
    }

    pub fn compute_mass(&self, _density: f32) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.vertex1 + self.vertex2) * 0.5,
            inertia: 0.0,
        }
    }

    /// Distance from `p` to the segment minus the skin radius.
    pub fn compute_distance_to_out(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);

        let mut d = p - v1;
        let s = v2 - v1;
        let ds = d.dot(s);
        if ds > 0.0 {
            let s2 = s.length_squared();
            if ds > s2 {
                d = p - v2;
            } else {
                d -= s * (ds / s2);
            }
        }

        let len = d.length();
        let normal = if len > 0.0 { d / len } else { Vec2::ZERO };
        (len - self.radius, normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_edge_raycast_both_sides() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let xf = Transform::IDENTITY;

        let down = RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(0.0, -2.0));
        let hit = edge.raycast(&down, &xf).unwrap();
        assert!((hit.fraction - 0.5).abs() < EPS);
        assert!((hit.normal - Vec2::Y).length() < EPS);

        let up = RayCastInput::new(Vec2::new(0.5, -1.0), Vec2::new(0.5, 1.0));
        let hit = edge.raycast(&up, &xf).unwrap();
        assert!((hit.normal + Vec2::Y).length() < EPS);

        let beside = RayCastInput::new(Vec2::new(3.0, 2.0), Vec2::new(3.0, -2.0));
        assert!(edge.raycast(&beside, &xf).is_none());
    }

    #[test]
    fn test_edge_mass_is_zero() {
        let edge = EdgeShape::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0));
        let mass = edge.compute_mass(10.0);
        assert_eq!(mass.mass, 0.0);
        assert_eq!(mass.center, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_edge_distance_to_out() {
        let edge = EdgeShape::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0));
        let (distance, normal) =
            edge.compute_distance_to_out(&Transform::IDENTITY, Vec2::new(1.0, 1.0));
        assert!((distance - (1.0 - edge.radius)).abs() < EPS);
        assert!((normal - Vec2::Y).length() < EPS);

        let (distance, _) = edge.compute_distance_to_out(&Transform::IDENTITY, Vec2::new(5.0, 0.0));
        assert!((distance - (3.0 - edge.radius)).abs() < EPS);
    }
}
