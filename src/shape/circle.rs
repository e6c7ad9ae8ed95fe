//! Solid circle shape.

use std::f32::consts::PI;

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::math::Transform;
use crate::settings::EPSILON;

use super::MassData;

/// A solid circle with an offset center in body space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleShape {
    pub center: Vec2,
    pub radius: f32,
}

impl Default for CircleShape {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            radius: 0.0,
        }
    }
}

impl CircleShape {
    pub fn new(radius: f32) -> Self {
        Self {
            center: Vec2::ZERO,
            radius,
        }
    }

    pub fn with_center(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.apply(self.center);
        (p - center).length_squared() <= self.radius * self.radius
    }

    /// Solve `|p1 + t*d - c|^2 = r^2` for the smallest non-negative `t`.
    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.apply(self.center);
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < EPSILON {
            return None;
        }

        let mut a = -(c + sigma.sqrt());
        if 0.0 <= a && a <= input.max_fraction * rr {
            a /= rr;
            return Some(RayCastOutput {
                normal: (s + r * a).normalize_or_zero(),
                fraction: a,
            });
        }
        None
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.apply(self.center);
        let r = Vec2::splat(self.radius);
        Aabb::new(p - r, p + r)
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let r2 = self.radius * self.radius;
        let mass = density * PI * r2;
        MassData {
            mass,
            center: self.center,
            inertia: mass * (0.5 * r2 + self.center.length_squared()),
        }
    }

    /// Signed distance from `p` to the surface; negative inside.
    pub fn compute_distance_to_out(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let center = xf.apply(self.center);
        let d = p - center;
        let len = d.length();
        let normal = if len > EPSILON { d / len } else { Vec2::ZERO };
        (len - self.radius, normal)
    }
}
