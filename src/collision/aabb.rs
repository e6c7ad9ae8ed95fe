//! Axis-aligned bounding boxes and ray-cast input/output.

use glam::Vec2;

use crate::settings::EPSILON;

/// Ray-cast input. The ray extends from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    /// Point at `fraction` along the ray.
    #[inline]
    pub fn point_at(&self, fraction: f32) -> Vec2 {
        self.p1 + (self.p2 - self.p1) * fraction
    }
}

/// Ray-cast hit. The normal faces against the ray direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Box spanning two arbitrary corner points.
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// Lower bound not above upper bound and all coordinates finite.
    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_finite() && self.upper.is_finite()
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Half-widths.
    #[inline]
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    #[inline]
    pub fn perimeter(&self) -> f32 {
        2.0 * ((self.upper.x - self.lower.x) + (self.upper.y - self.lower.y))
    }

    #[inline]
    pub fn combine(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            lower: a.lower.min(b.lower),
            upper: a.upper.max(b.upper),
        }
    }

    /// Does this box fully contain `other`?
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Test whether two AABBs overlap (touching counts).
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        if other.lower.x - self.upper.x > 0.0 || other.lower.y - self.upper.y > 0.0 {
            return false;
        }
        if self.lower.x - other.upper.x > 0.0 || self.lower.y - other.upper.y > 0.0 {
            return false;
        }
        true
    }

    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.lower.x && p.y >= self.lower.y && p.x <= self.upper.x && p.y <= self.upper.y
    }

    /// Enlarge uniformly by `margin`.
    #[inline]
    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::splat(margin);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Slab ray cast against the box. Entry hits only; rays starting inside miss.
    pub fn raycast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = -f32::MAX;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        for axis in 0..2 {
            if abs_d[axis] < EPSILON {
                // Parallel.
                if p[axis] < self.lower[axis] || self.upper[axis] < p[axis] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[axis];
                let mut t1 = (self.lower[axis] - p[axis]) * inv_d;
                let mut t2 = (self.upper[axis] - p[axis]) * inv_d;

                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }

                if t1 > tmin {
                    normal = Vec2::ZERO;
                    normal[axis] = s;
                    tmin = t1;
                }

                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}
