//! Time of impact by conservative advancement.
//!
//! The root finder works on separating axes derived from the GJK simplex. It
//! pushes the time forward until the shapes are within `target` of each other,
//! which leaves a small gap so the next position solve starts separated.

use glam::Vec2;

use crate::math::{cross_vs, Sweep};
use crate::settings::{
    LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS,
};

use super::distance::{Distance, DistanceInput, DistanceProxy, SimplexCache};

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Sweep interval upper bound in [0, 1].
    pub t_max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationType {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationType,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationType::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (point_b - point_a).normalize_or_zero();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationType::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = cross_vs(local_b2 - local_b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.apply(f.axis);

            f.local_point = (local_b1 + local_b2) * 0.5;
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two points on B.
            f.kind = SeparationType::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = cross_vs(local_a2 - local_a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.apply(f.axis);

            f.local_point = (local_a1 + local_a2) * 0.5;
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }

        f
    }

    /// Deepest points along the axis at time `t` and their separation.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationType::Points => {
                let index_a = self.proxy_a.support(xf_a.q.apply_inv(self.axis));
                let index_b = self.proxy_b.support(xf_b.q.apply_inv(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support(xf_b.q.apply_inv(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), 0, index_b)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support(xf_a.q.apply_inv(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of the given support points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationType::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// TOI engine. Owned by the world pool; keeps call statistics.
#[derive(Debug, Clone, Default)]
pub struct TimeOfImpact {
    pub toi_calls: u32,
    pub toi_iters: u32,
    pub toi_max_iters: u32,
    pub toi_root_iters: u32,
    pub toi_max_root_iters: u32,
}

impl TimeOfImpact {
    /// Upper bound on the time at which the two sweeps come within
    /// `max(LINEAR_SLOP, total_radius - 3 * LINEAR_SLOP)` of each other.
    ///
    /// Sweeps are normalized internally, so callers may pass raw copies.
    pub fn compute(&mut self, distance: &mut Distance, input: &ToiInput) -> ToiOutput {
        self.toi_calls += 1;

        let mut output = ToiOutput {
            state: ToiState::Unknown,
            t: input.t_max,
        };

        let proxy_a = &input.proxy_a;
        let proxy_b = &input.proxy_b;

        let mut sweep_a = input.sweep_a;
        let mut sweep_b = input.sweep_b;
        sweep_a.normalize();
        sweep_b.normalize();

        let t_max = input.t_max;

        let total_radius = proxy_a.radius + proxy_b.radius;
        let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
        let tolerance = 0.25 * LINEAR_SLOP;
        debug_assert!(target > tolerance);

        let mut t1 = 0.0f32;
        let mut iter = 0;

        let mut cache = SimplexCache::default();
        let mut distance_input = DistanceInput {
            proxy_a: *proxy_a,
            proxy_b: *proxy_b,
            transform_a: sweep_a.transform_at(t1),
            transform_b: sweep_b.transform_at(t1),
            use_radii: false,
        };

        // The outer loop progressively attempts to compute new separating axes.
        // It terminates when an axis is repeated (no progress is made).
        loop {
            distance_input.transform_a = sweep_a.transform_at(t1);
            distance_input.transform_b = sweep_b.transform_at(t1);

            // Closest points at t1, ignoring radii.
            let distance_output = distance.compute(&mut cache, &distance_input);

            if distance_output.distance <= 0.0 {
                output.state = ToiState::Overlapped;
                output.t = 0.0;
                break;
            }

            if distance_output.distance < target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                break;
            }

            let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

            // Resolve the deepest point on the axis. This loop terminates
            // when the vertex count of the polygons is exhausted.
            let mut done = false;
            let mut t2 = t_max;
            let mut push_back_iter = 0;
            loop {
                let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

                // Final configuration still separated.
                if s2 > target + tolerance {
                    output.state = ToiState::Separated;
                    output.t = t_max;
                    done = true;
                    break;
                }

                // Advance the sweeps.
                if s2 > target - tolerance {
                    t1 = t2;
                    break;
                }

                let mut s1 = fcn.evaluate(index_a, index_b, t1);

                // The initial separation can be below target when the root
                // finder went wrong earlier.
                if s1 < target - tolerance {
                    tracing::debug!(t1, s1, target, "toi root finder failed");
                    output.state = ToiState::Failed;
                    output.t = t1;
                    done = true;
                    break;
                }

                // Touching at t1.
                if s1 <= target + tolerance {
                    output.state = ToiState::Touching;
                    output.t = t1;
                    done = true;
                    break;
                }

                // 1D root of f(t) - target = 0, alternating secant and bisection.
                let mut root_iter = 0;
                let mut a1 = t1;
                let mut a2 = t2;
                loop {
                    let t = if root_iter & 1 == 1 {
                        a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                    } else {
                        0.5 * (a1 + a2)
                    };
                    root_iter += 1;
                    self.toi_root_iters += 1;

                    let s = fcn.evaluate(index_a, index_b, t);

                    if (s - target).abs() < tolerance {
                        t2 = t;
                        break;
                    }

                    if s > target {
                        a1 = t;
                        s1 = s;
                    } else {
                        a2 = t;
                        s2 = s;
                    }

                    if root_iter == MAX_TOI_ROOT_ITERATIONS {
                        break;
                    }
                }

                self.toi_max_root_iters = self.toi_max_root_iters.max(root_iter);

                push_back_iter += 1;
                if push_back_iter == MAX_POLYGON_VERTICES {
                    break;
                }
            }

            iter += 1;
            self.toi_iters += 1;

            if done {
                break;
            }

            if iter == MAX_TOI_ITERATIONS {
                tracing::debug!(t1, "toi hit the iteration limit");
                output.state = ToiState::Failed;
                output.t = t1;
                break;
            }
        }

        self.toi_max_iters = self.toi_max_iters.max(iter);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, PolygonShape, Shape};

    fn sweep(from: Vec2, to: Vec2, a0: f32, a: f32) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0,
            a,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_fast_circle_hits_wall() {
        let wall: Shape = PolygonShape::new_box(0.1, 5.0).into();
        let bullet: Shape = CircleShape::new(0.25).into();

        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&bullet, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };

        let mut gjk = Distance::default();
        let mut toi = TimeOfImpact::default();
        let out = toi.compute(&mut gjk, &input);
        assert_eq!(out.state, ToiState::Touching);

        // Contact when the circle surface meets the wall face at x = -0.1.
        let expected = (10.0 - 0.1 - 0.25) / 20.0;
        assert!(out.t > 0.0 && out.t <= expected + 1e-3);
        assert!((out.t - expected).abs() < 0.01);
        assert_eq!(toi.toi_calls, 1);
    }

    #[test]
    fn test_separated_sweeps() {
        let a: Shape = PolygonShape::new_box(0.5, 0.5).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&a, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::new(0.0, 1.0), 0.0, 0.0),
            sweep_b: sweep(Vec2::new(5.0, 0.0), Vec2::new(5.0, 1.0), 0.0, 0.5),
            t_max: 1.0,
        };
        let out = TimeOfImpact::default().compute(&mut Distance::default(), &input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn test_initially_overlapped() {
        let a: Shape = PolygonShape::new_box(1.0, 1.0).into();
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&a, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.5, 0.0), Vec2::new(3.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let out = TimeOfImpact::default().compute(&mut Distance::default(), &input);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }
}
