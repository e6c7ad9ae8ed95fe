//! GJK closest-point computation between convex proxies.

use glam::Vec2;

use crate::math::{cross, cross_sv, cross_vs, Transform};
use crate::settings::{EPSILON, MAX_GJK_ITERATIONS, MAX_POLYGON_VERTICES};
use crate::shape::Shape;

/// Convex vertex cloud plus radius, as seen by GJK.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl Default for DistanceProxy {
    fn default() -> Self {
        Self {
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
            radius: 0.0,
        }
    }
}

impl DistanceProxy {
    /// Proxy for one child of a shape. Chain children are their segment.
    pub fn new(shape: &Shape, child: usize) -> Self {
        match shape {
            Shape::Circle(s) => Self::from_vertices(&[s.center], s.radius),
            Shape::Polygon(s) => Self::from_vertices(s.vertices(), s.radius),
            Shape::Edge(s) => Self::from_vertices(&[s.vertex1, s.vertex2], s.radius),
            Shape::Chain(s) => {
                let v = s.vertices();
                Self::from_vertices(&[v[child], v[child + 1]], s.radius)
            }
        }
    }

    pub fn from_vertices(points: &[Vec2], radius: f32) -> Self {
        debug_assert!(!points.is_empty() && points.len() <= MAX_POLYGON_VERTICES);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let count = points.len().min(MAX_POLYGON_VERTICES);
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        debug_assert!(index < self.count);
        self.vertices[index]
    }

    /// Index of the vertex farthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    pub fn support_vertex(&self, d: Vec2) -> Vec2 {
        self.vertices[self.support(d)]
    }
}

/// Warm-start data carried between GJK calls on the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceOutput {
    /// Closest point on shape A.
    pub point_a: Vec2,
    /// Closest point on shape B.
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point in proxy A.
    w_a: Vec2,
    /// Support point in proxy B.
    w_b: Vec2,
    /// `w_b - w_a`
    w: Vec2,
    /// Barycentric coordinate for the closest point.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        &mut self,
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) {
        debug_assert!(cache.count <= 3);

        self.count = cache.count;
        for i in 0..self.count {
            let v = &mut self.v[i];
            v.index_a = cache.index_a[i];
            v.index_b = cache.index_b[i];
            v.w_a = xf_a.apply(proxy_a.vertex(v.index_a));
            v.w_b = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.w_b - v.w_a;
            v.a = 0.0;
        }

        // Flush the cache if the metric changed a lot.
        if self.count > 1 {
            let metric1 = cache.metric;
            let metric2 = self.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < EPSILON {
                self.count = 0;
            }
        }

        if self.count == 0 {
            let v = &mut self.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.w_a = xf_a.apply(proxy_a.vertex(0));
            v.w_b = xf_b.apply(proxy_b.vertex(0));
            v.w = v.w_b - v.w_a;
            v.a = 1.0;
            self.count = 1;
        }
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => {
                debug_assert!(false, "invalid simplex size {}", self.count);
                Vec2::ZERO
            }
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.w_a * v1.a + v2.w_a * v2.a,
                v1.w_b * v1.a + v2.w_b * v2.a,
            ),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => {
                debug_assert!(false, "invalid simplex size {}", self.count);
                (Vec2::ZERO, Vec2::ZERO)
            }
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, via barycentric regions.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest point on a triangle to the origin. Regions are tested vertex,
    /// then edge, then interior.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// GJK engine. Owned by the world pool; keeps call statistics.
#[derive(Debug, Clone, Default)]
pub struct Distance {
    pub gjk_calls: u32,
    pub gjk_iters: u32,
    pub gjk_max_iters: u32,
}

impl Distance {
    /// Closest points between two proxies. `cache` warm-starts the simplex and
    /// is updated for the next call.
    pub fn compute(&mut self, cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
        self.gjk_calls += 1;

        let proxy_a = &input.proxy_a;
        let proxy_b = &input.proxy_b;
        let xf_a = &input.transform_a;
        let xf_b = &input.transform_b;

        let mut simplex = Simplex::default();
        simplex.read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

        let mut save_a = [0usize; 3];
        let mut save_b = [0usize; 3];

        let mut iter = 0;
        while iter < MAX_GJK_ITERATIONS {
            let save_count = simplex.count;
            for i in 0..save_count {
                save_a[i] = simplex.v[i].index_a;
                save_b[i] = simplex.v[i].index_b;
            }

            match simplex.count {
                1 => {}
                2 => simplex.solve2(),
                3 => simplex.solve3(),
                _ => debug_assert!(false, "invalid simplex size {}", simplex.count),
            }

            // Origin is inside the triangle: overlap.
            if simplex.count == 3 {
                break;
            }

            let d = simplex.search_direction();
            // Origin is probably contained by a segment or a point.
            if d.length_squared() < EPSILON * EPSILON {
                break;
            }

            let vertex = &mut simplex.v[simplex.count];
            vertex.index_a = proxy_a.support(xf_a.q.apply_inv(-d));
            vertex.w_a = xf_a.apply(proxy_a.vertex(vertex.index_a));
            vertex.index_b = proxy_b.support(xf_b.q.apply_inv(d));
            vertex.w_b = xf_b.apply(proxy_b.vertex(vertex.index_b));
            vertex.w = vertex.w_b - vertex.w_a;

            iter += 1;
            self.gjk_iters += 1;

            // A repeated support point means no further progress.
            let (index_a, index_b) = (vertex.index_a, vertex.index_b);
            let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
            if duplicate {
                break;
            }

            simplex.count += 1;
        }

        self.gjk_max_iters = self.gjk_max_iters.max(iter);

        let (mut point_a, mut point_b) = simplex.witness_points();
        let mut distance = point_a.distance(point_b);
        simplex.write_cache(cache);

        if input.use_radii {
            let r_a = proxy_a.radius;
            let r_b = proxy_b.radius;

            if distance > r_a + r_b && distance > EPSILON {
                // Shapes are still not overlapped; move the witness points to
                // the outer surface.
                distance -= r_a + r_b;
                let normal = (point_b - point_a).normalize();
                point_a += normal * r_a;
                point_b -= normal * r_b;
            } else {
                let p = (point_a + point_b) * 0.5;
                point_a = p;
                point_b = p;
                distance = 0.0;
            }
        }

        DistanceOutput {
            point_a,
            point_b,
            distance,
            iterations: iter,
        }
    }
}
