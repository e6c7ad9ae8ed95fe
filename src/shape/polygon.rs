//! Convex polygon shape.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::error::ShapeError;
use crate::math::{cross, cross_vs, Rot, Transform};
use crate::settings::{EPSILON, LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

use super::MassData;

/// A solid convex polygon with counter-clockwise winding.
///
/// Vertices, normals and centroid are in body space. At most
/// [`MAX_POLYGON_VERTICES`] vertices are stored inline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonShape {
    pub centroid: Vec2,
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl PolygonShape {
    /// Build the convex hull of `points`.
    ///
    /// Points closer than half the linear slop are welded together. Fails when
    /// fewer than three distinct points remain or they are collinear.
    pub fn new(points: &[Vec2]) -> Result<Self, ShapeError> {
        if points.len() < 3 {
            return Err(ShapeError::TooFewVertices {
                min: 3,
                got: points.len(),
            });
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(ShapeError::TooManyVertices {
                max: MAX_POLYGON_VERTICES,
                got: points.len(),
            });
        }

        // Weld near-duplicate points.
        let weld = 0.5 * LINEAR_SLOP;
        let mut ps = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut n = 0;
        for &v in points {
            if ps[..n]
                .iter()
                .all(|p| v.distance_squared(*p) >= weld * weld)
            {
                ps[n] = v;
                n += 1;
            }
        }
        if n < 3 {
            tracing::warn!(points = points.len(), welded = n, "polygon points collapse");
            return Err(ShapeError::DegenerateHull);
        }

        // Gift wrapping, starting from the right-most (then lowest) point.
        let mut i0 = 0;
        for i in 1..n {
            let x = ps[i].x;
            if x > ps[i0].x || (x == ps[i0].x && ps[i].y < ps[i0].y) {
                i0 = i;
            }
        }

        let mut hull = [0usize; MAX_POLYGON_VERTICES];
        let mut m = 0;
        let mut ih = i0;
        loop {
            if m == MAX_POLYGON_VERTICES {
                return Err(ShapeError::DegenerateHull);
            }
            hull[m] = ih;

            let mut ie = 0;
            for j in 1..n {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[hull[m]];
                let v = ps[j] - ps[hull[m]];
                let c = cross(r, v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinear: keep the farthest point.
                if c == 0.0 && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }

            m += 1;
            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if m < 3 {
            return Err(ShapeError::DegenerateHull);
        }

        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        for (slot, &index) in vertices.iter_mut().zip(&hull[..m]) {
            *slot = ps[index];
        }

        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..m {
            let edge = vertices[(i + 1) % m] - vertices[i];
            if edge.length_squared() <= EPSILON * EPSILON {
                return Err(ShapeError::VerticesTooClose {
                    index: i,
                    next: (i + 1) % m,
                });
            }
            normals[i] = cross_vs(edge, 1.0).normalize();
        }

        let centroid = compute_centroid(&vertices[..m]);
        Ok(Self {
            centroid,
            vertices,
            normals,
            count: m,
            radius: POLYGON_RADIUS,
        })
    }

    /// Axis-aligned box with half-widths `hx`, `hy` centered on the body origin.
    pub fn new_box(hx: f32, hy: f32) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..4].copy_from_slice(&[
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ]);
        normals[..4].copy_from_slice(&[
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ]);
        Self {
            centroid: Vec2::ZERO,
            vertices,
            normals,
            count: 4,
            radius: POLYGON_RADIUS,
        }
    }

    /// Box rotated by `angle` and offset to `center` in body space.
    pub fn new_oriented_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> Self {
        let mut shape = Self::new_box(hx, hy);
        let xf = Transform {
            p: center,
            q: Rot::from_angle(angle),
        };
        for i in 0..shape.count {
            shape.vertices[i] = xf.apply(shape.vertices[i]);
            shape.normals[i] = xf.q.apply(shape.normals[i]);
        }
        shape.centroid = center;
        shape
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    #[inline]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Check that every vertex lies on the inner side of every edge.
    pub fn validate(&self) -> bool {
        let n = self.count;
        for i in 0..n {
            let p = self.vertices[i];
            let e = self.vertices[(i + 1) % n] - p;
            for j in 0..n {
                if j == i || j == (i + 1) % n {
                    continue;
                }
                if cross(e, self.vertices[j] - p) < 0.0 {
                    return false;
                }
            }
        }
        true
    }

    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.apply_inv(p);
        self.normals()
            .iter()
            .zip(self.vertices())
            .all(|(n, v)| n.dot(local - *v) <= 0.0)
    }

    pub fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame of reference.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0f32;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // The segment enters this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // The segment exits this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.q.apply(self.normals[i]),
            fraction: lower,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let first = xf.apply(self.vertices[0]);
        let (lower, upper) = self.vertices()[1..]
            .iter()
            .map(|v| xf.apply(*v))
            .fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let r = Vec2::splat(self.radius);
        Aabb::new(lower - r, upper + r)
    }

    /// Mass by triangle fan about the first vertex, with inertia about the
    /// body origin.
    pub fn compute_mass(&self, density: f32) -> MassData {
        let s = self.vertices[0];
        let inv3 = 1.0 / 3.0;

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % self.count] - s;

            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;

            center += (e1 + e2) * (triangle_area * inv3);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        if area > EPSILON {
            center /= area;
        }
        let world_center = center + s;

        // Shift from the reference point to the center, then to the origin.
        let inertia = density * inertia
            + mass * (world_center.dot(world_center) - center.dot(center));

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    pub fn compute_distance_to_out(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let local = xf.apply_inv(p);

        let mut max_distance = -f32::MAX;
        let mut normal_for_max = local;
        for i in 0..self.count {
            let dot = self.normals[i].dot(local - self.vertices[i]);
            if dot > max_distance {
                max_distance = dot;
                normal_for_max = self.normals[i];
            }
        }

        let (distance, normal) = if max_distance > 0.0 {
            let mut min_distance = normal_for_max;
            let mut min_distance2 = max_distance * max_distance;
            for v in self.vertices() {
                let d = local - *v;
                let d2 = d.length_squared();
                if min_distance2 > d2 {
                    min_distance = d;
                    min_distance2 = d2;
                }
            }
            (min_distance2.sqrt(), min_distance.normalize_or_zero())
        } else {
            (max_distance, normal_for_max)
        };

        (distance, xf.q.apply(normal))
    }
}

fn compute_centroid(vs: &[Vec2]) -> Vec2 {
    let s = vs[0];
    let inv3 = 1.0 / 3.0;
    let mut c = Vec2::ZERO;
    let mut area = 0.0;

    for i in 0..vs.len() {
        let e1 = vs[i] - s;
        let e2 = vs[(i + 1) % vs.len()] - s;
        let triangle_area = 0.5 * cross(e1, e2);
        area += triangle_area;
        c += (e1 + e2) * (triangle_area * inv3);
    }

    if area > EPSILON {
        c /= area;
    }
    c + s
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn test_hull_drops_interior_points() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let poly = PolygonShape::new(&points).unwrap();
        assert_eq!(poly.count(), 4);
        assert!(poly.validate());
        assert!((poly.centroid - Vec2::new(1.0, 1.0)).length() < EPS);
    }

    #[test]
    fn test_hull_rejects_collinear_points() {
        let points = [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert_eq!(PolygonShape::new(&points), Err(ShapeError::DegenerateHull));
        assert_eq!(
            PolygonShape::new(&[Vec2::ZERO, Vec2::X]),
            Err(ShapeError::TooFewVertices { min: 3, got: 2 })
        );
    }

    #[test]
    fn test_hull_welds_duplicates() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0001, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        let poly = PolygonShape::new(&points).unwrap();
        assert_eq!(poly.count(), 3);
    }

    #[test]
    fn test_box_mass() {
        let poly = PolygonShape::new_box(1.0, 0.5);
        let mass = poly.compute_mass(2.0);
        assert!((mass.mass - 4.0).abs() < EPS);
        assert!(mass.center.length() < EPS);
        // I = m * (w^2 + h^2) / 12 with w = 2, h = 1.
        assert!((mass.inertia - 4.0 * 5.0 / 12.0).abs() < EPS);
    }

    #[test]
    fn test_oriented_box_mass_includes_offset() {
        let poly = PolygonShape::new_oriented_box(0.5, 0.5, Vec2::new(2.0, 0.0), 0.3);
        let mass = poly.compute_mass(1.0);
        assert!((mass.mass - 1.0).abs() < EPS);
        assert!((mass.center - Vec2::new(2.0, 0.0)).length() < EPS);
        assert!((mass.inertia - (1.0 / 6.0 + 4.0)).abs() < 1e-3);
    }

    #[test]
    fn test_polygon_raycast() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let xf = Transform::from_translation(Vec2::new(4.0, 0.0));
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(8.0, 0.0));
        let hit = poly.raycast(&input, &xf).unwrap();
        assert!((hit.fraction - 3.0 / 8.0).abs() < EPS);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < EPS);

        // Starting inside reports no hit.
        let inside = RayCastInput::new(Vec2::new(4.0, 0.0), Vec2::new(8.0, 0.0));
        assert!(poly.raycast(&inside, &xf).is_none());
    }

    #[test]
    fn test_polygon_aabb_contains_vertices() {
        let poly = PolygonShape::new_box(1.0, 0.5);
        let xf = Transform::new(Vec2::new(1.0, -1.0), 0.7);
        let aabb = poly.compute_aabb(&xf);
        for v in poly.vertices() {
            assert!(aabb.contains_point(xf.apply(*v)));
        }
        assert!(poly.test_point(&xf, Vec2::new(1.0, -1.0)));
        assert!(!poly.test_point(&xf, Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn test_polygon_distance_to_out() {
        let poly = PolygonShape::new_box(1.0, 1.0);
        let (inside, normal) = poly.compute_distance_to_out(&Transform::IDENTITY, Vec2::new(0.5, 0.0));
        assert!((inside + 0.5).abs() < EPS);
        assert!((normal - Vec2::X).length() < EPS);

        let (outside, _) = poly.compute_distance_to_out(&Transform::IDENTITY, Vec2::new(0.0, 3.0));
        assert!((outside - 2.0).abs() < EPS);
    }
}
