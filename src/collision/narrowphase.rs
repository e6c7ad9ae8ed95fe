//! Narrow-phase manifold generation for each supported shape pair.
//!
//! Every function overwrites `manifold` in place. A manifold with zero points
//! means the shapes are not touching.

use glam::Vec2;

use crate::math::{cross_vs, Transform};
use crate::pooling::OrderedStack;
use crate::settings::{
    ANGULAR_SLOP, EPSILON, LINEAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES,
};
use crate::shape::{CircleShape, EdgeShape, PolygonShape, Shape};

use super::distance::{Distance, DistanceInput, DistanceProxy, SimplexCache};
use super::manifold::{
    clip_segment_to_line, ClipVertex, ContactFeatureType, ContactId, Manifold, ManifoldType,
};

/// Do two shape children overlap, ignoring manifolds? Used for sensors.
pub fn test_overlap(
    distance: &mut Distance,
    shape_a: &Shape,
    child_a: usize,
    shape_b: &Shape,
    child_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, child_a),
        proxy_b: DistanceProxy::new(shape_b, child_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance.compute(&mut cache, &input);
    output.distance < 10.0 * EPSILON
}

pub fn collide_circles(
    manifold: &mut Manifold,
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    let p_a = xf_a.apply(circle_a.center);
    let p_b = xf_b.apply(circle_b.center);
    let dist_sqr = p_a.distance_squared(p_b);
    let radius = circle_a.radius + circle_b.radius;
    if dist_sqr > radius * radius {
        return;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.center;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.center;
    manifold.points[0].id = ContactId::default();
}

pub fn collide_polygon_and_circle(
    manifold: &mut Manifold,
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Circle position in the frame of the polygon.
    let c = xf_b.apply(circle_b.center);
    let c_local = xf_a.apply_inv(c);

    // Find the min separating edge.
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = polygon_a.count();

    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out.
            return;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let vert_index1 = normal_index;
    let vert_index2 = (vert_index1 + 1) % count;
    let v1 = vertices[vert_index1];
    let v2 = vertices[vert_index2];

    let mut set = |local_normal: Vec2, local_point: Vec2| {
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::FaceA;
        manifold.local_normal = local_normal;
        manifold.local_point = local_point;
        manifold.points[0].local_point = circle_b.center;
        manifold.points[0].id = ContactId::default();
    };

    // Center is inside the polygon.
    if separation < EPSILON {
        set(normals[normal_index], (v1 + v2) * 0.5);
        return;
    }

    // Barycentric coordinates along the reference face.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return;
        }
        set((c_local - v1).normalize(), v1);
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return;
        }
        set((c_local - v2).normalize(), v2);
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[vert_index1]);
        if s > radius {
            return;
        }
        set(normals[vert_index1], face_center);
    }
}

/// Max separation between `poly1` and `poly2` using the edge normals of
/// `poly1`. Returns the edge index and the separation.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = -f32::MAX;
    for (i, (n1, v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // poly1 normal and vertex in the frame of poly2.
        let n = xf.q.apply(*n1);
        let v1 = xf.apply(*v1);

        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    debug_assert!(edge1 < poly1.count());

    // Reference edge normal in the frame of poly2.
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals()[edge1]));

    // Find the incident edge on poly2.
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.count();
    let clip = |i: usize| ClipVertex {
        v: xf2.apply(poly2.vertex(i)),
        id: ContactId::new(edge1, i, ContactFeatureType::Face, ContactFeatureType::Vertex),
    };
    [clip(i1), clip(i2)]
}

/// Polygon-polygon contact by separating axis, reference face selection and
/// clipping.
///
/// Face A is preferred unless face B separates noticeably more, which keeps
/// the reference face stable between steps.
pub fn collide_polygons(
    manifold: &mut Manifold,
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return;
    }

    let k_tol = 0.1 * LINEAR_SLOP;
    let (poly1, poly2, xf1, xf2, edge1, flip) = if separation_b > separation_a + k_tol {
        manifold.manifold_type = ManifoldType::FaceB;
        (poly_b, poly_a, xf_b, xf_a, edge_b, true)
    } else {
        manifold.manifold_type = ManifoldType::FaceA;
        (poly_a, poly_b, xf_a, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let iv1 = edge1;
    let iv2 = (edge1 + 1) % poly1.count();
    let mut v11 = poly1.vertex(iv1);
    let mut v12 = poly1.vertex(iv2);

    let local_tangent = (v12 - v11).normalize();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by the polygon skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip the incident edge against the extruded reference edge sides.
    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(&mut clip_points1, &incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return;
    }

    let np = clip_segment_to_line(&mut clip_points2, &clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cp in &clip_points2 {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let mp = &mut manifold.points[point_count];
            mp.local_point = xf2.apply_inv(cp.v);
            mp.id = if flip { cp.id.flipped() } else { cp.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
}

/// Edge-circle contact by Voronoi region. Ghost vertices reject contacts that
/// belong to a neighbouring edge.
pub fn collide_edge_and_circle(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Circle in the frame of the edge.
    let q = xf_a.apply_inv(xf_b.apply(circle_b.center));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let mut set = |manifold_type: ManifoldType,
                   local_normal: Vec2,
                   local_point: Vec2,
                   index_a: usize,
                   type_a: ContactFeatureType| {
        manifold.point_count = 1;
        manifold.manifold_type = manifold_type;
        manifold.local_normal = local_normal;
        manifold.local_point = local_point;
        manifold.points[0].id = ContactId::new(index_a, 0, type_a, ContactFeatureType::Vertex);
        manifold.points[0].local_point = circle_b.center;
    };

    // Region A
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return;
        }

        // Is there an edge connected to A?
        if let Some(a1) = edge_a.vertex0 {
            let e1 = a - a1;
            let u1 = e1.dot(a - q);

            // Is the circle in region AB of the previous edge?
            if u1 > 0.0 {
                return;
            }
        }

        set(ManifoldType::Circles, Vec2::ZERO, a, 0, ContactFeatureType::Vertex);
        return;
    }

    // Region B
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return;
        }

        // Is there an edge connected to B?
        if let Some(b2) = edge_a.vertex3 {
            let e2 = b2 - b;
            let v2 = e2.dot(q - b);

            // Is the circle in region AB of the next edge?
            if v2 > 0.0 {
                return;
            }
        }

        set(ManifoldType::Circles, Vec2::ZERO, b, 1, ContactFeatureType::Vertex);
        return;
    }

    // Region AB
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (a * u + b * v) / den;
    if q.distance_squared(p) > radius * radius {
        return;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    set(ManifoldType::FaceA, n.normalize(), a, 0, ContactFeatureType::Face);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpAxisType {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct EpAxis {
    axis_type: EpAxisType,
    index: usize,
    separation: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f32,
    side_normal2: Vec2,
    side_offset2: f32,
}

/// Polygon B expressed in the frame of edge A.
struct TempPolygon<'a> {
    vertices: &'a [Vec2],
    normals: &'a [Vec2],
}

/// Edge-polygon collision state. The edge normal is smoothed against the
/// ghost vertices so polygons slide across chain joints.
struct EpCollider<'a> {
    polygon_b: TempPolygon<'a>,
    xf: Transform,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    lower_limit: Vec2,
    upper_limit: Vec2,
    radius: f32,
    front: bool,
}

impl EpCollider<'_> {
    fn compute_edge_separation(&self) -> EpAxis {
        let separation = self
            .polygon_b
            .vertices
            .iter()
            .map(|v| self.normal.dot(*v - self.v1))
            .fold(f32::MAX, f32::min);

        EpAxis {
            axis_type: EpAxisType::EdgeA,
            index: if self.front { 0 } else { 1 },
            separation,
        }
    }

    fn compute_polygon_separation(&self) -> EpAxis {
        let mut axis = EpAxis {
            axis_type: EpAxisType::Unknown,
            index: 0,
            separation: -f32::MAX,
        };

        let perp = Vec2::new(-self.normal.y, self.normal.x);

        for (i, (nb, vb)) in self
            .polygon_b
            .normals
            .iter()
            .zip(self.polygon_b.vertices)
            .enumerate()
        {
            let n = -*nb;

            let s1 = n.dot(*vb - self.v1);
            let s2 = n.dot(*vb - self.v2);
            let s = s1.min(s2);

            if s > self.radius {
                // No collision.
                return EpAxis {
                    axis_type: EpAxisType::EdgeB,
                    index: i,
                    separation: s,
                };
            }

            // Adjacency
            if n.dot(perp) >= 0.0 {
                if (n - self.upper_limit).dot(self.normal) < -ANGULAR_SLOP {
                    continue;
                }
            } else if (n - self.lower_limit).dot(self.normal) < -ANGULAR_SLOP {
                continue;
            }

            if s > axis.separation {
                axis = EpAxis {
                    axis_type: EpAxisType::EdgeB,
                    index: i,
                    separation: s,
                };
            }
        }

        axis
    }
}

/// Edge-polygon contact. `scratch` holds polygon B transformed into the
/// edge's frame.
pub fn collide_edge_and_polygon(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
    scratch: &mut OrderedStack<Vec2>,
) {
    manifold.point_count = 0;

    let count = polygon_b.count();
    // Worlds reject pools smaller than MIN_POOL_SIZE, so this cannot fail
    // during a step.
    let checkout = scratch.checkout(2 * MAX_POLYGON_VERTICES);
    debug_assert!(checkout.is_ok(), "vec2 stack below MIN_POOL_SIZE");
    let Ok(mut buffer) = checkout else {
        tracing::error!("vec2 stack below MIN_POOL_SIZE; edge-polygon contact dropped");
        return;
    };

    let xf = xf_a.mul_t(xf_b);
    let centroid_b = xf.apply(polygon_b.centroid);

    let v0 = edge_a.vertex0;
    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;
    let v3 = edge_a.vertex3;

    let edge1 = (v2 - v1).normalize();
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    // Is there a preceding edge?
    let prev = v0.map(|v0| {
        let edge0 = (v1 - v0).normalize();
        let normal0 = Vec2::new(edge0.y, -edge0.x);
        let convex = crate::math::cross(edge0, edge1) >= 0.0;
        (normal0, normal0.dot(centroid_b - v0), convex)
    });

    // Is there a following edge?
    let next = v3.map(|v3| {
        let edge2 = (v3 - v2).normalize();
        let normal2 = Vec2::new(edge2.y, -edge2.x);
        let convex = crate::math::cross(edge1, edge2) > 0.0;
        (normal2, normal2.dot(centroid_b - v2), convex)
    });

    // Determine front or back collision and the collision normal limits.
    let (front, normal, lower_limit, upper_limit) = match (prev, next) {
        (Some((normal0, offset0, convex1)), Some((normal2, offset2, convex2))) => {
            if convex1 && convex2 {
                let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    (true, normal1, normal0, normal2)
                } else {
                    (false, -normal1, -normal1, -normal1)
                }
            } else if convex1 {
                let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                if front {
                    (true, normal1, normal0, normal1)
                } else {
                    (false, -normal1, -normal2, -normal1)
                }
            } else if convex2 {
                let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                if front {
                    (true, normal1, normal1, normal2)
                } else {
                    (false, -normal1, -normal1, -normal0)
                }
            } else {
                let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    (true, normal1, normal1, normal1)
                } else {
                    (false, -normal1, -normal2, -normal0)
                }
            }
        }
        (Some((normal0, offset0, convex1)), None) => {
            if convex1 {
                let front = offset0 >= 0.0 || offset1 >= 0.0;
                if front {
                    (true, normal1, normal0, -normal1)
                } else {
                    (false, -normal1, normal1, -normal1)
                }
            } else {
                let front = offset0 >= 0.0 && offset1 >= 0.0;
                if front {
                    (true, normal1, normal1, -normal1)
                } else {
                    (false, -normal1, normal1, -normal0)
                }
            }
        }
        (None, Some((normal2, offset2, convex2))) => {
            if convex2 {
                let front = offset1 >= 0.0 || offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal2)
                } else {
                    (false, -normal1, -normal1, normal1)
                }
            } else {
                let front = offset1 >= 0.0 && offset2 >= 0.0;
                if front {
                    (true, normal1, -normal1, normal1)
                } else {
                    (false, -normal1, -normal2, normal1)
                }
            }
        }
        (None, None) => {
            let front = offset1 >= 0.0;
            if front {
                (true, normal1, -normal1, -normal1)
            } else {
                (false, -normal1, normal1, normal1)
            }
        }
    };

    // Get polygon B in frame A.
    let (vertices, normals) = buffer.split_at_mut(MAX_POLYGON_VERTICES);
    for i in 0..count {
        vertices[i] = xf.apply(polygon_b.vertex(i));
        normals[i] = xf.q.apply(polygon_b.normals()[i]);
    }

    let collider = EpCollider {
        polygon_b: TempPolygon {
            vertices: &vertices[..count],
            normals: &normals[..count],
        },
        xf,
        v1,
        v2,
        normal,
        lower_limit,
        upper_limit,
        radius: polygon_b.radius + edge_a.radius,
        front,
    };

    let edge_axis = collider.compute_edge_separation();
    if edge_axis.separation > collider.radius {
        return;
    }

    let polygon_axis = collider.compute_polygon_separation();
    if polygon_axis.axis_type != EpAxisType::Unknown && polygon_axis.separation > collider.radius {
        return;
    }

    // Hysteresis for jitter reduction.
    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.001;

    let primary_axis = if polygon_axis.axis_type == EpAxisType::Unknown {
        edge_axis
    } else if polygon_axis.separation > RELATIVE_TOL * edge_axis.separation + ABSOLUTE_TOL {
        polygon_axis
    } else {
        edge_axis
    };

    let poly = &collider.polygon_b;
    let mut incident = [ClipVertex::default(); 2];
    let mut rf = ReferenceFace::default();

    if primary_axis.axis_type == EpAxisType::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Polygon normal most anti-parallel to the edge normal.
        let mut best_index = 0;
        let mut best_value = collider.normal.dot(poly.normals[0]);
        for i in 1..count {
            let value = collider.normal.dot(poly.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = (i1 + 1) % count;

        incident[0] = ClipVertex {
            v: poly.vertices[i1],
            id: ContactId::new(0, i1, ContactFeatureType::Face, ContactFeatureType::Vertex),
        };
        incident[1] = ClipVertex {
            v: poly.vertices[i2],
            id: ContactId::new(0, i2, ContactFeatureType::Face, ContactFeatureType::Vertex),
        };

        if collider.front {
            rf.i1 = 0;
            rf.i2 = 1;
            rf.v1 = collider.v1;
            rf.v2 = collider.v2;
            rf.normal = normal1;
        } else {
            rf.i1 = 1;
            rf.i2 = 0;
            rf.v1 = collider.v2;
            rf.v2 = collider.v1;
            rf.normal = -normal1;
        }
    } else {
        manifold.manifold_type = ManifoldType::FaceB;

        let index = primary_axis.index;
        incident[0] = ClipVertex {
            v: collider.v1,
            id: ContactId::new(0, index, ContactFeatureType::Vertex, ContactFeatureType::Face),
        };
        incident[1] = ClipVertex {
            v: collider.v2,
            id: ContactId::new(0, index, ContactFeatureType::Vertex, ContactFeatureType::Face),
        };

        rf.i1 = index;
        rf.i2 = (index + 1) % count;
        rf.v1 = poly.vertices[rf.i1];
        rf.v2 = poly.vertices[rf.i2];
        rf.normal = poly.normals[rf.i1];
    }

    rf.side_normal1 = Vec2::new(rf.normal.y, -rf.normal.x);
    rf.side_normal2 = -rf.side_normal1;
    rf.side_offset1 = rf.side_normal1.dot(rf.v1);
    rf.side_offset2 = rf.side_normal2.dot(rf.v2);

    // Clip the incident edge against the reference face side planes.
    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(
        &mut clip_points1,
        &incident,
        rf.side_normal1,
        rf.side_offset1,
        rf.i1,
    );
    if np < MAX_MANIFOLD_POINTS {
        return;
    }

    let np = clip_segment_to_line(
        &mut clip_points2,
        &clip_points1,
        rf.side_normal2,
        rf.side_offset2,
        rf.i2,
    );
    if np < MAX_MANIFOLD_POINTS {
        return;
    }

    // Now clip_points2 contains the clipped points.
    if primary_axis.axis_type == EpAxisType::EdgeA {
        manifold.local_normal = rf.normal;
        manifold.local_point = rf.v1;
    } else {
        manifold.local_normal = polygon_b.normals()[rf.i1];
        manifold.local_point = polygon_b.vertex(rf.i1);
    }

    let mut point_count = 0;
    for cp in &clip_points2 {
        let separation = rf.normal.dot(cp.v - rf.v1);
        if separation <= collider.radius {
            let mp = &mut manifold.points[point_count];
            if primary_axis.axis_type == EpAxisType::EdgeA {
                mp.local_point = collider.xf.apply_inv(cp.v);
                mp.id = cp.id;
            } else {
                mp.local_point = cp.v;
                mp.id = cp.id.flipped();
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
}
