//! Sequential impulse contact solver.
//!
//! Velocity constraints are solved with accumulated impulses and friction
//! clamped to the normal impulse. Two-point manifolds use a block solver so
//! both points are resolved together. Position drift is removed with
//! Baumgarte-style pseudo impulses applied directly to positions.

use glam::{Mat2, Vec2};
use slotmap::SlotMap;

use crate::collision::manifold::{ManifoldType, WorldManifold};
use crate::math::{cross, cross_sv, cross_vs, Rot, Transform};
use crate::settings::MAX_MANIFOLD_POINTS;

use super::callbacks::ContactImpulse;
use super::contact::Contact;
use super::rigid_body::Body;
use super::{BodyHandle, ContactKey, SolverData, TimeStep};

/// Condition number bound for the block solver's effective mass.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
    contact: ContactKey,
}

#[derive(Debug, Clone, Copy, Default)]
struct ContactPositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    manifold_type: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

/// Contact normal, point and separation for one manifold point at the
/// current solver positions.
struct PositionSolverManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionSolverManifold {
    fn new(
        pc: &ContactPositionConstraint,
        xf_a: &Transform,
        xf_b: &Transform,
        index: usize,
    ) -> Self {
        debug_assert!(pc.point_count > 0);
        match pc.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(pc.local_point);
                let point_b = xf_b.apply(pc.local_points[0]);
                let normal = (point_b - point_a).normalize_or_zero();
                Self {
                    normal,
                    point: (point_a + point_b) * 0.5,
                    separation: (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.apply(pc.local_normal);
                let plane_point = xf_a.apply(pc.local_point);
                let clip_point = xf_b.apply(pc.local_points[index]);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(pc.local_normal);
                let plane_point = xf_b.apply(pc.local_point);
                let clip_point = xf_a.apply(pc.local_points[index]);
                Self {
                    // Ensure the normal points from A to B.
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
        }
    }
}

/// Origin transform of a body from its solver position.
#[inline]
fn solver_transform(c: Vec2, a: f32, local_center: Vec2) -> Transform {
    let q = Rot::from_angle(a);
    Transform {
        p: c - q.apply(local_center),
        q,
    }
}

/// Constraint storage reused across islands.
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    /// Build constraints for the island's touching contacts. Bodies must
    /// already carry their island index.
    pub fn init(
        &mut self,
        step: &TimeStep,
        keys: &[ContactKey],
        contacts: &SlotMap<ContactKey, Contact>,
        bodies: &SlotMap<BodyHandle, Body>,
    ) {
        self.velocity_constraints.clear();
        self.position_constraints.clear();

        for &key in keys {
            let Some(contact) = contacts.get(key) else {
                continue;
            };
            let (Some(body_a), Some(body_b)) =
                (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };
            let manifold = &contact.manifold;
            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);

            let mut vc = ContactVelocityConstraint {
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count,
                contact: key,
                ..Default::default()
            };

            let mut pc = ContactPositionConstraint {
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                manifold_type: manifold.manifold_type,
                radius_a: contact.radius_a,
                radius_b: contact.radius_b,
                point_count,
                ..Default::default()
            };

            for (j, cp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * cp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * cp.tangent_impulse;
                }
                pc.local_points[j] = cp.local_point;
            }

            self.velocity_constraints.push(vc);
            self.position_constraints.push(pc);
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.velocity_constraints.len()
    }

    /// Anchors, effective masses and restitution bias from the current
    /// positions and velocities.
    pub fn initialize_velocity_constraints(
        &mut self,
        data: &SolverData<'_>,
        contacts: &SlotMap<ContactKey, Contact>,
    ) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(self.position_constraints.iter())
        {
            let Some(contact) = contacts.get(vc.contact) else {
                continue;
            };

            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let (c_a, a_a) = (data.positions[vc.index_a].c, data.positions[vc.index_a].a);
            let (c_b, a_b) = (data.positions[vc.index_b].c, data.positions[vc.index_b].a);
            let v_a = data.velocities[vc.index_a];
            let v_b = data.velocities[vc.index_b];

            let xf_a = solver_transform(c_a, a_a, pc.local_center_a);
            let xf_b = solver_transform(c_b, a_b, pc.local_center_b);

            let wm = WorldManifold::new(&contact.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            vc.normal = wm.normal;
            let tangent = cross_vs(vc.normal, 1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];

                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = cross(vcp.r_a, vc.normal);
                let rn_b = cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(vcp.r_a, tangent);
                let rt_b = cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Velocity bias for restitution.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b.v + cross_sv(v_b.w, vcp.r_b) - v_a.v - cross_sv(v_a.w, vcp.r_a),
                );
                if v_rel < -data.tuning.velocity_threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Prepare the block solver.
            if vc.point_count == 2 {
                let [vcp1, vcp2] = &vc.points;
                let rn1_a = cross(vcp1.r_a, vc.normal);
                let rn1_b = cross(vcp1.r_b, vc.normal);
                let rn2_a = cross(vcp2.r_a, vc.normal);
                let rn2_b = cross(vcp2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    // K is safe to invert.
                    vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // The constraints are redundant, just use one.
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply last step's accumulated impulses.
    pub fn warm_start(&self, data: &mut SolverData<'_>) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let mut v_a = data.velocities[vc.index_a];
            let mut v_b = data.velocities[vc.index_b];

            let tangent = cross_vs(vc.normal, 1.0);
            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                v_a.w -= i_a * cross(vcp.r_a, p);
                v_a.v -= p * m_a;
                v_b.w += i_b * cross(vcp.r_b, p);
                v_b.v += p * m_b;
            }

            data.velocities[vc.index_a] = v_a;
            data.velocities[vc.index_b] = v_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let mut v_a = data.velocities[vc.index_a].v;
            let mut w_a = data.velocities[vc.index_a].w;
            let mut v_b = data.velocities[vc.index_b].v;
            let mut w_b = data.velocities[vc.index_b].w;

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let friction = vc.friction;

            debug_assert!(vc.point_count == 1 || vc.point_count == 2);

            // Solve tangent constraints first because non-penetration is more
            // important than friction.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                // Clamp the accumulated force.
                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += p * m_b;
                w_b += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);
                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = normal * lambda;
                v_a -= p * m_a;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += p * m_b;
                w_b += i_b * cross(vcp.r_b, p);
            } else {
                // Block solver: find x with vn = A * x + b, vn >= 0, x >= 0
                // and vn_i * x_i = 0 by enumerating the four cases of the
                // linear complementarity problem.
                let [cp1, cp2] = &mut vc.points;
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(a.x >= 0.0 && a.y >= 0.0);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k * a;

                let mut apply = |x: Vec2,
                                 cp1: &mut VelocityConstraintPoint,
                                 cp2: &mut VelocityConstraintPoint| {
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    cp1.normal_impulse = x.x;
                    cp2.normal_impulse = x.y;
                };

                // Case 1: both constraints active, vn = 0.
                let x = -(vc.normal_mass * b);
                if x.x >= 0.0 && x.y >= 0.0 {
                    apply(x, cp1, cp2);
                } else {
                    // Case 2: only the first point active, vn1 = 0, x2 = 0.
                    let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                    let vn2 = vc.k.x_axis.y * x.x + b.y;
                    if x.x >= 0.0 && vn2 >= 0.0 {
                        apply(x, cp1, cp2);
                    } else {
                        // Case 3: only the second point active, vn2 = 0, x1 = 0.
                        let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                        let vn1 = vc.k.y_axis.x * x.y + b.x;
                        if x.y >= 0.0 && vn1 >= 0.0 {
                            apply(x, cp1, cp2);
                        } else if b.x >= 0.0 && b.y >= 0.0 {
                            // Case 4: both separating, x = 0.
                            apply(Vec2::ZERO, cp1, cp2);
                        }
                        // No solution, give up. This is hit sometimes but it
                        // doesn't seem to matter.
                    }
                }
            }

            data.velocities[vc.index_a].v = v_a;
            data.velocities[vc.index_a].w = w_a;
            data.velocities[vc.index_b].v = v_b;
            data.velocities[vc.index_b].w = w_b;
        }
    }

    /// Write accumulated impulses back to the manifolds for warm starting.
    pub fn store_impulses(&self, contacts: &mut SlotMap<ContactKey, Contact>) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact) else {
                continue;
            };
            for (mp, vcp) in contact
                .manifold
                .points_mut()
                .iter_mut()
                .zip(vc.points.iter())
            {
                mp.normal_impulse = vcp.normal_impulse;
                mp.tangent_impulse = vcp.tangent_impulse;
            }
        }
    }

    /// Impulses applied to each contact, in constraint order.
    pub fn impulses(&self) -> impl Iterator<Item = (ContactKey, ContactImpulse)> + '_ {
        self.velocity_constraints.iter().map(|vc| {
            let mut impulse = ContactImpulse {
                count: vc.point_count,
                ..Default::default()
            };
            for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
                impulse.normal_impulses[j] = vcp.normal_impulse;
                impulse.tangent_impulses[j] = vcp.tangent_impulse;
            }
            (vc.contact, impulse)
        })
    }

    /// Push overlapping bodies apart. Returns true once the worst overlap is
    /// within tolerance.
    pub fn solve_position_constraints(&self, data: &mut SolverData<'_>) -> bool {
        let baumgarte = data.tuning.baumgarte;
        let min_separation = self.solve_positions(data, baumgarte, |pc| {
            (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b)
        });

        // We can't expect min_separation >= -linear_slop because we don't
        // push the separation above -linear_slop.
        min_separation >= -3.0 * data.tuning.linear_slop
    }

    /// Position correction for a time of impact sub-step. Only the two TOI
    /// bodies move.
    pub fn solve_toi_position_constraints(
        &self,
        data: &mut SolverData<'_>,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let baumgarte = data.tuning.toi_baumgarte;
        let min_separation = self.solve_positions(data, baumgarte, |pc| {
            let moves = |index: usize| index == toi_index_a || index == toi_index_b;
            let (m_a, i_a) = if moves(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if moves(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };
            (m_a, i_a, m_b, i_b)
        });

        min_separation >= -1.5 * data.tuning.linear_slop
    }

    fn solve_positions(
        &self,
        data: &mut SolverData<'_>,
        baumgarte: f32,
        masses: impl Fn(&ContactPositionConstraint) -> (f32, f32, f32, f32),
    ) -> f32 {
        let linear_slop = data.tuning.linear_slop;
        let max_correction = data.tuning.max_linear_correction;
        let mut min_separation = 0.0f32;

        for pc in &self.position_constraints {
            let (m_a, i_a, m_b, i_b) = masses(pc);

            let mut c_a = data.positions[pc.index_a].c;
            let mut a_a = data.positions[pc.index_a].a;
            let mut c_b = data.positions[pc.index_b].c;
            let mut a_b = data.positions[pc.index_b].a;

            // Solve normal constraints.
            for j in 0..pc.point_count {
                let xf_a = solver_transform(c_a, a_a, pc.local_center_a);
                let xf_b = solver_transform(c_b, a_b, pc.local_center_b);

                let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);
                let normal = psm.normal;

                let r_a = psm.point - c_a;
                let r_b = psm.point - c_b;

                // Track max constraint error.
                min_separation = min_separation.min(psm.separation);

                // Prevent large corrections and allow slop.
                let c = (baumgarte * (psm.separation + linear_slop)).clamp(-max_correction, 0.0);

                // Compute the effective mass.
                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                // Compute normal impulse.
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = normal * impulse;

                c_a -= p * m_a;
                a_a -= i_a * cross(r_a, p);
                c_b += p * m_b;
                a_b += i_b * cross(r_b, p);
            }

            data.positions[pc.index_a].c = c_a;
            data.positions[pc.index_a].a = a_a;
            data.positions[pc.index_b].c = c_b;
            data.positions[pc.index_b].a = a_b;
        }

        min_separation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::contact::ContactKind;
    use crate::dynamics::fixture::{Fixture, FixtureDef};
    use crate::dynamics::rigid_body::BodyDef;
    use crate::dynamics::{FixtureHandle, PhysicsConfig, Position, SolverTuning, Velocity};
    use crate::pooling::WorldPool;
    use crate::shape::PolygonShape;

    struct Stack {
        bodies: SlotMap<BodyHandle, Body>,
        contacts: SlotMap<ContactKey, Contact>,
        key: ContactKey,
    }

    /// A unit box overlapping a static ground slab by `overlap`.
    fn box_on_ground(overlap: f32) -> Stack {
        let mut bodies: SlotMap<BodyHandle, Body> = SlotMap::with_key();
        let ground = bodies.insert(Body::new(&BodyDef::fixed(Vec2::ZERO)));
        let boxed = bodies.insert(Body::new(&BodyDef::dynamic(Vec2::new(0.0, 1.0 - overlap))));

        let ground_fixture = Fixture::new(ground, &FixtureDef::new(PolygonShape::new_box(5.0, 0.5)));
        let box_fixture = Fixture::new(
            boxed,
            &FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0),
        );
        let mass = box_fixture.mass_data();
        bodies[boxed].apply_mass_data(&mass);
        bodies[ground].island_index = 0;
        bodies[boxed].island_index = 1;

        let mut contact = Contact::default();
        contact.init(
            ContactKind::Polygon,
            FixtureHandle::default(),
            &ground_fixture,
            0,
            FixtureHandle::default(),
            &box_fixture,
            0,
        );
        let mut pool = WorldPool::new(16, 2);
        let xf_a = bodies[ground].xf;
        let xf_b = bodies[boxed].xf;
        contact.update(&ground_fixture, &box_fixture, &xf_a, &xf_b, &mut pool, None);
        assert_eq!(contact.manifold().point_count, 2);

        let mut contacts = SlotMap::with_key();
        let key = contacts.insert(contact);
        Stack {
            bodies,
            contacts,
            key,
        }
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn test_block_solver_stops_falling_box() {
        let mut stack = box_on_ground(0.0);
        let mut positions = [
            Position::default(),
            Position {
                c: Vec2::new(0.0, 1.0),
                a: 0.0,
            },
        ];
        let mut velocities = [
            Velocity::default(),
            Velocity {
                v: Vec2::new(0.0, -2.0),
                w: 0.0,
            },
        ];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };

        let mut solver = ContactSolver::default();
        solver.init(&data.step, &[stack.key], &stack.contacts, &stack.bodies);
        assert_eq!(solver.constraint_count(), 1);
        solver.initialize_velocity_constraints(&data, &stack.contacts);
        solver.warm_start(&mut data);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut data);
        }
        solver.store_impulses(&mut stack.contacts);

        assert!(velocities[1].v.length() < 1e-3);
        assert!(velocities[1].w.abs() < 1e-3);

        // Unit mass stopped from 2 m/s.
        let total: f32 = stack.contacts[stack.key]
            .manifold()
            .points()
            .iter()
            .map(|mp| mp.normal_impulse)
            .sum();
        assert!((total - 2.0).abs() < 1e-3);

        let (key, impulse) = solver.impulses().next().unwrap();
        assert_eq!(key, stack.key);
        assert_eq!(impulse.count, 2);
    }

    #[test]
    fn test_separating_box_gets_no_impulse() {
        let stack = box_on_ground(0.0);
        let mut positions = [
            Position::default(),
            Position {
                c: Vec2::new(0.0, 1.0),
                a: 0.0,
            },
        ];
        let mut velocities = [
            Velocity::default(),
            Velocity {
                v: Vec2::new(0.0, 3.0),
                w: 0.0,
            },
        ];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };

        let mut solver = ContactSolver::default();
        solver.init(&data.step, &[stack.key], &stack.contacts, &stack.bodies);
        solver.initialize_velocity_constraints(&data, &stack.contacts);
        solver.solve_velocity_constraints(&mut data);
        assert!((velocities[1].v.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_position_solver_resolves_overlap() {
        let stack = box_on_ground(0.1);
        let start = Vec2::new(0.0, 0.9);
        let mut positions = [
            Position::default(),
            Position { c: start, a: 0.0 },
        ];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };

        let mut solver = ContactSolver::default();
        solver.init(&data.step, &[stack.key], &stack.contacts, &stack.bodies);
        assert!(!solver.solve_position_constraints(&mut data));

        let mut resolved = false;
        for _ in 0..30 {
            if solver.solve_position_constraints(&mut data) {
                resolved = true;
                break;
            }
        }
        assert!(resolved);
        assert!(positions[1].c.y > start.y);
        // The static ground never moves.
        assert_eq!(positions[0].c, Vec2::ZERO);
    }

    #[test]
    fn test_toi_position_solver_moves_only_toi_bodies() {
        let stack = box_on_ground(0.1);
        let mut positions = [
            Position::default(),
            Position {
                c: Vec2::new(0.0, 0.9),
                a: 0.0,
            },
        ];
        let mut velocities = [Velocity::default(); 2];
        let mut data = SolverData {
            step: step(),
            tuning: SolverTuning::from(&PhysicsConfig::default()),
            positions: &mut positions,
            velocities: &mut velocities,
        };

        let mut solver = ContactSolver::default();
        solver.init(&data.step, &[stack.key], &stack.contacts, &stack.bodies);

        // Neither body is a TOI body: nothing moves.
        solver.solve_toi_position_constraints(&mut data, 5, 6);
        assert_eq!(data.positions[1].c, Vec2::new(0.0, 0.9));

        solver.solve_toi_position_constraints(&mut data, 0, 1);
        assert!(data.positions[1].c.y > 0.9);
    }
}
