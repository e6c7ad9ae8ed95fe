//! Islands: connected groups of awake bodies solved together.
//!
//! The world builds one island at a time by flood-filling the contact and
//! joint graph from each awake body, then solves it here. The same storage
//! is reused for every island and for the time of impact sub-steps.

use slotmap::SlotMap;

use crate::pooling::WorldPool;
use crate::error::PoolError;
use crate::settings::{
    MAX_ROTATION, MAX_ROTATION_SQUARED, MAX_TRANSLATION, MAX_TRANSLATION_SQUARED,
};

use super::callbacks::ContactListener;
use super::contact::Contact;
use super::joints::Joint;
use super::rigid_body::{Body, BodyType};
use super::solver::ContactSolver;
use super::{
    BodyHandle, ContactKey, JointHandle, PhysicsConfig, Position, SolverData, SolverTuning,
    TimeStep, Velocity,
};

/// World storage borrowed by the island solver.
pub(crate) struct IslandContext<'a> {
    pub bodies: &'a mut SlotMap<BodyHandle, Body>,
    pub contacts: &'a mut SlotMap<ContactKey, Contact>,
    pub joints: &'a mut SlotMap<JointHandle, Joint>,
    pub pool: &'a mut WorldPool,
    pub listener: Option<&'a mut (dyn ContactListener + 'static)>,
}

#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyHandle>,
    pub contacts: Vec<ContactKey>,
    pub joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contact_solver: ContactSolver,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub fn add_contact(&mut self, key: ContactKey) {
        self.contacts.push(key);
    }

    pub fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Integrate, solve constraints and put resting islands to sleep.
    pub fn solve(&mut self, step: &TimeStep, config: &PhysicsConfig, ctx: &mut IslandContext<'_>) {
        let h = step.dt;
        let gravity = config.gravity;

        self.positions.clear();
        self.velocities.clear();

        // Integrate velocities and apply damping. Initialize the body state.
        for &handle in &self.bodies {
            let body = &mut ctx.bodies[handle];
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Store positions for continuous collision.
            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += (gravity * body.gravity_scale + body.force * body.inv_mass) * h;
                w += h * body.inv_inertia * body.torque;

                // Pade approximation of the damping differential equation,
                // stable for any step size.
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        let mut data = SolverData {
            step: *step,
            tuning: SolverTuning::from(config),
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        // Initialize velocity constraints.
        self.contact_solver
            .init(step, &self.contacts, ctx.contacts, ctx.bodies);
        self.contact_solver
            .initialize_velocity_constraints(&data, ctx.contacts);

        if step.warm_starting {
            self.contact_solver.warm_start(&mut data);
        }

        for &handle in &self.joints {
            if let Some(joint) = ctx.joints.get_mut(handle) {
                pool_invariant(joint.init_velocity_constraints(&mut data, ctx.bodies, ctx.pool));
            }
        }

        // Solve velocity constraints.
        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                if let Some(joint) = ctx.joints.get_mut(handle) {
                    pool_invariant(joint.solve_velocity_constraints(&mut data, ctx.pool));
                }
            }
            self.contact_solver.solve_velocity_constraints(&mut data);
        }

        // Store impulses for warm starting.
        self.contact_solver.store_impulses(ctx.contacts);

        integrate_positions(data.positions, data.velocities, h);

        // Solve position constraints.
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self.contact_solver.solve_position_constraints(&mut data);

            let mut joints_okay = true;
            for &handle in &self.joints {
                if let Some(joint) = ctx.joints.get_mut(handle) {
                    let okay = joint.solve_position_constraints(&mut data, ctx.pool);
                    joints_okay &= pool_invariant(okay);
                }
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small.
                position_solved = true;
                break;
            }
        }

        // Copy state buffers back to the bodies.
        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut ctx.bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }

        self.report(ctx);

        if config.allow_sleep {
            self.update_sleep(h, config, position_solved, ctx.bodies);
        }
    }

    /// Resolve a time of impact sub-step. Only the two TOI bodies are moved by
    /// the position solver; the rest of the island acts as static geometry.
    pub fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        config: &PhysicsConfig,
        toi_index_a: usize,
        toi_index_b: usize,
        ctx: &mut IslandContext<'_>,
    ) {
        debug_assert!(toi_index_a < self.bodies.len());
        debug_assert!(toi_index_b < self.bodies.len());

        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &ctx.bodies[handle];
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let mut data = SolverData {
            step: *sub_step,
            tuning: SolverTuning::from(config),
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        self.contact_solver
            .init(sub_step, &self.contacts, ctx.contacts, ctx.bodies);

        // Solve position constraints.
        for _ in 0..sub_step.position_iterations {
            if self
                .contact_solver
                .solve_toi_position_constraints(&mut data, toi_index_a, toi_index_b)
            {
                break;
            }
        }

        // Leap of faith to the new safe state.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut ctx.bodies[self.bodies[index]];
            body.sweep.c0 = data.positions[index].c;
            body.sweep.a0 = data.positions[index].a;
        }

        // No warm starting is needed for TOI events because warm starting
        // impulses were applied in the discrete solver.
        self.contact_solver
            .initialize_velocity_constraints(&data, ctx.contacts);

        // Solve velocity constraints.
        for _ in 0..sub_step.velocity_iterations {
            self.contact_solver.solve_velocity_constraints(&mut data);
        }

        // Don't store the TOI contact forces for warm starting because they
        // can be quite large.

        integrate_positions(data.positions, data.velocities, sub_step.dt);

        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut ctx.bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }

        self.report(ctx);
    }

    fn report(&self, ctx: &mut IslandContext<'_>) {
        let Some(listener) = ctx.listener.as_deref_mut() else {
            return;
        };
        for (key, impulse) in self.contact_solver.impulses() {
            if let Some(contact) = ctx.contacts.get(key) {
                listener.post_solve(contact, &impulse);
            }
        }
    }

    fn update_sleep(
        &self,
        h: f32,
        config: &PhysicsConfig,
        position_solved: bool,
        bodies: &mut SlotMap<BodyHandle, Body>,
    ) {
        let lin_tol_sqr = config.linear_sleep_tolerance * config.linear_sleep_tolerance;
        let ang_tol_sqr = config.angular_sleep_tolerance * config.angular_sleep_tolerance;

        let mut min_sleep_time = f32::MAX;
        for &handle in &self.bodies {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }

            if !body.auto_sleep
                || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                || body.linear_velocity.length_squared() > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= config.time_to_sleep && position_solved {
            tracing::trace!(bodies = self.bodies.len(), "island fell asleep");
            for &handle in &self.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    body.set_awake(false);
                }
            }
        }
    }
}

/// Unwrap a joint's pool checkout. The world rejects pools smaller than
/// [`crate::settings::MIN_POOL_SIZE`] at creation, so an overflow here is a
/// broken invariant.
fn pool_invariant<T: Default>(result: Result<T, PoolError>) -> T {
    debug_assert!(result.is_ok(), "joint overflowed the world pool: {:?}", result.as_ref().err());
    result.unwrap_or_else(|err| {
        tracing::error!(%err, "joint overflowed the world pool");
        T::default()
    })
}

/// Integrate positions, clamping large motions.
fn integrate_positions(positions: &mut [Position], velocities: &mut [Velocity], h: f32) {
    for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
        let translation = velocity.v * h;
        if translation.length_squared() > MAX_TRANSLATION_SQUARED {
            velocity.v *= MAX_TRANSLATION / translation.length();
        }

        let rotation = h * velocity.w;
        if rotation * rotation > MAX_ROTATION_SQUARED {
            velocity.w *= MAX_ROTATION / rotation.abs();
        }

        position.c += velocity.v * h;
        position.a += h * velocity.w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::rigid_body::BodyDef;
    use glam::Vec2;

    struct Scene {
        bodies: SlotMap<BodyHandle, Body>,
        contacts: SlotMap<ContactKey, Contact>,
        joints: SlotMap<JointHandle, Joint>,
        pool: WorldPool,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: SlotMap::with_key(),
                contacts: SlotMap::with_key(),
                joints: SlotMap::with_key(),
                pool: WorldPool::new(16, 2),
            }
        }

        fn solve(&mut self, island: &mut Island, config: &PhysicsConfig) {
            let step = TimeStep {
                dt: 1.0 / 60.0,
                inv_dt: 60.0,
                dt_ratio: 1.0,
                velocity_iterations: config.velocity_iterations,
                position_iterations: config.position_iterations,
                warm_starting: config.warm_starting,
            };
            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                contacts: &mut self.contacts,
                joints: &mut self.joints,
                pool: &mut self.pool,
                listener: None,
            };
            island.solve(&step, config, &mut ctx);
        }
    }

    #[test]
    fn test_single_body_integrates_gravity() {
        let mut scene = Scene::new();
        let handle = scene.bodies.insert(Body::new(&BodyDef::dynamic(Vec2::ZERO)));
        let mut island = Island::default();
        island.add_body(handle, &mut scene.bodies[handle]);

        let config = PhysicsConfig::default();
        scene.solve(&mut island, &config);

        let body = &scene.bodies[handle];
        let dt = 1.0 / 60.0;
        assert!((body.linear_velocity().y + 10.0 * dt).abs() < 1e-5);
        assert!((body.position().y + 10.0 * dt * dt).abs() < 1e-5);
        assert_eq!(body.sweep.c0, Vec2::ZERO);
    }

    #[test]
    fn test_damping_slows_body() {
        let mut scene = Scene::new();
        let def = BodyDef {
            linear_velocity: Vec2::new(6.0, 0.0),
            linear_damping: 60.0,
            gravity_scale: 0.0,
            ..BodyDef::dynamic(Vec2::ZERO)
        };
        let handle = scene.bodies.insert(Body::new(&def));
        let mut island = Island::default();
        island.add_body(handle, &mut scene.bodies[handle]);

        scene.solve(&mut island, &PhysicsConfig::default());
        // v / (1 + h * d) = 6 / 2
        assert!((scene.bodies[handle].linear_velocity().x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_large_translation_is_clamped() {
        let mut scene = Scene::new();
        let def = BodyDef {
            linear_velocity: Vec2::new(600.0, 0.0),
            gravity_scale: 0.0,
            ..BodyDef::dynamic(Vec2::ZERO)
        };
        let handle = scene.bodies.insert(Body::new(&def));
        let mut island = Island::default();
        island.add_body(handle, &mut scene.bodies[handle]);

        scene.solve(&mut island, &PhysicsConfig::default());
        let body = &scene.bodies[handle];
        assert!((body.position().x - MAX_TRANSLATION).abs() < 1e-4);
        assert!((body.linear_velocity().x - MAX_TRANSLATION * 60.0).abs() < 1e-2);
    }

    #[test]
    fn test_resting_island_falls_asleep() {
        let mut scene = Scene::new();
        let def = BodyDef {
            gravity_scale: 0.0,
            ..BodyDef::dynamic(Vec2::ZERO)
        };
        let handle = scene.bodies.insert(Body::new(&def));
        let config = PhysicsConfig::default();
        let mut island = Island::default();

        let mut steps = 0;
        while scene.bodies[handle].is_awake() && steps < 120 {
            island.clear();
            island.add_body(handle, &mut scene.bodies[handle]);
            scene.solve(&mut island, &config);
            steps += 1;
        }
        // 0.5 s at 60 Hz.
        assert!(!scene.bodies[handle].is_awake());
        assert!((29..=31).contains(&steps));
    }

    #[test]
    fn test_sleep_disallowed_keeps_body_awake() {
        let mut scene = Scene::new();
        let def = BodyDef {
            gravity_scale: 0.0,
            allow_sleep: false,
            ..BodyDef::dynamic(Vec2::ZERO)
        };
        let handle = scene.bodies.insert(Body::new(&def));
        let config = PhysicsConfig::default();
        let mut island = Island::default();
        for _ in 0..60 {
            island.clear();
            island.add_body(handle, &mut scene.bodies[handle]);
            scene.solve(&mut island, &config);
        }
        assert!(scene.bodies[handle].is_awake());
    }

    #[test]
    fn test_bodies_keep_their_own_state() {
        let mut scene = Scene::new();
        let mut island = Island::default();
        let mut handles = Vec::new();
        for (x, v) in [(0.0, Vec2::new(6.0, 0.0)), (5.0, Vec2::new(0.0, -3.0))] {
            let def = BodyDef {
                linear_velocity: v,
                gravity_scale: 0.0,
                ..BodyDef::dynamic(Vec2::new(x, 0.0))
            };
            let handle = scene.bodies.insert(Body::new(&def));
            island.add_body(handle, &mut scene.bodies[handle]);
            handles.push(handle);
        }

        scene.solve(&mut island, &PhysicsConfig::default());
        let (a, b) = (&scene.bodies[handles[0]], &scene.bodies[handles[1]]);
        assert!((a.position() - Vec2::new(0.1, 0.0)).length() < 1e-5);
        assert!((b.position() - Vec2::new(5.0, -0.05)).length() < 1e-5);
        assert_eq!(b.linear_velocity(), Vec2::new(0.0, -3.0));
    }

    #[test]
    #[should_panic]
    fn test_removed_body_in_island_panics() {
        let mut scene = Scene::new();
        let mut island = Island::default();
        let gone = scene.bodies.insert(Body::new(&BodyDef::dynamic(Vec2::ZERO)));
        let kept = scene.bodies.insert(Body::new(&BodyDef::dynamic(Vec2::ONE)));
        island.add_body(gone, &mut scene.bodies[gone]);
        island.add_body(kept, &mut scene.bodies[kept]);

        scene.bodies.remove(gone);
        scene.solve(&mut island, &PhysicsConfig::default());
    }
}
