//! ECS physics system.
//!
//! Mirrors body state from the physics world into components.

use crate::dynamics::World;
use crate::ecs::components::physics::{PhysicsBody, Transform2d, Velocity2d};

/// Copy body poses into [`Transform2d`] and velocities into [`Velocity2d`].
///
/// Entities whose body was destroyed are left untouched.
pub fn sync_transforms(physics: &World, ecs: &mut hecs::World) {
    for (entity, (body, transform)) in ecs.query_mut::<(&PhysicsBody, &mut Transform2d)>() {
        match physics.body(body.0) {
            Ok(body) => *transform = Transform2d::from(body),
            Err(_) => tracing::trace!(?entity, "entity refers to a destroyed body"),
        }
    }

    for (_, (body, velocity)) in ecs.query_mut::<(&PhysicsBody, &mut Velocity2d)>() {
        if let Ok(body) = physics.body(body.0) {
            *velocity = Velocity2d::from(body);
        }
    }
}

/// Step the physics world by `delta_time` seconds, then sync components.
/// Returns the number of fixed steps taken.
pub fn step_and_sync(physics: &mut World, ecs: &mut hecs::World, delta_time: f64) -> u32 {
    let steps = physics.step(delta_time);
    if steps > 0 {
        sync_transforms(physics, ecs);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{BodyDef, FixtureDef};
    use crate::ecs::bridge::spawn_body;
    use crate::shape::PolygonShape;
    use glam::Vec2;

    #[test]
    fn test_free_fall_is_mirrored() {
        let mut ecs = hecs::World::new();
        let mut physics = World::default();
        let fixture = FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0);
        let entity = spawn_body(
            &mut ecs,
            &mut physics,
            &BodyDef::dynamic(Vec2::new(0.0, 10.0)),
            &[fixture],
        )
        .unwrap();

        // Simulate ~1 second
        for _ in 0..60 {
            step_and_sync(&mut physics, &mut ecs, 1.0 / 60.0);
        }

        let transform = *ecs.get::<&Transform2d>(entity).unwrap();
        assert!(
            transform.position.y < 10.0,
            "Body should have fallen: y = {}",
            transform.position.y
        );
        let velocity = *ecs.get::<&Velocity2d>(entity).unwrap();
        assert!(velocity.linear.y < -9.0);
    }

    #[test]
    fn test_destroyed_body_leaves_component() {
        let mut ecs = hecs::World::new();
        let mut physics = World::default();
        let body = physics.create_body(&BodyDef::dynamic(Vec2::ZERO));
        let entity = ecs.spawn((PhysicsBody(body), Transform2d::from_position(Vec2::ONE)));

        physics.destroy_body(body).unwrap();
        sync_transforms(&physics, &mut ecs);
        assert_eq!(
            ecs.get::<&Transform2d>(entity).unwrap().position,
            Vec2::ONE
        );
    }
}
