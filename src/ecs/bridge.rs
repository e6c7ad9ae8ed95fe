//! Bridge between physics bodies and ECS entities.

use crate::dynamics::{BodyDef, FixtureDef, World};
use crate::ecs::components::physics::{PhysicsBody, Transform2d, Velocity2d};
use crate::error::{PhysicsError, Result};

/// Create a body with its fixtures and spawn an entity for it.
///
/// The entity gets [`PhysicsBody`], [`Transform2d`] and [`Velocity2d`]
/// components. The body's user data is set to the entity bits so contact
/// callbacks can map back to the entity with `hecs::Entity::from_bits`.
pub fn spawn_body(
    ecs: &mut hecs::World,
    physics: &mut World,
    def: &BodyDef,
    fixtures: &[FixtureDef],
) -> Result<hecs::Entity> {
    let handle = physics.create_body(def);
    for fixture in fixtures {
        physics.create_fixture(handle, fixture)?;
    }

    let body = physics.body_mut(handle)?;
    let entity = ecs.spawn((
        PhysicsBody(handle),
        Transform2d::from(&*body),
        Velocity2d::from(&*body),
    ));
    body.user_data = entity.to_bits().get();
    Ok(entity)
}

/// Destroy the entity's body and despawn the entity.
///
/// Fails with [`PhysicsError::InvalidBody`] when the entity has no live body.
pub fn despawn_body(
    ecs: &mut hecs::World,
    physics: &mut World,
    entity: hecs::Entity,
) -> Result<()> {
    let handle = ecs
        .get::<&PhysicsBody>(entity)
        .map(|body| body.0)
        .map_err(|_| PhysicsError::InvalidBody)?;
    physics.destroy_body(handle)?;
    if ecs.despawn(entity).is_err() {
        tracing::warn!(?entity, "entity vanished while despawning");
    }
    Ok(())
}
