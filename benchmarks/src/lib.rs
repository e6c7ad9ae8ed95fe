//! Scene builders shared by the physics benchmarks.

use anyhow::Result;
use glam::Vec2;
use rein2d::collision::{Aabb, BroadPhase};
use rein2d::{
    BodyDef, CircleShape, FixtureDef, PhysicsConfig, PolygonShape, Transform, World,
};

pub const DT: f32 = 1.0 / 60.0;

/// Static ground slab whose top face sits at y = 0.
pub fn add_ground(world: &mut World) -> Result<()> {
    let ground = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5)));
    world.create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(200.0, 0.5)))?;
    Ok(())
}

/// Box pyramid with `rows` boxes in its bottom row.
pub fn setup_pyramid(rows: usize) -> Result<World> {
    let mut world = World::new(PhysicsConfig::default())?;
    add_ground(&mut world)?;

    let shape = PolygonShape::new_box(0.5, 0.5);
    for row in 0..rows {
        let count = rows - row;
        let y = 0.5 + row as f32 * 1.05;
        for i in 0..count {
            let x = (i as f32 - (count - 1) as f32 * 0.5) * 1.1;
            let body = world.create_body(&BodyDef::dynamic(Vec2::new(x, y)));
            world.create_fixture(body, &FixtureDef::new(shape).with_density(1.0))?;
        }
    }
    Ok(world)
}

/// `n` circles on a grid above the ground, about to rain down.
pub fn setup_rain(n: usize) -> Result<World> {
    let mut world = World::new(PhysicsConfig::default())?;
    add_ground(&mut world)?;

    let columns = (n as f32).sqrt().ceil().max(1.0) as usize;
    for i in 0..n {
        let x = (i % columns) as f32 * 1.2 - columns as f32 * 0.6;
        let y = 2.0 + (i / columns) as f32 * 1.2;
        let body = world.create_body(&BodyDef::dynamic(Vec2::new(x, y)));
        world.create_fixture(
            body,
            &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0).with_restitution(0.2),
        )?;
    }
    Ok(world)
}

/// Mixed boxes and circles with every body spawned through the ECS bridge.
pub fn setup_ecs_scene(n: usize) -> Result<(World, hecs::World)> {
    let mut physics = World::new(PhysicsConfig::default())?;
    let mut ecs = hecs::World::new();
    add_ground(&mut physics)?;

    for i in 0..n {
        let position = Vec2::new((i % 20) as f32 * 1.5 - 15.0, 2.0 + (i / 20) as f32 * 1.5);
        let fixture = if i % 2 == 0 {
            FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0)
        } else {
            FixtureDef::new(CircleShape::new(0.5)).with_density(1.0)
        };
        rein2d::ecs::spawn_body(&mut ecs, &mut physics, &BodyDef::dynamic(position), &[fixture])?;
    }
    Ok((physics, ecs))
}

/// Broadphase with `n` unit boxes on a grid. Adjacent boxes overlap when
/// `spacing` is below 1.
pub fn setup_proxies(n: usize, spacing: f32) -> BroadPhase<u32> {
    let mut broad_phase = BroadPhase::new();
    let columns = (n as f32).sqrt().ceil().max(1.0) as usize;
    for i in 0..n {
        let center = Vec2::new((i % columns) as f32, (i / columns) as f32) * spacing;
        let aabb = Aabb::new(center - Vec2::splat(0.5), center + Vec2::splat(0.5));
        broad_phase.create_proxy(aabb, i as u32);
    }
    broad_phase
}

/// Two unit boxes, the second offset by `offset` and turned by `angle`.
pub fn box_pair(offset: Vec2, angle: f32) -> (PolygonShape, Transform, PolygonShape, Transform) {
    let shape = PolygonShape::new_box(0.5, 0.5);
    (
        shape,
        Transform::IDENTITY,
        shape,
        Transform::new(offset, angle),
    )
}

/// Step `world` `steps` times at the fixed timestep.
pub fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step_fixed(DT);
    }
}
