//! Physics components for ECS entities.

use glam::Vec2;

use crate::dynamics::{Body, BodyHandle};

/// Links an entity to a body in the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsBody(pub BodyHandle);

/// 2D pose mirrored from the body origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform2d {
    pub position: Vec2,
    /// Rotation in radians.
    pub angle: f32,
}

impl Transform2d {
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            angle: 0.0,
        }
    }
}

impl From<&Body> for Transform2d {
    fn from(body: &Body) -> Self {
        Self {
            position: body.position(),
            angle: body.angle(),
        }
    }
}

/// Velocity of the body's center of mass. Optional; only entities that carry
/// it get it updated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity2d {
    pub linear: Vec2,
    /// Angular velocity in radians per second.
    pub angular: f32,
}

impl From<&Body> for Velocity2d {
    fn from(body: &Body) -> Self {
        Self {
            linear: body.linear_velocity(),
            angular: body.angular_velocity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{BodyDef, World};

    #[test]
    fn test_components_from_body() {
        let mut world = World::default();
        let handle = world.create_body(&BodyDef {
            angle: 0.5,
            linear_velocity: Vec2::new(1.0, 2.0),
            angular_velocity: -1.0,
            ..BodyDef::dynamic(Vec2::new(3.0, 4.0))
        });
        let body = world.body(handle).unwrap();

        let transform = Transform2d::from(body);
        assert_eq!(transform.position, Vec2::new(3.0, 4.0));
        assert!((transform.angle - 0.5).abs() < 1e-6);

        let velocity = Velocity2d::from(body);
        assert_eq!(velocity.linear, Vec2::new(1.0, 2.0));
        assert_eq!(velocity.angular, -1.0);
    }
}
