//! End-to-end scenes driven through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use rein2d::glam::Vec2;
use rein2d::{
    Aabb, BodyDef, BodyHandle, ChainShape, CircleShape, Contact, ContactListener, FixtureDef,
    FrictionJointDef, PhysicsConfig, PolygonShape, RevoluteJointDef, WeldJointDef, World,
};

const DT: f32 = 1.0 / 60.0;

#[derive(Default)]
struct EventLog(Rc<RefCell<Vec<&'static str>>>);

impl ContactListener for EventLog {
    fn begin_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().push("begin");
    }

    fn end_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().push("end");
    }
}

fn listen(world: &mut World) -> Rc<RefCell<Vec<&'static str>>> {
    let log = EventLog::default();
    let events = Rc::clone(&log.0);
    world.set_contact_listener(Box::new(log));
    events
}

fn ground(world: &mut World) -> Result<BodyHandle> {
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO));
    world.create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(20.0, 0.5)))?;
    Ok(ground)
}

/// Five rows of unit boxes resting on the ground. Returns the boxes bottom
/// row first; the last handle is the apex.
fn pyramid(world: &mut World) -> Result<Vec<BodyHandle>> {
    const ROWS: usize = 5;
    let mut boxes = Vec::new();
    for row in 0..ROWS {
        let count = ROWS - row;
        for i in 0..count {
            let x = (i as f32 - (count - 1) as f32 * 0.5) * 1.05;
            let y = 1.0 + row as f32 * 1.02;
            let body = world.create_body(&BodyDef::dynamic(Vec2::new(x, y)));
            world.create_fixture(
                body,
                &FixtureDef::new(PolygonShape::new_box(0.5, 0.5))
                    .with_density(1.0)
                    .with_friction(0.6),
            )?;
            boxes.push(body);
        }
    }
    Ok(boxes)
}

#[test]
fn test_pyramid_settles() -> Result<()> {
    let mut world = World::default();
    ground(&mut world)?;
    let boxes = pyramid(&mut world)?;

    for _ in 0..400 {
        world.step_fixed(DT);
    }

    for &handle in &boxes {
        let body = world.body(handle)?;
        assert!(body.position().y > 0.9, "box sank into the ground: {:?}", body.position());
        assert!(body.position().x.abs() < 3.0, "box slid away: {:?}", body.position());
    }

    let apex = world.body(boxes[boxes.len() - 1])?;
    assert!(apex.position().y > 4.5, "apex y = {}", apex.position().y);
    assert!(apex.linear_velocity().length() < 0.1);
    assert!(world.pool().is_balanced());
    Ok(())
}

#[test]
fn test_identical_worlds_stay_in_lockstep() -> Result<()> {
    let mut a = World::default();
    let mut b = World::default();
    ground(&mut a)?;
    ground(&mut b)?;
    let boxes_a = pyramid(&mut a)?;
    let boxes_b = pyramid(&mut b)?;

    for _ in 0..120 {
        a.step_fixed(DT);
        b.step_fixed(DT);
    }

    for (&ha, &hb) in boxes_a.iter().zip(&boxes_b) {
        let (pa, pb) = (a.body(ha)?, b.body(hb)?);
        assert_eq!(pa.position(), pb.position());
        assert_eq!(pa.angle(), pb.angle());
    }
    Ok(())
}

#[test]
fn test_ball_rolls_across_chain_vertex() -> Result<()> {
    let mut world = World::default();
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO));
    let chain = ChainShape::new_chain(&[
        Vec2::new(-10.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(10.0, 0.0),
    ])?;
    world.create_fixture(ground, &FixtureDef::new(chain))?;

    let ball = world.create_body(&BodyDef::dynamic(Vec2::new(-2.0, 0.5)));
    world.create_fixture(
        ball,
        &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0).with_friction(0.6),
    )?;
    world.body_mut(ball)?.set_linear_velocity(Vec2::new(2.0, 0.0));

    for _ in 0..180 {
        world.step_fixed(DT);
    }

    let body = world.body(ball)?;
    assert!(body.position().x > 0.0, "ball stalled at {:?}", body.position());
    assert!((body.position().y - 0.5).abs() < 0.05, "ball y = {}", body.position().y);
    assert!(body.linear_velocity().y.abs() < 0.1);
    Ok(())
}

#[test]
fn test_sensor_reports_pass_through() -> Result<()> {
    let mut world = World::default();
    let events = listen(&mut world);

    let zone = world.create_body(&BodyDef::fixed(Vec2::new(0.0, 2.0)));
    world.create_fixture(zone, &FixtureDef::new(PolygonShape::new_box(1.0, 1.0)).sensor())?;

    let ball = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 6.0)));
    world.create_fixture(ball, &FixtureDef::new(CircleShape::new(0.25)).with_density(1.0))?;

    for _ in 0..120 {
        world.step_fixed(DT);
    }

    assert_eq!(*events.borrow(), vec!["begin", "end"]);
    assert!(world.body(ball)?.position().y < -5.0, "sensor must not block the ball");
    Ok(())
}

#[test]
fn test_destroying_resting_body_ends_contact() -> Result<()> {
    let mut world = World::default();
    let events = listen(&mut world);
    ground(&mut world)?;

    let crate_box = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 1.0)));
    let shape = PolygonShape::new_box(0.5, 0.5);
    world.create_fixture(crate_box, &FixtureDef::new(shape).with_density(1.0))?;

    for _ in 0..60 {
        world.step_fixed(DT);
    }
    assert_eq!(*events.borrow(), vec!["begin"]);

    world.destroy_body(crate_box)?;
    assert_eq!(*events.borrow(), vec!["begin", "end"]);
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.body_count(), 1);
    assert!(world.body(crate_box).is_err());
    Ok(())
}

#[test]
fn test_revolute_motor_drives_wheel() -> Result<()> {
    let mut world = World::new(PhysicsConfig {
        gravity: Vec2::ZERO,
        ..Default::default()
    })?;
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO));
    let wheel = world.create_body(&BodyDef::dynamic(Vec2::ZERO));
    world.create_fixture(wheel, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))?;

    let def = RevoluteJointDef::new(
        ground,
        world.body(ground)?,
        wheel,
        world.body(wheel)?,
        Vec2::ZERO,
    )
    .with_motor(2.0, 1000.0);
    world.create_joint(def)?;

    for _ in 0..60 {
        world.step_fixed(DT);
    }

    let body = world.body(wheel)?;
    assert!((body.angular_velocity() - 2.0).abs() < 1e-3, "w = {}", body.angular_velocity());
    assert!(body.position().length() < 1e-3);
    assert!(body.angle() > 1.5, "wheel turned {} rad", body.angle());
    Ok(())
}

#[test]
fn test_weld_holds_cantilever() -> Result<()> {
    let mut world = World::default();
    let wall = world.create_body(&BodyDef::fixed(Vec2::ZERO));
    let beam = world.create_body(&BodyDef::dynamic(Vec2::new(1.0, 0.0)));
    world.create_fixture(
        beam,
        &FixtureDef::new(PolygonShape::new_box(1.0, 0.1)).with_density(1.0),
    )?;

    let def = WeldJointDef::new(wall, world.body(wall)?, beam, world.body(beam)?, Vec2::ZERO);
    world.create_joint(def)?;

    for _ in 0..120 {
        world.step_fixed(DT);
    }

    let body = world.body(beam)?;
    let drift = (body.position() - Vec2::new(1.0, 0.0)).length();
    assert!(drift < 0.05, "beam at {:?}", body.position());
    assert!(body.angle().abs() < 0.05, "beam sagged {} rad", body.angle());
    Ok(())
}

#[test]
fn test_friction_joint_brakes_sliding_puck() -> Result<()> {
    let mut world = World::new(PhysicsConfig {
        gravity: Vec2::ZERO,
        ..Default::default()
    })?;
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO));
    let puck = world.create_body(&BodyDef::dynamic(Vec2::ZERO));
    // Unit mass.
    let shape = PolygonShape::new_box(0.5, 0.5);
    world.create_fixture(puck, &FixtureDef::new(shape).with_density(1.0))?;
    world.body_mut(puck)?.set_linear_velocity(Vec2::new(2.0, 0.0));

    let (body_a, body_b) = (world.body(ground)?, world.body(puck)?);
    let def = FrictionJointDef::new(ground, body_a, puck, body_b, Vec2::ZERO).with_limits(2.0, 1.0);
    world.create_joint(def)?;

    // Constant 2 N of friction: half the speed is gone after half a second.
    for _ in 0..30 {
        world.step_fixed(DT);
    }
    let speed = world.body(puck)?.linear_velocity().x;
    assert!((speed - 1.0).abs() < 0.02, "speed after 0.5 s = {speed}");

    for _ in 0..60 {
        world.step_fixed(DT);
    }
    assert!(world.body(puck)?.linear_velocity().length() < 1e-3);
    Ok(())
}

#[test]
fn test_queries_see_only_overlapping_fixtures() -> Result<()> {
    let mut world = World::default();
    let mut fixtures = Vec::new();
    for x in [0.0, 5.0, 10.0] {
        let body = world.create_body(&BodyDef::fixed(Vec2::new(x, 0.0)));
        fixtures.push(world.create_fixture(body, &FixtureDef::new(CircleShape::new(0.5)))?);
    }

    let mut found = Vec::new();
    world.query_aabb(&Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(6.0, 1.0)), |fixture| {
        found.push(fixture);
        true
    });
    assert_eq!(found.len(), 2);
    assert!(found.contains(&fixtures[0]));
    assert!(found.contains(&fixtures[1]));

    // Clipping the ray to each hit leaves the closest one last.
    let mut closest = None;
    let (p1, p2) = (Vec2::new(-5.0, 0.0), Vec2::new(15.0, 0.0));
    world.raycast(p1, p2, |fixture, point, _normal, fraction| {
        closest = Some((fixture, point, fraction));
        fraction
    });
    let (fixture, point, fraction) = closest.ok_or_else(|| anyhow::anyhow!("ray missed"))?;
    assert_eq!(fixture, fixtures[0]);
    assert!((point.x + 0.5).abs() < 1e-4, "hit at {point:?}");
    assert!((fraction - 0.225).abs() < 1e-4, "fraction = {fraction}");

    assert_eq!(world.test_point(Vec2::new(5.2, 0.1)), Some(fixtures[1]));
    assert_eq!(world.test_point(Vec2::new(2.5, 0.0)), None);
    Ok(())
}
