// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! End-to-end world scenarios
//!
//! Full steps through broad phase, narrow phase, solver and sleep.

use rigid_dynamics::prelude::*;

fn world_with_gravity(gravity: f64) -> World {
    let mut config = WorldConfig::default();
    config.gravity = DVec3::new(0.0, gravity, 0.0);
    config.solver.allowed_penetration = 5.0e-4;
    World::new(config)
}

fn add_ground(world: &mut World) -> BodyId {
    world.add_body(
        Body::new_static(ShapeInstance::new(Shape::cuboid(40.0, 2.0, 40.0)))
            .with_matrix(Frame::from_position(DVec3::new(0.0, -1.0, 0.0))),
    )
}

#[test]
fn test_falling_sphere_settles_at_its_radius() {
    let mut world = world_with_gravity(-10.0);
    let ground = add_ground(&mut world);
    let ball = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(0.0, 10.0, 0.0))),
    );

    let step = world.config().step();
    let mut steps = 0;
    while !world.body(ball).unwrap().equilibrium() {
        world.update(step);
        steps += 1;
        assert!(steps < 600, "sphere never came to rest");
    }

    let body = world.body(ball).unwrap();
    assert!(
        (body.position().y - 1.0).abs() < 1.0e-3,
        "resting height {}",
        body.position().y
    );
    assert!(body.position().x.abs() < 1.0e-6);
    assert!(world.contact_between(ball, ground).unwrap().is_touching());

    // a sleeping world stays put
    let height = body.position().y;
    for _ in 0..30 {
        world.update(step);
    }
    assert_eq!(world.body(ball).unwrap().position().y, height);
}

#[test]
fn test_effector_at_target_applies_no_impulse() {
    let mut world = world_with_gravity(0.0);
    let base = world.add_body(
        Body::new(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(0.0, 0.0, 0.0))),
    );
    let tip = world.add_body(
        Body::new(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(0.0, 2.0, 0.0))),
    );
    let mut effector = Ik6DofEffector::new();
    effector.set_rotation_type(RotationType::ShortestPath);
    let pivot = Frame::from_position(DVec3::new(0.0, 1.0, 0.0));
    let joint = world
        .add_joint_at(JointKind::Ik6DofEffector(effector), tip, Some(base), pivot)
        .unwrap();

    let step = world.config().step();
    for _ in 0..5 {
        world.update(step);
    }

    let impulses = world.joint(joint).unwrap().impulses();
    assert_eq!(impulses.len(), 6);
    for impulse in impulses {
        assert!(impulse.abs() < 1.0e-9, "impulse {impulse}");
    }
    let tip_body = world.body(tip).unwrap();
    assert!((tip_body.position() - DVec3::new(0.0, 2.0, 0.0)).length() < 1.0e-9);
}

#[test]
fn test_ball_joint_holds_pendulum_length() {
    let mut world = world_with_gravity(-10.0);
    let bob = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.25)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(2.0, 5.0, 0.0))),
    );
    let pivot = Frame::from_position(DVec3::new(0.0, 5.0, 0.0));
    world.add_joint_at(JointKind::Ball, bob, None, pivot).unwrap();

    let step = world.config().step();
    let mut lowest = f64::MAX;
    for _ in 0..120 {
        world.update(step);
        let p = world.body(bob).unwrap().position();
        lowest = lowest.min(p.y);
        let length = (p - pivot.position).length();
        assert!((length - 2.0).abs() < 0.05, "pendulum length drifted to {length}");
    }
    assert!(lowest < 4.0, "bob never swung down");
}

#[test]
fn test_ray_cast_reports_closest_body() {
    let mut world = world_with_gravity(0.0);
    let near = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(0.0, 0.0, 5.0))),
    );
    let _far = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(0.0, 0.0, 10.0))),
    );

    let mut closest = ClosestHit::default();
    world.ray_cast(&mut closest, DVec3::ZERO, DVec3::new(0.0, 0.0, 20.0));
    let hit = closest.hit.expect("ray crosses both spheres");
    assert_eq!(hit.body, Some(near));
    assert!((hit.param - 0.2).abs() < 1.0e-9);

    let mut all = AllHits::default();
    world.ray_cast(&mut all, DVec3::ZERO, DVec3::new(0.0, 0.0, 20.0));
    assert_eq!(all.hits.len(), 2);

    let mut nothing = ClosestHit::default();
    world.ray_cast(&mut nothing, DVec3::new(5.0, 0.0, 0.0), DVec3::new(5.0, 0.0, 20.0));
    assert!(nothing.hit.is_none());
}

#[test]
fn test_aabb_query_finds_overlapping_bodies() {
    let mut world = world_with_gravity(0.0);
    let a = world.add_body(Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0));
    let _b = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(10.0, 0.0, 0.0))),
    );
    let found = world.aabb_query(&Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0)));
    assert_eq!(found, vec![a]);
}

#[test]
fn test_contact_lookup_is_symmetric() {
    let mut world = world_with_gravity(0.0);
    let a = world.add_body(Body::new(ShapeInstance::new(Shape::sphere(1.0)), 1.0));
    let b = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(1.5, 0.0, 0.0))),
    );
    world.update(world.config().step());

    let (body_a, body_b) = (world.body(a).unwrap(), world.body(b).unwrap());
    let ab = body_a.find_contact(body_b);
    assert!(ab.is_some());
    assert_eq!(ab, body_b.find_contact(body_a));
    assert_eq!(world.contact_count(), 1);

    // overlapping spheres are pushed apart
    assert!(world.body(a).unwrap().velocity().x < 0.0);
    assert!(world.body(b).unwrap().velocity().x > 0.0);
}

#[test]
fn test_jointed_bodies_sleep_together() {
    let mut world = world_with_gravity(0.0);
    let ball = |x: f64| {
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(x, 0.0, 0.0)))
    };
    let resting = world.add_body(ball(0.0));
    let spinning = world.add_body(ball(2.0));
    // hinge pin along x, through both centers
    let pivot = Frame::from_position(DVec3::new(1.0, 0.0, 0.0));
    world
        .add_joint_at(JointKind::Hinge(HingeJoint::new()), resting, Some(spinning), pivot)
        .unwrap();
    world.body_mut(spinning).unwrap().set_omega(DVec3::new(3.0, 0.0, 0.0));

    let step = world.config().step();
    for _ in 0..60 {
        world.update(step);
        let (a, b) = (world.body(resting).unwrap(), world.body(spinning).unwrap());
        assert!(!a.equilibrium(), "resting body slept next to a moving one");
        assert!(!b.equilibrium());
    }
    let a = world.body(resting).unwrap();
    assert!(a.joint_fence(), "resting body passed its own rest test");
    assert!(a.velocity().length() < 1.0e-6);
    assert!((world.body(spinning).unwrap().omega().x - 3.0).abs() < 1.0e-3);

    world.body_mut(spinning).unwrap().set_omega(DVec3::ZERO);
    let mut steps = 0;
    loop {
        world.update(step);
        steps += 1;
        let (a, b) = (world.body(resting).unwrap(), world.body(spinning).unwrap());
        assert_eq!(a.equilibrium(), b.equilibrium(), "island split its sleep at step {steps}");
        if a.equilibrium() {
            break;
        }
        assert!(steps < 60, "jointed pair never fell asleep");
    }
}
