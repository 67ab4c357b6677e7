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
//! Integration tests verifying conservation properties of the step

use rigid_dynamics::prelude::*;

fn zero_gravity() -> World {
    let mut config = WorldConfig::default();
    config.gravity = DVec3::ZERO;
    World::new(config)
}

fn total_momentum(world: &World) -> DVec3 {
    world.bodies().map(|(_, b)| b.linear_momentum()).sum()
}

#[test]
fn test_free_body_keeps_velocity() {
    let mut world = zero_gravity();
    let id = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 3.0).with_velocity(DVec3::new(1.0, 2.0, -0.5)),
    );
    let step = world.config().step();
    for _ in 0..60 {
        world.update(step);
    }
    let body = world.body(id).unwrap();
    assert!((body.velocity() - DVec3::new(1.0, 2.0, -0.5)).length() < 1e-12);
    assert!((body.position() - DVec3::new(1.0, 2.0, -0.5)).length() < 1e-9);
}

#[test]
fn test_torque_free_spin_conserves_angular_momentum() {
    let mut world = zero_gravity();
    let id = world.add_body(Body::new(ShapeInstance::new(Shape::cuboid(1.0, 2.0, 3.0)), 1.0));
    world.body_mut(id).unwrap().set_omega(DVec3::new(0.1, 0.2, 2.0));
    let initial = world.body(id).unwrap().angular_momentum();

    let step = world.config().step();
    for _ in 0..240 {
        world.update(step);
    }
    let after = world.body(id).unwrap().angular_momentum();
    assert!(
        (after - initial).length() < 5e-2 * initial.length(),
        "angular momentum drifted from {initial} to {after}"
    );
}

#[test]
fn test_collision_conserves_linear_momentum() {
    let mut world = zero_gravity();
    world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(-2.0, 0.0, 0.0)))
            .with_velocity(DVec3::new(4.0, 0.0, 0.0)),
    );
    world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 2.0)
            .with_matrix(Frame::from_position(DVec3::new(2.0, 0.0, 0.0)))
            .with_velocity(DVec3::new(-1.0, 0.0, 0.0)),
    );
    let before = total_momentum(&world);

    let step = world.config().step();
    let mut touched = false;
    for _ in 0..90 {
        world.update(step);
        touched |= world.contacts().any(|c| c.is_touching());
    }
    assert!(touched, "spheres never met");
    let after = total_momentum(&world);
    assert!((after - before).length() < 1e-9, "momentum {before} -> {after}");

    // inelastic contact: the spheres no longer approach each other
    let velocities: Vec<DVec3> = world.bodies().map(|(_, b)| b.velocity()).collect();
    assert!(velocities[1].x - velocities[0].x >= -1e-9);
}
