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
//! Stack of boxes settling on a floor
//!
//! Drops a column of boxes and a sphere, then reports heights and sleep
//! state once per simulated second. Set `RUST_LOG=rigid_dynamics=debug` to
//! see step spans and discarded catch-up time.

use rigid_dynamics::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    println!("Rigid Dynamics - Falling Stack");
    println!("==============================\n");

    let mut world = World::new(WorldConfig::from_env());
    world.add_body(
        Body::new_static(ShapeInstance::new(Shape::cuboid(20.0, 1.0, 20.0)))
            .with_matrix(Frame::from_position(DVec3::new(0.0, -0.5, 0.0))),
    );

    let mut boxes = Vec::new();
    for level in 0..5 {
        let position = DVec3::new(0.02 * level as f64, 0.5 + level as f64 * 1.05, 0.0);
        boxes.push(world.add_body(
            Body::new(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)), 1.0)
                .with_matrix(Frame::from_position(position)),
        ));
    }
    let ball = world.add_body(
        Body::new(ShapeInstance::new(Shape::sphere(0.4)), 2.0)
            .with_matrix(Frame::from_position(DVec3::new(3.0, 8.0, 0.0))),
    );
    println!("Created {} bodies", world.body_count());

    let frame_time = 1.0 / 60.0;
    for second in 1..=4 {
        for _ in 0..60 {
            world.advance_time(frame_time);
        }
        println!("t = {second} s, contacts: {}", world.contact_count());
        for (level, id) in boxes.iter().enumerate() {
            if let Some(body) = world.body(*id) {
                println!(
                    "  box {level}: y = {:.3}, asleep: {}",
                    body.position().y,
                    body.equilibrium()
                );
            }
        }
        if let Some(body) = world.body(ball) {
            println!("  ball: y = {:.3}, asleep: {}", body.position().y, body.equilibrium());
        }
    }

    let stats = world.last_solve_stats();
    println!("\nLast solve: {} rows, {} rejected", stats.rows, stats.rejected);
    let pool = world.solver().pool_stats();
    println!("Row buffer pool hit rate: {:.1}%", pool.hit_rate() * 100.0);
}
