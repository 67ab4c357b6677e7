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
//! Benchmarks for the broad phase
//!
//! Measures proxy refresh and candidate pair search over a grid of bodies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rigid_dynamics::body::Body;
use rigid_dynamics::math::{DVec3, Frame};
use rigid_dynamics::parallel::WorkerPool;
use rigid_dynamics::scene::Scene;
use rigid_dynamics::shape::{Shape, ShapeInstance};

fn setup_scene(side: usize) -> (Scene, Vec<Body>) {
    let mut scene = Scene::new(0.125);
    let mut bodies = Vec::with_capacity(side * side * side);
    for x in 0..side {
        for y in 0..side {
            for z in 0..side {
                // spacing slightly below the diameter so neighbours overlap
                let position = DVec3::new(x as f64, y as f64, z as f64) * 0.95;
                let mut body = Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
                    .with_matrix(Frame::from_position(position))
                    .with_velocity(DVec3::new(0.0, -1.0, 0.0));
                scene.add_body(&mut body, bodies.len());
                bodies.push(body);
            }
        }
    }
    (scene, bodies)
}

fn bench_find_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_pairs");

    for side in [4usize, 8, 12].iter() {
        let (scene, bodies) = setup_scene(*side);
        let active: Vec<usize> = (0..bodies.len()).collect();
        let is_active = vec![true; bodies.len()];

        for (label, pool) in [("sequential", WorkerPool::sequential()), ("parallel", WorkerPool::new(0))] {
            group.bench_with_input(BenchmarkId::new(label, bodies.len()), side, |b, _| {
                b.iter(|| {
                    let pairs = scene.find_pairs(&pool, black_box(&active), &is_active, |_, _| true);
                    black_box(pairs.len())
                });
            });
        }
    }

    group.finish();
}

fn bench_refresh_proxies(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_proxies");

    for side in [4usize, 8, 12].iter() {
        let (mut scene, mut bodies) = setup_scene(*side);
        let dt = 1.0 / 60.0;
        group.bench_with_input(BenchmarkId::new("swept", bodies.len()), side, |b, _| {
            b.iter(|| {
                for body in bodies.iter_mut() {
                    body.integrate_velocity(dt);
                    scene.update_body(body, dt);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_find_pairs, bench_refresh_proxies);
criterion_main!(benches);
