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
//! Benchmarks for manifold generation
//!
//! Measures GJK/EPA plus clipping for the common shape pairs, both
//! touching and speculative.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rigid_dynamics::body::Body;
use rigid_dynamics::collision::collide_bodies;
use rigid_dynamics::math::{DQuat, DVec3, Frame};
use rigid_dynamics::shape::{Shape, ShapeInstance};

fn hull() -> Shape {
    let points: Vec<DVec3> = (0..24)
        .map(|i| {
            let a = i as f64 * 0.7;
            let b = i as f64 * 1.3;
            DVec3::new(a.cos() * b.sin(), a.sin() * b.sin(), b.cos()) * 0.6
        })
        .collect();
    Shape::convex_hull(&points).unwrap_or_else(|| Shape::cuboid(1.0, 1.0, 1.0))
}

fn pair(shape0: Shape, shape1: Shape, gap: f64) -> (Body, Body) {
    let body0 = Body::new(ShapeInstance::new(shape0), 1.0);
    let body1 = Body::new(ShapeInstance::new(shape1), 1.0).with_matrix(Frame::new(
        DQuat::from_rotation_y(0.3) * DQuat::from_rotation_x(0.2),
        DVec3::new(0.0, 1.0 + gap, 0.0),
    ));
    (body0, body1)
}

fn bench_shape_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("collide_bodies");

    let cases: [(&str, fn() -> Shape, fn() -> Shape); 4] = [
        ("sphere_sphere", || Shape::sphere(0.5), || Shape::sphere(0.5)),
        ("box_box", || Shape::cuboid(1.0, 1.0, 1.0), || Shape::cuboid(1.0, 1.0, 1.0)),
        ("capsule_box", || Shape::capsule(0.3, 1.0), || Shape::cuboid(1.0, 1.0, 1.0)),
        ("hull_hull", hull, hull),
    ];

    for (name, make0, make1) in cases {
        for (state, gap) in [("penetrating", -0.05), ("speculative", 0.05)] {
            let (body0, body1) = pair(make0(), make1(), gap);
            group.bench_with_input(BenchmarkId::new(name, state), &gap, |b, _| {
                b.iter(|| black_box(collide_bodies(black_box(&body0), black_box(&body1), 0.125)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_shape_pairs);
criterion_main!(benches);
