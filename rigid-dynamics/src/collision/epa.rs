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
//! Expanding polytope penetration query
//!
//! Starts from the simplex GJK ended with, grown to a tetrahedron when
//! GJK stopped early, and pushes the face closest to the origin outwards
//! until the support mapping stops making progress.

use crate::collision::gjk::{Simplex, SimplexVertex};
use crate::collision::SupportMap;
use crate::math::DVec3;

const EPA_MAX_ITERATIONS: usize = 64;
const EPA_TOLERANCE: f64 = 1.0e-6;
const EPA_MAX_FACES: usize = 256;

/// Penetration of two overlapping shapes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaResult {
    /// Unit direction from the first shape to the second
    pub normal: DVec3,
    /// Penetration depth along the normal
    pub depth: f64,
    /// Deepest point of the first shape inside the second
    pub point_a: DVec3,
    /// Deepest point of the second shape inside the first
    pub point_b: DVec3,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: DVec3,
    distance: f64,
}

fn make_face(vertices: &[SimplexVertex], indices: [usize; 3]) -> Option<Face> {
    let a = vertices[indices[0]].w;
    let b = vertices[indices[1]].w;
    let c = vertices[indices[2]].w;
    let normal = (b - a).cross(c - a).try_normalize()?;
    Some(Face {
        indices,
        normal,
        distance: normal.dot(a),
    })
}

fn add_or_cancel_edge(edges: &mut Vec<(usize, usize)>, edge: (usize, usize)) {
    if let Some(pos) = edges.iter().position(|&e| e == (edge.1, edge.0)) {
        edges.swap_remove(pos);
    } else {
        edges.push(edge);
    }
}

/// Grow a GJK simplex into a tetrahedron that encloses volume
fn seed_tetrahedron(
    simplex: &Simplex,
    support: &impl Fn(DVec3) -> SimplexVertex,
) -> Option<Vec<SimplexVertex>> {
    let mut vertices: Vec<SimplexVertex> = simplex.vertices().to_vec();
    if vertices.is_empty() {
        vertices.push(support(DVec3::X));
    }
    let directions = [DVec3::X, -DVec3::X, DVec3::Y, -DVec3::Y, DVec3::Z, -DVec3::Z];

    if vertices.len() == 1 {
        for &d in &directions {
            let v = support(d);
            if (v.w - vertices[0].w).length_squared() > 1.0e-12 {
                vertices.push(v);
                break;
            }
        }
    }
    if vertices.len() == 2 {
        let axis = (vertices[1].w - vertices[0].w).normalize_or_zero();
        for &d in &directions {
            let v = support(d);
            if axis.cross(v.w - vertices[0].w).length_squared() > 1.0e-12 {
                vertices.push(v);
                break;
            }
        }
    }
    if vertices.len() == 3 {
        let n = (vertices[1].w - vertices[0].w).cross(vertices[2].w - vertices[0].w).normalize_or_zero();
        for d in [n, -n] {
            let v = support(d);
            if n.dot(v.w - vertices[0].w).abs() > 1.0e-9 {
                vertices.push(v);
                break;
            }
        }
    }
    (vertices.len() == 4).then_some(vertices)
}

/// Penetration depth and direction of two overlapping shapes
///
/// Returns `None` when the overlap is too degenerate to enclose a volume.
pub fn epa<A, B>(a: &A, b: &B, simplex: &Simplex) -> Option<EpaResult>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let support = |dir: DVec3| {
        let pa = a.support(dir);
        let pb = b.support(-dir);
        SimplexVertex { w: pa - pb, a: pa, b: pb }
    };

    let mut vertices = seed_tetrahedron(simplex, &support)?;
    let mut faces: Vec<Face> = Vec::with_capacity(EPA_MAX_FACES);
    let centroid = vertices.iter().map(|v| v.w).sum::<DVec3>() / 4.0;
    for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        let mut face = make_face(&vertices, indices)?;
        if face.normal.dot(vertices[indices[0]].w - centroid) < 0.0 {
            face.indices.swap(0, 1);
            face.normal = -face.normal;
            face.distance = -face.distance;
        }
        faces.push(face);
    }

    let closest = |faces: &[Face]| -> Option<usize> {
        faces
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.distance.partial_cmp(&y.distance).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    };

    for _ in 0..EPA_MAX_ITERATIONS {
        let best = closest(&faces)?;
        let face = faces[best];
        let vertex = support(face.normal);
        let gain = vertex.w.dot(face.normal) - face.distance;
        if gain < EPA_TOLERANCE || faces.len() >= EPA_MAX_FACES {
            return Some(finish(&vertices, &face));
        }

        let index = vertices.len();
        vertices.push(vertex);

        let mut horizon: Vec<(usize, usize)> = Vec::new();
        let mut kept: Vec<Face> = Vec::with_capacity(faces.len() + 4);
        for f in faces.drain(..) {
            if f.normal.dot(vertex.w - vertices[f.indices[0]].w) > 0.0 {
                for j in 0..3 {
                    add_or_cancel_edge(&mut horizon, (f.indices[j], f.indices[(j + 1) % 3]));
                }
            } else {
                kept.push(f);
            }
        }
        faces = kept;
        for (i, j) in horizon {
            if let Some(f) = make_face(&vertices, [i, j, index]) {
                faces.push(f);
            }
        }
        if faces.is_empty() {
            return None;
        }
    }

    let best = closest(&faces)?;
    Some(finish(&vertices, &faces[best]))
}

fn finish(vertices: &[SimplexVertex], face: &Face) -> EpaResult {
    let [i, j, k] = face.indices;
    let (a, b, c) = (vertices[i], vertices[j], vertices[k]);
    let p = face.normal * face.distance;
    let (u, v, w) = barycentric(p, a.w, b.w, c.w);
    EpaResult {
        normal: face.normal,
        depth: face.distance.max(0.0),
        point_a: a.a * u + b.a * v + c.a * w,
        point_b: a.b * u + b.b * v + c.b * w,
    }
}

fn barycentric(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> (f64, f64, f64) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1.0e-30 {
        return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::gjk::{gjk, GjkResult};
    use crate::collision::InstanceProxy;
    use crate::math::Frame;
    use crate::shape::{Shape, ShapeInstance};

    fn penetrate(a: Shape, b: Shape, offset: DVec3) -> EpaResult {
        let ia = ShapeInstance::new(a);
        let ib = ShapeInstance::new(b);
        let pa = InstanceProxy::new(&ia, Frame::IDENTITY);
        let pb = InstanceProxy::new(&ib, Frame::from_position(offset));
        match gjk(&pa, &pb, false) {
            GjkResult::Overlapping(simplex) => epa(&pa, &pb, &simplex).unwrap(),
            GjkResult::Separated { .. } => panic!("shapes should overlap"),
        }
    }

    #[test]
    fn test_box_box_depth() {
        let r = penetrate(
            Shape::cuboid(2.0, 2.0, 2.0),
            Shape::cuboid(2.0, 2.0, 2.0),
            DVec3::new(1.5, 0.1, -0.2),
        );
        assert!((r.depth - 0.5).abs() < 1e-6);
        assert!((r.normal - DVec3::X).length() < 1e-6);
        assert!((r.point_a.x - 1.0).abs() < 1e-6);
        assert!((r.point_b.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_box_depth() {
        let r = penetrate(Shape::cuboid(4.0, 2.0, 4.0), Shape::sphere(1.0), DVec3::new(0.3, 1.8, 0.0));
        assert!((r.depth - 0.2).abs() < 1e-3);
        assert!((r.normal - DVec3::Y).length() < 1e-3);
    }
}
