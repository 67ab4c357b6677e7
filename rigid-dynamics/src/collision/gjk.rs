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
//! GJK distance query
//!
//! Works on the Minkowski difference `A - B` of two support mappings and
//! keeps the simplex reduced to the feature closest to the origin, with
//! barycentric weights, so the witness points on both shapes come out of
//! the same weights.

use crate::collision::SupportMap;
use crate::math::DVec3;

/// Iteration cap
const GJK_MAX_ITERATIONS: usize = 64;

/// Relative progress below which the distance is considered converged
const GJK_RELATIVE_TOLERANCE: f64 = 1.0e-10;

/// Squared distance treated as touching
const GJK_CONTACT_TOLERANCE: f64 = 1.0e-18;

/// A point of the Minkowski difference with its two witnesses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexVertex {
    /// `a - b`
    pub w: DVec3,
    /// Support point on the first shape
    pub a: DVec3,
    /// Support point on the second shape
    pub b: DVec3,
}

/// Up to four Minkowski points with the weights of the closest point
#[derive(Debug, Clone, Copy)]
pub struct Simplex {
    vertices: [SimplexVertex; 4],
    weights: [f64; 4],
    len: usize,
}

impl Default for Simplex {
    fn default() -> Self {
        let zero = SimplexVertex {
            w: DVec3::ZERO,
            a: DVec3::ZERO,
            b: DVec3::ZERO,
        };
        Simplex {
            vertices: [zero; 4],
            weights: [0.0; 4],
            len: 0,
        }
    }
}

impl Simplex {
    /// Number of vertices
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the simplex has no vertices
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Vertices in use
    pub fn vertices(&self) -> &[SimplexVertex] {
        &self.vertices[..self.len]
    }

    fn push(&mut self, vertex: SimplexVertex) {
        self.vertices[self.len] = vertex;
        self.len += 1;
    }

    fn contains(&self, w: DVec3) -> bool {
        self.vertices().iter().any(|v| (v.w - w).length_squared() < 1.0e-20)
    }

    fn set(&mut self, kept: &[(SimplexVertex, f64)]) {
        for (i, &(v, weight)) in kept.iter().enumerate() {
            self.vertices[i] = v;
            self.weights[i] = weight;
        }
        self.len = kept.len();
    }

    fn closest(&self) -> DVec3 {
        (0..self.len).map(|i| self.vertices[i].w * self.weights[i]).sum()
    }

    fn witnesses(&self) -> (DVec3, DVec3) {
        let a = (0..self.len).map(|i| self.vertices[i].a * self.weights[i]).sum();
        let b = (0..self.len).map(|i| self.vertices[i].b * self.weights[i]).sum();
        (a, b)
    }

    /// Reduce to the feature closest to the origin
    ///
    /// Returns `false` when the origin lies inside a full tetrahedron.
    fn reduce(&mut self) -> bool {
        let v = self.vertices;
        match self.len {
            1 => {
                self.weights[0] = 1.0;
                true
            }
            2 => {
                let kept = closest_on_segment(v[0], v[1]);
                self.set(&kept);
                true
            }
            3 => {
                let kept = closest_on_triangle(v[0], v[1], v[2]);
                self.set(&kept);
                true
            }
            4 => match closest_on_tetrahedron(v[0], v[1], v[2], v[3]) {
                Some(kept) => {
                    self.set(&kept);
                    true
                }
                None => false,
            },
            _ => true,
        }
    }
}

fn closest_on_segment(a: SimplexVertex, b: SimplexVertex) -> Vec<(SimplexVertex, f64)> {
    let ab = b.w - a.w;
    let len2 = ab.length_squared();
    if len2 < 1.0e-30 {
        return vec![(a, 1.0)];
    }
    let t = -a.w.dot(ab) / len2;
    if t <= 0.0 {
        vec![(a, 1.0)]
    } else if t >= 1.0 {
        vec![(b, 1.0)]
    } else {
        vec![(a, 1.0 - t), (b, t)]
    }
}

fn closest_on_triangle(a: SimplexVertex, b: SimplexVertex, c: SimplexVertex) -> Vec<(SimplexVertex, f64)> {
    let ab = b.w - a.w;
    let ac = c.w - a.w;
    let ap = -a.w;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return vec![(a, 1.0)];
    }

    let bp = -b.w;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return vec![(b, 1.0)];
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return vec![(a, 1.0 - t), (b, t)];
    }

    let cp = -c.w;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return vec![(c, 1.0)];
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return vec![(a, 1.0 - t), (c, t)];
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return vec![(b, 1.0 - t), (c, t)];
    }

    let sum = va + vb + vc;
    if sum.abs() < 1.0e-30 {
        return closest_on_segment(a, b);
    }
    let v = vb / sum;
    let w = vc / sum;
    vec![(a, 1.0 - v - w), (b, v), (c, w)]
}

fn outside_of_plane(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> bool {
    let n = (b - a).cross(c - a);
    let sign_p = (-a).dot(n);
    let sign_d = (d - a).dot(n);
    sign_d.abs() < 1.0e-18 || sign_p * sign_d < 0.0
}

fn closest_on_tetrahedron(
    a: SimplexVertex,
    b: SimplexVertex,
    c: SimplexVertex,
    d: SimplexVertex,
) -> Option<Vec<(SimplexVertex, f64)>> {
    let faces = [(a, b, c, d), (a, c, d, b), (a, d, b, c), (b, d, c, a)];
    let mut best: Option<(f64, Vec<(SimplexVertex, f64)>)> = None;
    for (p, q, r, opposite) in faces {
        if !outside_of_plane(p.w, q.w, r.w, opposite.w) {
            continue;
        }
        let kept = closest_on_triangle(p, q, r);
        let point: DVec3 = kept.iter().map(|(v, weight)| v.w * *weight).sum();
        let d2 = point.length_squared();
        if best.as_ref().map_or(true, |(bd, _)| d2 < *bd) {
            best = Some((d2, kept));
        }
    }
    best.map(|(_, kept)| kept)
}

/// Outcome of a GJK query
#[derive(Debug, Clone)]
pub enum GjkResult {
    /// The shapes are apart
    Separated {
        /// Distance between the shapes
        distance: f64,
        /// Closest point on the first shape
        point_a: DVec3,
        /// Closest point on the second shape
        point_b: DVec3,
        /// Unit direction from the first shape to the second
        normal: DVec3,
    },
    /// The shapes touch or overlap; the simplex seeds EPA
    Overlapping(Simplex),
}

/// Distance between two support mappings
///
/// With `cores` set, the query runs on the inner cores and ignores the
/// margins; the caller subtracts them.
pub fn gjk<A, B>(a: &A, b: &B, cores: bool) -> GjkResult
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let support = |dir: DVec3| {
        let (pa, pb) = if cores {
            (a.core_support(dir), b.core_support(-dir))
        } else {
            (a.support(dir), b.support(-dir))
        };
        SimplexVertex { w: pa - pb, a: pa, b: pb }
    };

    let mut simplex = Simplex::default();
    let mut v = a.center() - b.center();
    if v.length_squared() < GJK_CONTACT_TOLERANCE {
        v = DVec3::X;
    }
    let first = support(-v);
    simplex.push(first);
    simplex.weights[0] = 1.0;
    v = first.w;
    let mut dist2 = v.length_squared();

    for _ in 0..GJK_MAX_ITERATIONS {
        if dist2 < GJK_CONTACT_TOLERANCE {
            return GjkResult::Overlapping(simplex);
        }
        let vertex = support(-v);
        if simplex.contains(vertex.w) || dist2 - v.dot(vertex.w) <= GJK_RELATIVE_TOLERANCE * dist2 {
            break;
        }
        simplex.push(vertex);
        if !simplex.reduce() {
            return GjkResult::Overlapping(simplex);
        }
        let next = simplex.closest();
        let next2 = next.length_squared();
        if next2 >= dist2 {
            break;
        }
        v = next;
        dist2 = next2;
    }

    if dist2 < GJK_CONTACT_TOLERANCE {
        return GjkResult::Overlapping(simplex);
    }
    let (point_a, point_b) = simplex.witnesses();
    let distance = dist2.sqrt();
    GjkResult::Separated {
        distance,
        point_a,
        point_b,
        normal: -v / distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::InstanceProxy;
    use crate::math::Frame;
    use crate::shape::{Shape, ShapeInstance};

    fn proxy(shape: Shape, position: DVec3) -> (ShapeInstance, Frame) {
        (ShapeInstance::new(shape), Frame::from_position(position))
    }

    #[test]
    fn test_separated_boxes() {
        let (a, fa) = proxy(Shape::cuboid(2.0, 2.0, 2.0), DVec3::ZERO);
        let (b, fb) = proxy(Shape::cuboid(2.0, 2.0, 2.0), DVec3::new(3.5, 0.3, 0.0));
        match gjk(&InstanceProxy::new(&a, fa), &InstanceProxy::new(&b, fb), false) {
            GjkResult::Separated {
                distance,
                point_a,
                point_b,
                normal,
            } => {
                assert!((distance - 1.5).abs() < 1e-9);
                assert!((normal - DVec3::X).length() < 1e-9);
                assert!((point_a.x - 1.0).abs() < 1e-9);
                assert!((point_b.x - 2.5).abs() < 1e-9);
            }
            GjkResult::Overlapping(_) => panic!("boxes are apart"),
        }
    }

    #[test]
    fn test_sphere_cores_are_points() {
        let (a, fa) = proxy(Shape::sphere(1.0), DVec3::ZERO);
        let (b, fb) = proxy(Shape::sphere(0.5), DVec3::new(0.0, 1.2, 0.0));
        match gjk(&InstanceProxy::new(&a, fa), &InstanceProxy::new(&b, fb), true) {
            GjkResult::Separated { distance, normal, .. } => {
                assert!((distance - 1.2).abs() < 1e-12);
                assert!((normal - DVec3::Y).length() < 1e-12);
            }
            GjkResult::Overlapping(_) => panic!("cores are apart"),
        }
    }

    #[test]
    fn test_overlapping_boxes() {
        let (a, fa) = proxy(Shape::cuboid(2.0, 2.0, 2.0), DVec3::ZERO);
        let (b, fb) = proxy(Shape::cuboid(2.0, 2.0, 2.0), DVec3::new(1.5, 0.2, 0.1));
        let result = gjk(&InstanceProxy::new(&a, fa), &InstanceProxy::new(&b, fb), false);
        assert!(matches!(result, GjkResult::Overlapping(_)));
    }

    #[test]
    fn test_triangle_region_edge() {
        let vertex = |w: DVec3| SimplexVertex { w, a: w, b: DVec3::ZERO };
        let kept = closest_on_triangle(
            vertex(DVec3::new(-1.0, 1.0, 0.0)),
            vertex(DVec3::new(1.0, 1.0, 0.0)),
            vertex(DVec3::new(0.0, 3.0, 0.0)),
        );
        assert_eq!(kept.len(), 2);
        let point: DVec3 = kept.iter().map(|(v, w)| v.w * *w).sum();
        assert!((point - DVec3::new(0.0, 1.0, 0.0)).length() < 1e-12);
    }
}
