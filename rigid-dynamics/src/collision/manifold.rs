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
//! Multi-point manifolds
//!
//! GJK and EPA give one normal and one pair of witness points. To get a
//! stable resting contact each shape is sliced by a plane a little below
//! its extreme point along the normal, both sections are flattened onto
//! the contact plane, and the overlap of the two flat features becomes the
//! manifold. Features are polygons (faces), segments (edges, capsule
//! cores) or single points (vertices, sphere centers).

use crate::collision::contact::ContactPoint;
use crate::collision::ConvexProxy;
use crate::math::{orthonormal_basis, DVec3};
use crate::shape::convex_polygon;

/// Depth of the slice below the extreme point, on top of the penetration
pub(crate) const SLICE_DEPTH: f64 = 1.0 / 128.0;

const PARALLEL_TOLERANCE: f64 = 1.0e-6;

type Point2 = (f64, f64);

/// Contact plane with a 2D frame
struct ContactPlane {
    origin: DVec3,
    u: DVec3,
    v: DVec3,
}

impl ContactPlane {
    fn new(origin: DVec3, normal: DVec3) -> Self {
        let (u, v) = orthonormal_basis(normal);
        ContactPlane { origin, u, v }
    }

    fn flatten(&self, p: DVec3) -> Point2 {
        let d = p - self.origin;
        (d.dot(self.u), d.dot(self.v))
    }

    fn lift(&self, p: Point2) -> DVec3 {
        self.origin + self.u * p.0 + self.v * p.1
    }
}

fn cross2(o: Point2, a: Point2, b: Point2) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn lerp2(a: Point2, b: Point2, t: f64) -> Point2 {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

/// Feature of one shape flattened onto the contact plane
fn flat_feature(section: Vec<DVec3>, normal: DVec3, plane: &ContactPlane) -> Vec<Point2> {
    let flat: Vec<DVec3> = section
        .into_iter()
        .map(|p| p - normal * normal.dot(p - plane.origin))
        .collect();
    convex_polygon(flat, normal).into_iter().map(|p| plane.flatten(p)).collect()
}

/// Sutherland-Hodgman clip of `subject` by the counter-clockwise `clip`
fn clip_polygon(subject: &[Point2], clip: &[Point2]) -> Vec<Point2> {
    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        for j in 0..input.len() {
            let p = input[j];
            let q = input[(j + 1) % input.len()];
            let sp = cross2(a, b, p);
            let sq = cross2(a, b, q);
            if sp >= 0.0 {
                output.push(p);
            }
            if (sp >= 0.0) != (sq >= 0.0) {
                output.push(lerp2(p, q, sp / (sp - sq)));
            }
        }
    }
    output
}

/// Part of a segment inside a counter-clockwise polygon
fn clip_segment(a: Point2, b: Point2, polygon: &[Point2]) -> Vec<Point2> {
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for i in 0..polygon.len() {
        let e0 = polygon[i];
        let e1 = polygon[(i + 1) % polygon.len()];
        let sa = cross2(e0, e1, a);
        let sb = cross2(e0, e1, b);
        if sa < 0.0 && sb < 0.0 {
            return Vec::new();
        }
        if sa < 0.0 {
            t0 = t0.max(sa / (sa - sb));
        } else if sb < 0.0 {
            t1 = t1.min(sa / (sa - sb));
        }
        if t0 > t1 {
            return Vec::new();
        }
    }
    let p0 = lerp2(a, b, t0);
    let p1 = lerp2(a, b, t1);
    if (p1.0 - p0.0).hypot(p1.1 - p0.1) < 1.0e-9 {
        vec![p0]
    } else {
        vec![p0, p1]
    }
}

/// Overlap of two segments; parallel segments give their shared stretch
fn clip_segments(a0: Point2, a1: Point2, b0: Point2, b1: Point2) -> Vec<Point2> {
    let da = (a1.0 - a0.0, a1.1 - a0.1);
    let db = (b1.0 - b0.0, b1.1 - b0.1);
    let la = da.0.hypot(da.1);
    let lb = db.0.hypot(db.1);
    if la < 1.0e-12 || lb < 1.0e-12 {
        return Vec::new();
    }
    let denom = da.0 * db.1 - da.1 * db.0;
    if denom.abs() <= PARALLEL_TOLERANCE * la * lb {
        let dir = (da.0 / la, da.1 / la);
        let project = |p: Point2| (p.0 - a0.0) * dir.0 + (p.1 - a0.1) * dir.1;
        let (s0, s1) = {
            let (x, y) = (project(b0), project(b1));
            (x.min(y), x.max(y))
        };
        let lo = s0.max(0.0);
        let hi = s1.min(la);
        if lo > hi {
            return Vec::new();
        }
        let at = |s: f64| (a0.0 + dir.0 * s, a0.1 + dir.1 * s);
        return if hi - lo < 1.0e-9 { vec![at(lo)] } else { vec![at(lo), at(hi)] };
    }
    let w = (b0.0 - a0.0, b0.1 - a0.1);
    let t = (w.0 * db.1 - w.1 * db.0) / denom;
    let s = (w.0 * da.1 - w.1 * da.0) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&s) {
        vec![lerp2(a0, a1, t)]
    } else {
        Vec::new()
    }
}

/// Overlap of two flat features
fn clip_features(a: &[Point2], b: &[Point2]) -> Vec<Point2> {
    match (a.len(), b.len()) {
        (la, lb) if la >= 3 && lb >= 3 => clip_polygon(b, a),
        (2, lb) if lb >= 3 => clip_segment(a[0], a[1], b),
        (la, 2) if la >= 3 => clip_segment(b[0], b[1], a),
        (2, 2) => clip_segments(a[0], a[1], b[0], b[1]),
        _ => Vec::new(),
    }
}

/// Build the manifold of two convex proxies
///
/// `normal` points from `a` to `b`, `penetration` is negative for a gap,
/// and the witness points lie on the two surfaces. Every point gets the
/// penetration of the pair. When the features do not overlap in a useful
/// way the manifold is the single midpoint of the witnesses.
pub fn build_manifold<A, B>(
    a: &A,
    b: &B,
    normal: DVec3,
    penetration: f64,
    point_a: DVec3,
    point_b: DVec3,
) -> Vec<ContactPoint>
where
    A: ConvexProxy + ?Sized,
    B: ConvexProxy + ?Sized,
{
    let mid = (point_a + point_b) * 0.5;
    let single = || vec![ContactPoint::new(mid, normal, penetration)];

    let depth = penetration.max(0.0) + SLICE_DEPTH;
    let top_a = a.support(normal).dot(normal);
    let bottom_b = b.support(-normal).dot(normal);
    let section_a = a.section(normal, normal * (top_a - depth));
    let section_b = b.section(normal, normal * (bottom_b + depth));
    if section_a.len() < 2 || section_b.len() < 2 {
        return single();
    }

    let plane = ContactPlane::new(mid, normal);
    let feature_a = flat_feature(section_a, normal, &plane);
    let feature_b = flat_feature(section_b, normal, &plane);
    let clipped = clip_features(&feature_a, &feature_b);
    if clipped.is_empty() {
        return single();
    }
    clipped
        .into_iter()
        .map(|p| ContactPoint::new(plane.lift(p), normal, penetration))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(half: f64, cx: f64, cy: f64) -> Vec<Point2> {
        vec![
            (cx - half, cy - half),
            (cx + half, cy - half),
            (cx + half, cy + half),
            (cx - half, cy + half),
        ]
    }

    fn area(polygon: &[Point2]) -> f64 {
        let n = polygon.len();
        (0..n).map(|i| cross2((0.0, 0.0), polygon[i], polygon[(i + 1) % n])).sum::<f64>() * 0.5
    }

    #[test]
    fn test_clip_offset_squares() {
        let clipped = clip_polygon(&square(1.0, 1.0, 1.0), &square(1.0, 0.0, 0.0));
        assert!((area(&clipped) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_disjoint_squares() {
        let clipped = clip_polygon(&square(0.5, 3.0, 0.0), &square(0.5, 0.0, 0.0));
        assert!(clipped.is_empty());
    }

    #[test]
    fn test_segment_through_square() {
        let clipped = clip_segment((-3.0, 0.5), (3.0, 0.5), &square(1.0, 0.0, 0.0));
        assert_eq!(clipped.len(), 2);
        assert!((clipped[0].0 + 1.0).abs() < 1e-12);
        assert!((clipped[1].0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_segments_share_overlap() {
        let clipped = clip_segments((0.0, 0.0), (2.0, 0.0), (1.0, 0.0), (5.0, 0.0));
        assert_eq!(clipped, vec![(1.0, 0.0), (2.0, 0.0)]);
        let crossing = clip_segments((0.0, 0.0), (2.0, 0.0), (1.0, -1.0), (1.0, 1.0));
        assert_eq!(crossing, vec![(1.0, 0.0)]);
    }
}
