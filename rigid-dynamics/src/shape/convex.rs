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
//! Convex primitives
//!
//! Every primitive is expressed in its own shape space, centered at the
//! origin. Queries take and return shape-space quantities; the instance
//! layer maps them through scale and placement.

use crate::geometry::Aabb;
use crate::math::{orthonormal_basis, vertex_list_to_index_list, DMat3, DVec3};
use crate::shape::MassProperties;

/// Points closer than this to a plane count as lying on it
const PLANE_TOLERANCE: f64 = 1.0e-9;

/// Sphere of a given radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Radius
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere
    ///
    /// # Panics
    ///
    /// Panics if the radius is not positive and finite.
    pub fn new(radius: f64) -> Self {
        assert!(radius.is_finite() && radius > 0.0, "Sphere radius must be positive and finite");
        Sphere { radius }
    }

    /// Farthest point along `dir`
    pub fn support(&self, dir: DVec3) -> DVec3 {
        dir.try_normalize().unwrap_or(DVec3::X) * self.radius
    }

    /// Shape-space bounding box
    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(DVec3::ZERO, DVec3::splat(self.radius))
    }

    /// Ray cast from outside the sphere
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let d = p1 - p0;
        let a = d.length_squared();
        if a < 1.0e-24 {
            return None;
        }
        let b = p0.dot(d);
        let c = p0.length_squared() - self.radius * self.radius;
        if c < 0.0 {
            return None;
        }
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let t = (-b - disc.sqrt()) / a;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        let normal = (p0 + d * t).normalize_or_zero();
        Some((t, normal))
    }

    /// Contact point of the sphere with a plane, if the plane cuts it
    pub fn plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        let dist = -normal.dot(point);
        if dist.abs() < self.radius {
            vec![-normal * dist]
        } else {
            Vec::new()
        }
    }

    /// Volume, center and unit-mass covariance
    pub fn mass_properties(&self) -> MassProperties {
        let r2 = self.radius * self.radius;
        MassProperties {
            volume: 4.0 / 3.0 * std::f64::consts::PI * r2 * self.radius,
            center: DVec3::ZERO,
            covariance: DMat3::from_diagonal(DVec3::splat(r2 / 5.0)),
        }
    }
}

/// Box given by its half extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShape {
    /// Half size along each axis
    pub half_extents: DVec3,
}

impl BoxShape {
    /// Create a box from full side lengths
    ///
    /// # Panics
    ///
    /// Panics if any side is not positive and finite.
    pub fn new(size_x: f64, size_y: f64, size_z: f64) -> Self {
        let size = DVec3::new(size_x, size_y, size_z);
        assert!(
            size.is_finite() && size.min_element() > 0.0,
            "Box sides must be positive and finite"
        );
        BoxShape {
            half_extents: size * 0.5,
        }
    }

    /// The eight corners
    pub fn vertices(&self) -> [DVec3; 8] {
        let h = self.half_extents;
        [
            DVec3::new(-h.x, -h.y, -h.z),
            DVec3::new(h.x, -h.y, -h.z),
            DVec3::new(h.x, h.y, -h.z),
            DVec3::new(-h.x, h.y, -h.z),
            DVec3::new(-h.x, -h.y, h.z),
            DVec3::new(h.x, -h.y, h.z),
            DVec3::new(h.x, h.y, h.z),
            DVec3::new(-h.x, h.y, h.z),
        ]
    }

    /// Edges as corner index pairs
    pub const EDGES: [(usize, usize); 12] = [
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 0),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 4),
        (0, 4),
        (1, 5),
        (2, 6),
        (3, 7),
    ];

    /// Farthest point along `dir`
    pub fn support(&self, dir: DVec3) -> DVec3 {
        let h = self.half_extents;
        DVec3::new(
            if dir.x >= 0.0 { h.x } else { -h.x },
            if dir.y >= 0.0 { h.y } else { -h.y },
            if dir.z >= 0.0 { h.z } else { -h.z },
        )
    }

    /// Shape-space bounding box
    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(DVec3::ZERO, self.half_extents)
    }

    /// Slab ray cast from outside the box
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let d = p1 - p0;
        let h = self.half_extents;
        let mut t_enter = -f64::MAX;
        let mut t_exit = f64::MAX;
        let mut normal = DVec3::ZERO;
        for axis in 0..3 {
            if d[axis].abs() < 1.0e-12 {
                if p0[axis].abs() > h[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d[axis];
            let mut t0 = (-h[axis] - p0[axis]) * inv;
            let mut t1 = (h[axis] - p0[axis]) * inv;
            let mut sign = -1.0;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
                sign = 1.0;
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = DVec3::ZERO;
                normal[axis] = sign;
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }
        if t_enter < 0.0 || t_enter > 1.0 || normal == DVec3::ZERO {
            return None;
        }
        Some((t_enter, normal))
    }

    /// Cross-section polygon with a plane
    pub fn plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        polytope_plane_intersection(&self.vertices(), &Self::EDGES, normal, point)
    }

    /// Volume, center and unit-mass covariance
    pub fn mass_properties(&self) -> MassProperties {
        let h = self.half_extents;
        MassProperties {
            volume: 8.0 * h.x * h.y * h.z,
            center: DVec3::ZERO,
            covariance: DMat3::from_diagonal(h * h / 3.0),
        }
    }
}

/// Capsule along the local Y axis: a segment core swept by a sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    /// Sweep radius
    pub radius: f64,
    /// Half length of the core segment
    pub half_height: f64,
}

impl Capsule {
    /// Create a capsule from its radius and the length of its core segment
    ///
    /// # Panics
    ///
    /// Panics if the radius is not positive or the height is negative.
    pub fn new(radius: f64, height: f64) -> Self {
        assert!(radius.is_finite() && radius > 0.0, "Capsule radius must be positive and finite");
        assert!(height.is_finite() && height >= 0.0, "Capsule height must be non-negative");
        Capsule {
            radius,
            half_height: height * 0.5,
        }
    }

    /// Endpoint of the core segment along `dir`
    pub fn core_support(&self, dir: DVec3) -> DVec3 {
        DVec3::new(0.0, if dir.y >= 0.0 { self.half_height } else { -self.half_height }, 0.0)
    }

    /// Farthest point along `dir`
    pub fn support(&self, dir: DVec3) -> DVec3 {
        self.core_support(dir) + dir.try_normalize().unwrap_or(DVec3::X) * self.radius
    }

    /// Shape-space bounding box
    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(
            DVec3::ZERO,
            DVec3::new(self.radius, self.half_height + self.radius, self.radius),
        )
    }

    /// Ray cast from outside the capsule
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let h = self.half_height;
        let r = self.radius;
        let closest_y = p0.y.clamp(-h, h);
        if (p0 - DVec3::new(0.0, closest_y, 0.0)).length_squared() < r * r {
            return None;
        }

        let d = p1 - p0;
        let mut best: Option<(f64, DVec3)> = None;
        let mut keep = |candidate: Option<(f64, DVec3)>| {
            if let Some((t, n)) = candidate {
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, n));
                }
            }
        };

        // side of the cylinder
        let a = d.x * d.x + d.z * d.z;
        if a > 1.0e-24 {
            let b = p0.x * d.x + p0.z * d.z;
            let c = p0.x * p0.x + p0.z * p0.z - r * r;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let t = (-b - disc.sqrt()) / a;
                let y = p0.y + d.y * t;
                if (0.0..=1.0).contains(&t) && y.abs() <= h {
                    let p = p0 + d * t;
                    keep(Some((t, DVec3::new(p.x, 0.0, p.z).normalize_or_zero())));
                }
            }
        }

        // end caps
        let cap = Sphere { radius: r };
        for y in [h, -h] {
            let offset = DVec3::new(0.0, y, 0.0);
            keep(cap.ray_cast(p0 - offset, p1 - offset));
        }
        best
    }

    /// Points where the plane cuts the end spheres
    pub fn plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        let mut out = Vec::with_capacity(2);
        for y in [self.half_height, -self.half_height] {
            let center = DVec3::new(0.0, y, 0.0);
            let dist = normal.dot(center - point);
            if dist.abs() < self.radius {
                out.push(center - normal * dist);
            }
        }
        if out.len() == 2 && (out[0] - out[1]).length_squared() < 1.0e-12 {
            out.pop();
        }
        out
    }

    /// Volume, center and unit-mass covariance
    pub fn mass_properties(&self) -> MassProperties {
        let r = self.radius;
        let h = self.half_height;
        let pi = std::f64::consts::PI;
        let cylinder = pi * r * r * 2.0 * h;
        let sphere = 4.0 / 3.0 * pi * r * r * r;
        let volume = cylinder + sphere;

        let radial = (cylinder * r * r / 4.0 + sphere * r * r / 5.0) / volume;
        let axial = (cylinder * h * h / 3.0 + sphere * (h * h + 0.75 * h * r + r * r / 5.0)) / volume;
        MassProperties {
            volume,
            center: DVec3::ZERO,
            covariance: DMat3::from_diagonal(DVec3::new(radial, axial, radial)),
        }
    }
}

/// One face of a convex hull
#[derive(Debug, Clone, PartialEq)]
pub struct HullFace {
    /// Outward unit normal
    pub normal: DVec3,
    /// Plane offset, `normal . p == offset` on the face
    pub offset: f64,
    /// Vertex indices in counter-clockwise order around the normal
    pub vertices: Vec<usize>,
}

/// Convex hull of a point cloud
///
/// Faces are found by testing every candidate plane, which is cubic in the
/// vertex count; the type is meant for hulls of a few dozen points.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    vertices: Vec<DVec3>,
    faces: Vec<HullFace>,
    edges: Vec<(usize, usize)>,
    aabb: Aabb,
}

impl ConvexHull {
    /// Build the hull of a point cloud
    ///
    /// Returns `None` for degenerate input (fewer than four non-coplanar
    /// points).
    pub fn new(points: &[DVec3]) -> Option<Self> {
        let mut flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        let (count, _) = vertex_list_to_index_list(&mut flat, 3, 3, 1.0e-6);
        if count < 4 {
            return None;
        }
        let cloud: Vec<DVec3> = flat[..count * 3]
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect();

        let scale = Aabb::from_points(&cloud).half_extents().max_element().max(1.0e-6);
        let eps = 1.0e-7 * scale;

        let mut planes: Vec<(DVec3, f64)> = Vec::new();
        for i in 0..count {
            for j in i + 1..count {
                for k in j + 1..count {
                    let n = (cloud[j] - cloud[i]).cross(cloud[k] - cloud[i]);
                    let Some(n) = n.try_normalize() else { continue };
                    let w = n.dot(cloud[i]);
                    let mut above = false;
                    let mut below = false;
                    for p in &cloud {
                        let s = n.dot(*p) - w;
                        above |= s > eps;
                        below |= s < -eps;
                        if above && below {
                            break;
                        }
                    }
                    let plane = match (above, below) {
                        (false, true) => (n, w),
                        (true, false) => (-n, -w),
                        _ => continue,
                    };
                    let known = planes
                        .iter()
                        .any(|(pn, pw)| pn.dot(plane.0) > 1.0 - 1.0e-9 && (pw - plane.1).abs() < eps);
                    if !known {
                        planes.push(plane);
                    }
                }
            }
        }
        if planes.len() < 4 {
            return None;
        }

        // keep only vertices that lie on some face
        let mut used = vec![false; count];
        let mut faces = Vec::with_capacity(planes.len());
        for (normal, offset) in planes {
            let on_plane: Vec<usize> = (0..count)
                .filter(|&v| (normal.dot(cloud[v]) - offset).abs() <= eps)
                .collect();
            let ordered = order_polygon(&on_plane, &cloud, normal);
            for &v in &ordered {
                used[v] = true;
            }
            faces.push(HullFace {
                normal,
                offset,
                vertices: ordered,
            });
        }

        let mut remap = vec![usize::MAX; count];
        let mut vertices = Vec::new();
        for v in 0..count {
            if used[v] {
                remap[v] = vertices.len();
                vertices.push(cloud[v]);
            }
        }
        let mut edges = Vec::new();
        for face in &mut faces {
            for v in face.vertices.iter_mut() {
                *v = remap[*v];
            }
            let n = face.vertices.len();
            for e in 0..n {
                let a = face.vertices[e];
                let b = face.vertices[(e + 1) % n];
                let edge = (a.min(b), a.max(b));
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }

        let aabb = Aabb::from_points(&vertices);
        Some(ConvexHull {
            vertices,
            faces,
            edges,
            aabb,
        })
    }

    /// Hull vertices
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Hull faces
    pub fn faces(&self) -> &[HullFace] {
        &self.faces
    }

    /// Unique hull edges
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Farthest vertex along `dir`
    pub fn support(&self, dir: DVec3) -> DVec3 {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(dir);
        for v in &self.vertices[1..] {
            let d = v.dot(dir);
            if d > best_dot {
                best_dot = d;
                best = *v;
            }
        }
        best
    }

    /// Shape-space bounding box
    pub fn local_aabb(&self) -> Aabb {
        self.aabb
    }

    /// Ray cast by clipping against the face planes
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let d = p1 - p0;
        let mut t_enter = -f64::MAX;
        let mut t_exit = f64::MAX;
        let mut normal = DVec3::ZERO;
        let mut outside = false;
        for face in &self.faces {
            let dist = face.normal.dot(p0) - face.offset;
            let denom = face.normal.dot(d);
            outside |= dist > 0.0;
            if denom.abs() < 1.0e-14 {
                if dist > 0.0 {
                    return None;
                }
                continue;
            }
            let t = -dist / denom;
            if denom < 0.0 {
                if t > t_enter {
                    t_enter = t;
                    normal = face.normal;
                }
            } else {
                t_exit = t_exit.min(t);
            }
            if t_enter > t_exit {
                return None;
            }
        }
        if !outside || !(0.0..=1.0).contains(&t_enter) {
            return None;
        }
        Some((t_enter, normal))
    }

    /// Cross-section polygon with a plane
    pub fn plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        polytope_plane_intersection(&self.vertices, &self.edges, normal, point)
    }

    /// Volume, center and unit-mass covariance from a tetrahedral fan
    pub fn mass_properties(&self) -> MassProperties {
        let origin = self.vertices.iter().copied().sum::<DVec3>() / self.vertices.len() as f64;
        let mut volume = 0.0;
        let mut first = DVec3::ZERO;
        let mut second = DMat3::ZERO;
        for face in &self.faces {
            let v = &face.vertices;
            for i in 1..v.len().saturating_sub(1) {
                let a = DVec3::ZERO;
                let b = self.vertices[v[0]] - origin;
                let c = self.vertices[v[i]] - origin;
                let e = self.vertices[v[i + 1]] - origin;
                let vol = b.dot(c.cross(e)) / 6.0;
                if vol.abs() < 1.0e-18 {
                    continue;
                }
                let sum = a + b + c + e;
                volume += vol;
                first += sum * (vol / 4.0);
                let outer = outer(a, a) + outer(b, b) + outer(c, c) + outer(e, e) + outer(sum, sum);
                second += outer * (vol / 20.0);
            }
        }
        if volume <= 0.0 {
            return MassProperties::zero();
        }
        let local_center = first / volume;
        let covariance = second * (1.0 / volume) - outer(local_center, local_center);
        MassProperties {
            volume,
            center: origin + local_center,
            covariance,
        }
    }
}

/// `a * b^T`
pub(crate) fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Intersect a convex polytope, given by corners and edges, with a plane
pub(crate) fn polytope_plane_intersection(
    vertices: &[DVec3],
    edges: &[(usize, usize)],
    normal: DVec3,
    point: DVec3,
) -> Vec<DVec3> {
    let side: Vec<f64> = vertices.iter().map(|v| normal.dot(*v - point)).collect();
    let mut points = Vec::new();
    for (i, s) in side.iter().enumerate() {
        if s.abs() <= PLANE_TOLERANCE {
            points.push(vertices[i]);
        }
    }
    for &(a, b) in edges {
        let (sa, sb) = (side[a], side[b]);
        if (sa > PLANE_TOLERANCE && sb < -PLANE_TOLERANCE) || (sa < -PLANE_TOLERANCE && sb > PLANE_TOLERANCE) {
            let t = sa / (sa - sb);
            points.push(vertices[a] + (vertices[b] - vertices[a]) * t);
        }
    }
    convex_polygon(points, normal)
}

/// Order coplanar points into a convex polygon around `normal`
///
/// Near-duplicate points are merged and interior points dropped.
pub(crate) fn convex_polygon(points: Vec<DVec3>, normal: DVec3) -> Vec<DVec3> {
    if points.len() < 3 {
        let mut points = points;
        if points.len() == 2 && (points[0] - points[1]).length_squared() < 1.0e-12 {
            points.pop();
        }
        return points;
    }
    let (u, v) = orthonormal_basis(normal);
    let mut projected: Vec<(f64, f64, DVec3)> = points.iter().map(|p| (p.dot(u), p.dot(v), *p)).collect();
    projected.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    projected.dedup_by(|a, b| (a.0 - b.0).abs() < 1.0e-9 && (a.1 - b.1).abs() < 1.0e-9);
    if projected.len() < 3 {
        return projected.into_iter().map(|p| p.2).collect();
    }

    let cross = |o: &(f64, f64, DVec3), a: &(f64, f64, DVec3), b: &(f64, f64, DVec3)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };
    // Andrew's monotone chain
    let mut hull: Vec<(f64, f64, DVec3)> = Vec::with_capacity(projected.len() * 2);
    for p in projected.iter() {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 1.0e-12 {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in projected.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 1.0e-12 {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull.into_iter().map(|p| p.2).collect()
}

fn order_polygon(indices: &[usize], cloud: &[DVec3], normal: DVec3) -> Vec<usize> {
    let points: Vec<DVec3> = indices.iter().map(|&i| cloud[i]).collect();
    let ordered = convex_polygon(points, normal);
    ordered
        .iter()
        .filter_map(|p| indices.iter().copied().find(|&i| cloud[i] == *p))
        .collect()
}
