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
//! Narrow phase
//!
//! Convex pairs go through GJK on their cores. A separation larger than
//! the allowed gap ends the query; a smaller one becomes a speculative or
//! shallow contact from the witness points, and overlapping cores fall
//! through to EPA on the full shapes. The single normal is then widened
//! into a manifold by [`build_manifold`].
//!
//! Compounds recurse into the children whose boxes overlap the other
//! shape, and static meshes into their triangles. Two meshes never
//! collide.

mod contact;
mod epa;
mod gjk;
mod manifold;

pub use contact::{
    prune_duplicates, reduce_manifold, Contact, ContactId, ContactKey, ContactMaterial, ContactPoint,
};
pub use epa::{epa, EpaResult};
pub use gjk::{gjk, GjkResult, Simplex, SimplexVertex};
pub use manifold::build_manifold;

use crate::body::Body;
use crate::geometry::Aabb;
use crate::math::{DVec3, Frame};
use crate::shape::{polytope_plane_intersection, Shape, ShapeInstance};

/// Convex geometry seen through its support mapping
pub trait SupportMap {
    /// Farthest world point along `dir`
    fn support(&self, dir: DVec3) -> DVec3;

    /// Support of the inner core
    fn core_support(&self, dir: DVec3) -> DVec3 {
        self.support(dir)
    }

    /// Radius swept around the core
    fn margin(&self) -> f64 {
        0.0
    }

    /// A point inside the shape, used to seed searches
    fn center(&self) -> DVec3;
}

/// Convex geometry that can also be sliced by a plane
pub trait ConvexProxy: SupportMap {
    /// World cross-section with the plane through `point`
    fn section(&self, normal: DVec3, point: DVec3) -> Vec<DVec3>;
}

/// A convex shape instance placed in the world by a frame
#[derive(Debug, Clone, Copy)]
pub struct InstanceProxy<'a> {
    instance: &'a ShapeInstance,
    frame: Frame,
}

impl<'a> InstanceProxy<'a> {
    /// Place `instance` with the instance-to-world transform `frame`
    pub fn new(instance: &'a ShapeInstance, frame: Frame) -> Self {
        InstanceProxy { instance, frame }
    }
}

impl SupportMap for InstanceProxy<'_> {
    fn support(&self, dir: DVec3) -> DVec3 {
        self.frame
            .transform_point(self.instance.support(self.frame.unrotate_vector(dir)))
    }

    fn core_support(&self, dir: DVec3) -> DVec3 {
        self.frame
            .transform_point(self.instance.core_support(self.frame.unrotate_vector(dir)))
    }

    fn margin(&self) -> f64 {
        self.instance.margin()
    }

    fn center(&self) -> DVec3 {
        let (center, _) = self.instance.calculate_obb();
        self.frame.transform_point(center)
    }
}

impl ConvexProxy for InstanceProxy<'_> {
    fn section(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        let local_normal = self.frame.unrotate_vector(normal);
        let local_point = self.frame.untransform_point(point);
        let mut points = self.instance.calculate_plane_intersection(local_normal, local_point);
        points.iter_mut().for_each(|p| *p = self.frame.transform_point(*p));
        points
    }
}

/// One world-space triangle of a static mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleProxy {
    /// Corners
    pub vertices: [DVec3; 3],
}

const TRIANGLE_EDGES: [(usize, usize); 3] = [(0, 1), (1, 2), (2, 0)];

impl SupportMap for TriangleProxy {
    fn support(&self, dir: DVec3) -> DVec3 {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(dir);
        for &v in &self.vertices[1..] {
            let d = v.dot(dir);
            if d > best_dot {
                best = v;
                best_dot = d;
            }
        }
        best
    }

    fn center(&self) -> DVec3 {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]) / 3.0
    }
}

impl ConvexProxy for TriangleProxy {
    fn section(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        let cut = polytope_plane_intersection(&self.vertices, &TRIANGLE_EDGES, normal, point);
        if !cut.is_empty() {
            return cut;
        }
        // a triangle flat against the plane has no crossing edge
        self.vertices
            .iter()
            .map(|&v| v - normal * normal.dot(v - point))
            .collect()
    }
}

/// Contact points between two convex proxies
///
/// Pairs farther apart than `max_gap` produce nothing. Normals point from
/// `a` to `b`.
pub fn collide_convex<A, B>(a: &A, b: &B, max_gap: f64) -> Vec<ContactPoint>
where
    A: ConvexProxy + ?Sized,
    B: ConvexProxy + ?Sized,
{
    let margin_a = a.margin();
    let margin_b = b.margin();

    let (normal, penetration, point_a, point_b) = match gjk(a, b, true) {
        GjkResult::Separated {
            distance,
            point_a,
            point_b,
            normal,
        } => {
            let gap = distance - margin_a - margin_b;
            if gap > max_gap {
                return Vec::new();
            }
            (normal, -gap, point_a + normal * margin_a, point_b - normal * margin_b)
        }
        GjkResult::Overlapping(core_simplex) => {
            let simplex = if margin_a == 0.0 && margin_b == 0.0 {
                core_simplex
            } else {
                match gjk(a, b, false) {
                    GjkResult::Overlapping(simplex) => simplex,
                    GjkResult::Separated { .. } => core_simplex,
                }
            };
            let Some(result) = epa(a, b, &simplex) else {
                return Vec::new();
            };
            (result.normal, result.depth, result.point_a, result.point_b)
        }
    };
    build_manifold(a, b, normal, penetration, point_a, point_b)
}

/// Box of `aabb` seen from the shape space of an instance placed at `frame`
fn to_shape_space(instance: &ShapeInstance, frame: &Frame, aabb: &Aabb) -> Aabb {
    let mut corners = [DVec3::ZERO; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let p = DVec3::new(
            if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
            if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
            if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
        );
        *corner = instance.to_shape_space(frame.untransform_point(p));
    }
    Aabb::from_points(&corners)
}

/// Contact points between two placed instances, appended to `out`
///
/// `frame_a` and `frame_b` map instance space to world space.
pub fn collide_instances(
    a: &ShapeInstance,
    frame_a: Frame,
    b: &ShapeInstance,
    frame_b: Frame,
    max_gap: f64,
    out: &mut Vec<ContactPoint>,
) {
    if !a.collision_enabled() || !b.collision_enabled() {
        return;
    }
    match (a.shape().as_ref(), b.shape().as_ref()) {
        (Shape::StaticMesh(_), Shape::StaticMesh(_)) => {}
        (Shape::Compound(compound), _) => {
            let query = to_shape_space(a, &frame_a, &b.calculate_aabb(&frame_b).padded(max_gap));
            compound.query_aabb(&query, |index| {
                let child = &compound.children()[index];
                collide_instances(child, frame_a * child.local_matrix(), b, frame_b, max_gap, out);
            });
        }
        (_, Shape::Compound(compound)) => {
            let query = to_shape_space(b, &frame_b, &a.calculate_aabb(&frame_a).padded(max_gap));
            compound.query_aabb(&query, |index| {
                let child = &compound.children()[index];
                collide_instances(a, frame_a, child, frame_b * child.local_matrix(), max_gap, out);
            });
        }
        (Shape::StaticMesh(mesh), _) => {
            let other = InstanceProxy::new(b, frame_b);
            let query = to_shape_space(a, &frame_a, &b.calculate_aabb(&frame_b).padded(max_gap));
            mesh.query_aabb(&query, |index| {
                let triangle = mesh_triangle(a, &frame_a, mesh.triangle(index));
                out.extend(collide_convex(&triangle, &other, max_gap));
            });
        }
        (_, Shape::StaticMesh(mesh)) => {
            let other = InstanceProxy::new(a, frame_a);
            let query = to_shape_space(b, &frame_b, &a.calculate_aabb(&frame_a).padded(max_gap));
            mesh.query_aabb(&query, |index| {
                let triangle = mesh_triangle(b, &frame_b, mesh.triangle(index));
                out.extend(collide_convex(&other, &triangle, max_gap));
            });
        }
        _ => {
            let pa = InstanceProxy::new(a, frame_a);
            let pb = InstanceProxy::new(b, frame_b);
            out.extend(collide_convex(&pa, &pb, max_gap));
        }
    }
}

fn mesh_triangle(instance: &ShapeInstance, frame: &Frame, corners: [DVec3; 3]) -> TriangleProxy {
    TriangleProxy {
        vertices: corners.map(|c| frame.transform_point(instance.to_instance_space(c))),
    }
}

/// Reduced manifold between two bodies at their current placement
///
/// Normals point from `body0` to `body1`.
pub fn collide_bodies(body0: &Body, body1: &Body, max_gap: f64) -> Vec<ContactPoint> {
    let mut points = Vec::new();
    collide_instances(
        body0.shape(),
        body0.shape().global_matrix(),
        body1.shape(),
        body1.shape().global_matrix(),
        max_gap,
        &mut points,
    );
    prune_duplicates(&mut points);
    reduce_manifold(&mut points);
    points
}

/// Hooks into contact generation
///
/// Both methods may run on worker threads, concurrently for different
/// pairs.
pub trait ContactNotify: Send + Sync {
    /// Filter a new pair when the body boxes first overlap
    fn on_aabb_overlap(&self, _body0: &Body, _body1: &Body) -> bool {
        true
    }

    /// Adjust a fresh manifold (friction, restitution) before solving
    fn on_contact_process(&self, _contact: &mut Contact, _dt: f64) {}
}

/// Notifier that accepts every pair unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContactNotify;

impl ContactNotify for DefaultContactNotify {}
