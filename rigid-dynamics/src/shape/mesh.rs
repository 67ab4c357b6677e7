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
//! Static triangle meshes
//!
//! Meshes are level geometry. They have no volume, force their body to
//! infinite mass, and collide triangle by triangle.

use crate::geometry::{Aabb, FastRay};
use crate::math::{vertex_list_to_index_list, DVec3};
use crate::shape::StaticTree;

/// Vertices closer than this are welded when a mesh is built
const WELD_TOLERANCE: f64 = 1.0e-6;

/// Immovable triangle mesh
#[derive(Debug, Clone)]
pub struct StaticMesh {
    vertices: Vec<DVec3>,
    triangles: Vec<[usize; 3]>,
    tree: StaticTree,
}

impl StaticMesh {
    /// Build a mesh from indexed triangles
    ///
    /// Coincident vertices are welded and triangles that collapse to a line
    /// or a point are dropped.
    pub fn new(positions: &[DVec3], triangles: &[[usize; 3]]) -> Self {
        let mut flat: Vec<f64> = positions.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        let (count, remap) = vertex_list_to_index_list(&mut flat, 3, 3, WELD_TOLERANCE);
        let vertices: Vec<DVec3> = flat[..count * 3]
            .chunks_exact(3)
            .map(|c| DVec3::new(c[0], c[1], c[2]))
            .collect();

        let triangles: Vec<[usize; 3]> = triangles
            .iter()
            .filter(|t| t.iter().all(|&i| i < remap.len()))
            .map(|t| [remap[t[0]], remap[t[1]], remap[t[2]]])
            .filter(|t| {
                let n = (vertices[t[1]] - vertices[t[0]]).cross(vertices[t[2]] - vertices[t[0]]);
                n.length_squared() > 1.0e-20
            })
            .collect();

        let boxes: Vec<Aabb> = triangles
            .iter()
            .map(|t| Aabb::from_points(&[vertices[t[0]], vertices[t[1]], vertices[t[2]]]))
            .collect();
        let tree = StaticTree::build(&boxes);
        StaticMesh {
            vertices,
            triangles,
            tree,
        }
    }

    /// Build a mesh from unindexed triangles
    pub fn from_triangles(triangles: &[[DVec3; 3]]) -> Self {
        let positions: Vec<DVec3> = triangles.iter().flat_map(|t| t.iter().copied()).collect();
        let indices: Vec<[usize; 3]> = (0..triangles.len()).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect();
        Self::new(&positions, &indices)
    }

    /// Welded vertices
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Triangle index triples
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Corners of one triangle
    pub fn triangle(&self, index: usize) -> [DVec3; 3] {
        let t = self.triangles[index];
        [self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]]
    }

    /// Mesh-space bounds
    pub fn local_aabb(&self) -> Aabb {
        self.tree.bounds()
    }

    /// Visit triangles whose box overlaps a mesh-space box
    pub fn query_aabb(&self, aabb: &Aabb, visit: impl FnMut(usize)) {
        self.tree.query_aabb(aabb, visit);
    }

    /// Closest triangle hit; the normal faces the ray origin
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let ray = FastRay::new(p0, p1);
        let dir = p1 - p0;
        let mut best: Option<(f64, DVec3)> = None;
        self.tree.query_ray(&ray, |index| {
            let [a, b, c] = self.triangle(index);
            if let Some(t) = ray_triangle(p0, dir, a, b, c) {
                if best.map_or(true, |(bt, _)| t < bt) {
                    let mut n = (b - a).cross(c - a).normalize_or_zero();
                    if n.dot(dir) > 0.0 {
                        n = -n;
                    }
                    best = Some((t, n));
                }
            }
            best.map_or(1.0, |(t, _)| t)
        });
        best
    }
}

/// Moller-Trumbore segment test, returns the parameter in `[0, 1]`
fn ray_triangle(origin: DVec3, dir: DVec3, a: DVec3, b: DVec3, c: DVec3) -> Option<f64> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1.0e-14 {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (0.0..=1.0).contains(&t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> StaticMesh {
        let positions = [
            DVec3::new(-1.0, 0.0, -1.0),
            DVec3::new(1.0, 0.0, -1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(-1.0, 0.0, 1.0),
        ];
        StaticMesh::new(&positions, &[[0, 2, 1], [0, 3, 2]])
    }

    #[test]
    fn test_welds_shared_corners() {
        let soup = [
            [DVec3::new(-1.0, 0.0, -1.0), DVec3::new(1.0, 0.0, 1.0), DVec3::new(1.0, 0.0, -1.0)],
            [DVec3::new(-1.0, 0.0, -1.0), DVec3::new(-1.0, 0.0, 1.0), DVec3::new(1.0, 0.0, 1.0)],
        ];
        let mesh = StaticMesh::from_triangles(&soup);
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.triangles().len(), 2);
    }

    #[test]
    fn test_drops_degenerate_triangles() {
        let positions = [DVec3::ZERO, DVec3::X, DVec3::X * 2.0];
        let mesh = StaticMesh::new(&positions, &[[0, 1, 2]]);
        assert!(mesh.triangles().is_empty());
    }

    #[test]
    fn test_ray_cast_from_both_sides() {
        let mesh = quad();
        let (t, n) = mesh.ray_cast(DVec3::new(0.2, 2.0, 0.1), DVec3::new(0.2, -2.0, 0.1)).unwrap();
        assert!((t - 0.5).abs() < 1e-12);
        assert!((n - DVec3::Y).length() < 1e-12);
        let (_, n) = mesh.ray_cast(DVec3::new(0.2, -2.0, 0.1), DVec3::new(0.2, 2.0, 0.1)).unwrap();
        assert!((n + DVec3::Y).length() < 1e-12);
        assert!(mesh.ray_cast(DVec3::new(3.0, 2.0, 0.0), DVec3::new(3.0, -2.0, 0.0)).is_none());
    }
}
