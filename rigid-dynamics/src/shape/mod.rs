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
//! Collision shapes
//!
//! A [`Shape`] is immutable geometry shared between any number of
//! [`ShapeInstance`]s through an `Arc`. The instance adds placement, scale
//! and material; the shape only knows its own local space.
//!
//! The set of shapes is closed and dispatched with `match`:
//!
//! - convex primitives: [`Sphere`], [`BoxShape`], [`Capsule`], [`ConvexHull`]
//! - [`Compound`]: child instances over a static tree
//! - [`StaticMesh`]: welded triangle soup, always immovable
//! - `Null`: a massless placeholder that never collides

mod compound;
mod convex;
mod instance;
mod mesh;
mod tree;

pub use compound::Compound;
pub use convex::{BoxShape, Capsule, ConvexHull, HullFace, Sphere};
pub use instance::{ScaleType, ShapeInstance, ShapeMaterial};
pub use mesh::StaticMesh;
pub use tree::StaticTree;

pub(crate) use convex::{convex_polygon, outer, polytope_plane_intersection};

use crate::geometry::Aabb;
use crate::math::{DMat3, DVec3};

/// Volume distribution of a solid
///
/// `covariance` is the second moment about `center` per unit mass,
/// `E[(x - c)(x - c)^T]`, which maps linearly under any affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    /// Enclosed volume
    pub volume: f64,
    /// Center of volume
    pub center: DVec3,
    /// Unit-mass covariance about the center
    pub covariance: DMat3,
}

impl MassProperties {
    /// Properties of a massless placeholder
    pub fn zero() -> Self {
        MassProperties {
            volume: 0.0,
            center: DVec3::ZERO,
            covariance: DMat3::ZERO,
        }
    }

    /// Check whether the solid has no volume
    pub fn is_zero(&self) -> bool {
        self.volume <= 0.0
    }

    /// Inertia tensor per unit mass about the center
    pub fn inertia(&self) -> DMat3 {
        let c = &self.covariance;
        let trace = c.x_axis.x + c.y_axis.y + c.z_axis.z;
        DMat3::from_diagonal(DVec3::splat(trace)) - *c
    }

    /// Properties after the affine map `x -> linear * x + offset`
    pub fn mapped(&self, linear: DMat3, offset: DVec3) -> Self {
        if self.is_zero() {
            return *self;
        }
        MassProperties {
            volume: self.volume * linear.determinant().abs(),
            center: linear * self.center + offset,
            covariance: linear * self.covariance * linear.transpose(),
        }
    }

    /// Combine solids of equal density
    pub fn combine(parts: impl IntoIterator<Item = MassProperties>) -> Self {
        let parts: Vec<MassProperties> = parts.into_iter().filter(|p| !p.is_zero()).collect();
        let volume: f64 = parts.iter().map(|p| p.volume).sum();
        if volume <= 0.0 {
            return MassProperties::zero();
        }
        let center = parts.iter().map(|p| p.center * p.volume).sum::<DVec3>() / volume;
        let mut covariance = DMat3::ZERO;
        for p in &parts {
            let d = p.center - center;
            covariance += (p.covariance + outer(d, d)) * (p.volume / volume);
        }
        MassProperties {
            volume,
            center,
            covariance,
        }
    }
}

/// Collision geometry
#[derive(Debug, Clone)]
pub enum Shape {
    /// Placeholder with no volume that never collides
    Null,
    /// Sphere
    Sphere(Sphere),
    /// Box
    Box(BoxShape),
    /// Capsule
    Capsule(Capsule),
    /// Convex hull of a point cloud
    ConvexHull(ConvexHull),
    /// Rigid assembly of child instances
    Compound(Compound),
    /// Immovable triangle mesh
    StaticMesh(StaticMesh),
}

impl Shape {
    /// Sphere of radius `radius`
    pub fn sphere(radius: f64) -> Shape {
        Shape::Sphere(Sphere::new(radius))
    }

    /// Box with the given side lengths
    pub fn cuboid(x: f64, y: f64, z: f64) -> Shape {
        Shape::Box(BoxShape::new(x, y, z))
    }

    /// Capsule along Y with the given radius and core length
    pub fn capsule(radius: f64, height: f64) -> Shape {
        Shape::Capsule(Capsule::new(radius, height))
    }

    /// Convex hull of `points`, or `None` if they are degenerate
    pub fn convex_hull(points: &[DVec3]) -> Option<Shape> {
        ConvexHull::new(points).map(Shape::ConvexHull)
    }

    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Null => "null",
            Shape::Sphere(_) => "sphere",
            Shape::Box(_) => "box",
            Shape::Capsule(_) => "capsule",
            Shape::ConvexHull(_) => "convex hull",
            Shape::Compound(_) => "compound",
            Shape::StaticMesh(_) => "static mesh",
        }
    }

    /// Check whether the shape is a single convex solid
    pub fn is_convex(&self) -> bool {
        matches!(
            self,
            Shape::Sphere(_) | Shape::Box(_) | Shape::Capsule(_) | Shape::ConvexHull(_)
        )
    }

    /// Check whether the shape is the null placeholder
    pub fn is_null(&self) -> bool {
        matches!(self, Shape::Null)
    }

    /// Check whether the shape is a compound
    pub fn is_compound(&self) -> bool {
        matches!(self, Shape::Compound(_))
    }

    /// Check whether the shape is a static mesh
    pub fn is_static_mesh(&self) -> bool {
        matches!(self, Shape::StaticMesh(_))
    }

    /// Farthest point along `dir`, zero for non-convex shapes
    pub fn support(&self, dir: DVec3) -> DVec3 {
        match self {
            Shape::Sphere(s) => s.support(dir),
            Shape::Box(b) => b.support(dir),
            Shape::Capsule(c) => c.support(dir),
            Shape::ConvexHull(h) => h.support(dir),
            _ => DVec3::ZERO,
        }
    }

    /// Support of the inner core; the full shape is the core swept by
    /// [`margin`](Self::margin)
    pub fn core_support(&self, dir: DVec3) -> DVec3 {
        match self {
            Shape::Sphere(_) => DVec3::ZERO,
            Shape::Capsule(c) => c.core_support(dir),
            _ => self.support(dir),
        }
    }

    /// Sweep radius around the core
    pub fn margin(&self) -> f64 {
        match self {
            Shape::Sphere(s) => s.radius,
            Shape::Capsule(c) => c.radius,
            _ => 0.0,
        }
    }

    /// Bounding box in shape space
    pub fn local_aabb(&self) -> Aabb {
        match self {
            Shape::Null => Aabb::from_center_half_extents(DVec3::ZERO, DVec3::ZERO),
            Shape::Sphere(s) => s.local_aabb(),
            Shape::Box(b) => b.local_aabb(),
            Shape::Capsule(c) => c.local_aabb(),
            Shape::ConvexHull(h) => h.local_aabb(),
            Shape::Compound(c) => c.local_aabb(),
            Shape::StaticMesh(m) => m.local_aabb(),
        }
    }

    /// Ray cast in shape space, returning the hit parameter and normal
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        match self {
            Shape::Null => None,
            Shape::Sphere(s) => s.ray_cast(p0, p1),
            Shape::Box(b) => b.ray_cast(p0, p1),
            Shape::Capsule(c) => c.ray_cast(p0, p1),
            Shape::ConvexHull(h) => h.ray_cast(p0, p1),
            Shape::Compound(c) => c.ray_cast(p0, p1),
            Shape::StaticMesh(m) => m.ray_cast(p0, p1),
        }
    }

    /// Cross-section of a convex shape with the plane through `point`
    ///
    /// Polytopes return their section polygon; round shapes return the
    /// projected centers of the spheres the plane cuts. Non-convex shapes
    /// return nothing.
    pub fn plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        match self {
            Shape::Sphere(s) => s.plane_intersection(normal, point),
            Shape::Box(b) => b.plane_intersection(normal, point),
            Shape::Capsule(c) => c.plane_intersection(normal, point),
            Shape::ConvexHull(h) => h.plane_intersection(normal, point),
            _ => Vec::new(),
        }
    }

    /// Volume, center and covariance; zero for null and mesh shapes
    pub fn mass_properties(&self) -> MassProperties {
        match self {
            Shape::Null | Shape::StaticMesh(_) => MassProperties::zero(),
            Shape::Sphere(s) => s.mass_properties(),
            Shape::Box(b) => b.mass_properties(),
            Shape::Capsule(c) => c.mass_properties(),
            Shape::ConvexHull(h) => h.mass_properties(),
            Shape::Compound(c) => c.mass_properties(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inertia_of_box() {
        let props = Shape::cuboid(2.0, 4.0, 6.0).mass_properties();
        let inertia = props.inertia();
        // (y^2 + z^2) / 12 with full side lengths
        assert!((inertia.x_axis.x - (16.0 + 36.0) / 12.0).abs() < 1e-12);
        assert!((inertia.y_axis.y - (4.0 + 36.0) / 12.0).abs() < 1e-12);
        assert!((inertia.z_axis.z - (4.0 + 16.0) / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_combine_two_spheres() {
        let s = Shape::sphere(1.0).mass_properties();
        let a = s.mapped(DMat3::IDENTITY, DVec3::new(-2.0, 0.0, 0.0));
        let b = s.mapped(DMat3::IDENTITY, DVec3::new(2.0, 0.0, 0.0));
        let both = MassProperties::combine([a, b]);
        assert!((both.volume - 2.0 * s.volume).abs() < 1e-12);
        assert!(both.center.length() < 1e-12);
        // parallel axis adds d^2 = 4 along x
        assert!((both.covariance.x_axis.x - (0.2 + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_null_and_mesh_are_massless() {
        assert!(Shape::Null.mass_properties().is_zero());
        assert_eq!(Shape::Null.mass_properties().inertia(), DMat3::ZERO);
    }

    #[test]
    fn test_core_and_margin() {
        let s = Shape::sphere(0.5);
        assert_eq!(s.core_support(DVec3::X), DVec3::ZERO);
        assert_eq!(s.margin(), 0.5);
        let b = Shape::cuboid(1.0, 1.0, 1.0);
        assert_eq!(b.margin(), 0.0);
        assert_eq!(b.core_support(DVec3::ONE), b.support(DVec3::ONE));
    }
}
