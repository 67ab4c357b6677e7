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
//! Shape instances
//!
//! An instance places a shared [`Shape`] on a body. A point `p` in shape
//! space maps to instance space as `x = S * A * p`, where `S` is the
//! diagonal scale and `A` the alignment rotation, and then to body space
//! through the rigid local matrix.
//!
//! The scale is classified once when it is set:
//!
//! | type          | map            |
//! |---------------|----------------|
//! | `Unit`        | `x = p`        |
//! | `Uniform`     | `x = s p`      |
//! | `NonUniform`  | `x = S p`      |
//! | `Global`      | `x = S A p`    |
//!
//! Queries pick the cheapest closed form for the classification. All four
//! forms describe the same map, so a configuration expressed through two
//! different classifications yields the same answers.

use std::sync::Arc;

use crate::body::BodyId;
use crate::config::UNIFORM_SCALE_TOLERANCE;
use crate::contract;
use crate::geometry::Aabb;
use crate::math::{is_identity, polar_decomposition, DMat3, DQuat, DVec3, Frame};
use crate::shape::{MassProperties, Shape};

/// Scale classification of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleType {
    /// No scaling
    Unit,
    /// Same factor on every axis
    Uniform,
    /// Per-axis factors along the shape axes
    NonUniform,
    /// Per-axis factors along a rotated frame
    Global,
}

/// Surface properties used when building contacts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMaterial {
    /// Coulomb friction coefficient
    pub friction: f64,
    /// Coefficient of restitution in `[0, 1]`
    pub restitution: f64,
    /// Application tag passed through to contacts and ray hits
    pub user_id: u32,
}

impl Default for ShapeMaterial {
    fn default() -> Self {
        ShapeMaterial {
            friction: 0.6,
            restitution: 0.0,
            user_id: 0,
        }
    }
}

/// A placed, scaled reference to a shared shape
#[derive(Debug, Clone)]
pub struct ShapeInstance {
    shape: Arc<Shape>,
    local_matrix: Frame,
    global_matrix: Frame,
    alignment: DMat3,
    scale: DVec3,
    inv_scale: DVec3,
    max_scale: f64,
    scale_type: ScaleType,
    material: ShapeMaterial,
    owner: Option<BodyId>,
    collision_enabled: bool,
}

impl ShapeInstance {
    /// Create a unit-scale instance of a shape
    ///
    /// # Examples
    ///
    /// ```
    /// use rigid_dynamics::shape::{Shape, ShapeInstance, ScaleType};
    ///
    /// let instance = ShapeInstance::new(Shape::sphere(0.5));
    /// assert_eq!(instance.scale_type(), ScaleType::Unit);
    /// ```
    pub fn new(shape: impl Into<Arc<Shape>>) -> Self {
        ShapeInstance {
            shape: shape.into(),
            local_matrix: Frame::IDENTITY,
            global_matrix: Frame::IDENTITY,
            alignment: DMat3::IDENTITY,
            scale: DVec3::ONE,
            inv_scale: DVec3::ONE,
            max_scale: 1.0,
            scale_type: ScaleType::Unit,
            material: ShapeMaterial::default(),
            owner: None,
            collision_enabled: true,
        }
    }

    /// Builder form of [`set_local_matrix`](Self::set_local_matrix)
    pub fn with_local_matrix(mut self, local: Frame) -> Self {
        self.set_local_matrix(local);
        self
    }

    /// Builder form of [`set_scale`](Self::set_scale)
    pub fn with_scale(mut self, scale: DVec3) -> Self {
        self.set_scale(scale);
        self
    }

    /// Builder form of [`set_material`](Self::set_material)
    pub fn with_material(mut self, material: ShapeMaterial) -> Self {
        self.material = material;
        self
    }

    /// The shared shape
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Placement of the instance on its body
    pub fn local_matrix(&self) -> Frame {
        self.local_matrix
    }

    /// Set the placement of the instance on its body
    pub fn set_local_matrix(&mut self, local: Frame) {
        self.local_matrix = local;
    }

    /// Instance-to-world transform cached at the last body update
    pub fn global_matrix(&self) -> Frame {
        self.global_matrix
    }

    pub(crate) fn set_global_matrix(&mut self, global: Frame) {
        self.global_matrix = global;
    }

    /// Per-axis scale
    pub fn scale(&self) -> DVec3 {
        self.scale
    }

    /// Reciprocal of the per-axis scale
    pub fn inv_scale(&self) -> DVec3 {
        self.inv_scale
    }

    /// Largest scale component
    pub fn max_scale(&self) -> f64 {
        self.max_scale
    }

    /// Scale classification
    pub fn scale_type(&self) -> ScaleType {
        self.scale_type
    }

    /// Alignment rotation of a `Global` scale, identity otherwise
    pub fn alignment(&self) -> DMat3 {
        self.alignment
    }

    /// Surface material
    pub fn material(&self) -> ShapeMaterial {
        self.material
    }

    /// Replace the surface material
    pub fn set_material(&mut self, material: ShapeMaterial) {
        self.material = material;
    }

    /// Body this instance is attached to, lookup only
    pub fn owner(&self) -> Option<BodyId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<BodyId>) {
        self.owner = owner;
    }

    /// Whether the instance takes part in contact generation
    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled && !self.shape.is_null()
    }

    /// Enable or disable contact generation
    pub fn set_collision_enabled(&mut self, enabled: bool) {
        self.collision_enabled = enabled;
    }

    /// Set a per-axis scale along the shape axes
    ///
    /// Compound shapes push the scale into their children and keep the
    /// instance at unit scale; the compound is copied first if other
    /// instances share it.
    ///
    /// # Panics
    ///
    /// Debug builds panic if any component is not strictly positive.
    pub fn set_scale(&mut self, scale: DVec3) {
        contract!(
            scale.is_finite() && scale.min_element() > 0.0,
            "Scale components must be positive"
        );
        let scale = scale.abs();

        if self.shape.is_compound() {
            if let Shape::Compound(compound) = Arc::make_mut(&mut self.shape) {
                compound.apply_linear(DMat3::from_diagonal(scale));
            }
            return;
        }

        self.alignment = DMat3::IDENTITY;
        if (scale.x - scale.y).abs() < UNIFORM_SCALE_TOLERANCE
            && (scale.x - scale.z).abs() < UNIFORM_SCALE_TOLERANCE
        {
            if (scale.x - 1.0).abs() < UNIFORM_SCALE_TOLERANCE {
                self.scale_type = ScaleType::Unit;
                self.scale = DVec3::ONE;
            } else {
                self.scale_type = ScaleType::Uniform;
                self.scale = DVec3::splat(scale.x);
            }
        } else {
            self.scale_type = ScaleType::NonUniform;
            self.scale = scale;
        }
        self.inv_scale = self.scale.recip();
        self.max_scale = self.scale.max_element();
    }

    /// Apply a general scale matrix in shape space, before the placement
    ///
    /// The product of the placement rotation and `scale_matrix` is split by
    /// polar decomposition into a new placement rotation, a per-axis scale
    /// and an alignment. An identity alignment classifies as `NonUniform`,
    /// anything else as `Global`.
    pub fn set_global_scale(&mut self, scale_matrix: DMat3) {
        contract!(
            scale_matrix.determinant() > 0.0,
            "Scale matrix must have a positive determinant"
        );
        if self.shape.is_compound() {
            if let Shape::Compound(compound) = Arc::make_mut(&mut self.shape) {
                compound.apply_linear(scale_matrix);
            }
            return;
        }
        let m = self.local_matrix.matrix() * scale_matrix;
        let (local, scale, alignment) = polar_decomposition(m);
        self.assign_decomposition(local, scale, alignment);
    }

    /// Compose a linear map of the parent space onto this instance
    pub(crate) fn apply_parent_linear(&mut self, linear: DMat3) {
        let position = linear * self.local_matrix.position;
        if self.shape.is_compound() {
            if let Shape::Compound(compound) = Arc::make_mut(&mut self.shape) {
                let rotation = self.local_matrix.matrix();
                compound.apply_linear(rotation.transpose() * linear * rotation);
            }
            self.local_matrix.position = position;
            return;
        }
        let m = linear * self.local_matrix.matrix() * self.shape_to_instance();
        let (local, scale, alignment) = polar_decomposition(m);
        self.assign_decomposition(local, scale, alignment);
        self.local_matrix.position = position;
    }

    fn assign_decomposition(&mut self, local: DMat3, scale: DVec3, alignment: DMat3) {
        let uniform = (scale.x - scale.y).abs() < UNIFORM_SCALE_TOLERANCE
            && (scale.x - scale.z).abs() < UNIFORM_SCALE_TOLERANCE;
        if uniform {
            // a uniform scale commutes with the alignment, fold it into the placement
            self.local_matrix.rotation = DQuat::from_mat3(&(local * alignment)).normalize();
            self.set_scale(scale);
            return;
        }
        self.local_matrix.rotation = DQuat::from_mat3(&local).normalize();
        self.scale = scale;
        self.inv_scale = scale.recip();
        self.max_scale = scale.max_element();
        if is_identity(&alignment, 1.0e-6) {
            self.alignment = DMat3::IDENTITY;
            self.scale_type = ScaleType::NonUniform;
        } else {
            self.alignment = alignment;
            self.scale_type = ScaleType::Global;
        }
    }

    /// Linear part of the shape-to-instance map
    pub fn shape_to_instance(&self) -> DMat3 {
        match self.scale_type {
            ScaleType::Unit => DMat3::IDENTITY,
            ScaleType::Uniform => DMat3::from_diagonal(DVec3::splat(self.scale.x)),
            ScaleType::NonUniform => DMat3::from_diagonal(self.scale),
            ScaleType::Global => DMat3::from_diagonal(self.scale) * self.alignment,
        }
    }

    /// Map a shape-space point into instance space
    pub fn to_instance_space(&self, p: DVec3) -> DVec3 {
        match self.scale_type {
            ScaleType::Unit => p,
            ScaleType::Uniform => p * self.scale.x,
            ScaleType::NonUniform => p * self.scale,
            ScaleType::Global => (self.alignment * p) * self.scale,
        }
    }

    /// Map an instance-space point into shape space
    pub fn to_shape_space(&self, x: DVec3) -> DVec3 {
        match self.scale_type {
            ScaleType::Unit => x,
            ScaleType::Uniform => x * self.inv_scale.x,
            ScaleType::NonUniform => x * self.inv_scale,
            ScaleType::Global => self.alignment.transpose() * (x * self.inv_scale),
        }
    }

    /// Farthest instance-space point along an instance-space direction
    pub fn support(&self, dir: DVec3) -> DVec3 {
        match self.scale_type {
            ScaleType::Unit => self.shape.support(dir),
            ScaleType::Uniform => self.shape.support(dir) * self.scale.x,
            ScaleType::NonUniform => self.shape.support(dir * self.scale) * self.scale,
            ScaleType::Global => {
                let d = self.alignment.transpose() * (dir * self.scale);
                (self.alignment * self.shape.support(d)) * self.scale
            }
        }
    }

    /// Sweep radius that survives the scale
    ///
    /// Only unit and uniform scales keep a spherical sweep spherical; other
    /// classifications report no margin and their core is the full shape.
    pub fn margin(&self) -> f64 {
        match self.scale_type {
            ScaleType::Unit => self.shape.margin(),
            ScaleType::Uniform => self.shape.margin() * self.scale.x,
            _ => 0.0,
        }
    }

    /// Core support matching [`margin`](Self::margin)
    pub fn core_support(&self, dir: DVec3) -> DVec3 {
        match self.scale_type {
            ScaleType::Unit => self.shape.core_support(dir),
            ScaleType::Uniform => self.shape.core_support(dir) * self.scale.x,
            _ => self.support(dir),
        }
    }

    /// Ray cast in instance space
    ///
    /// Returns the hit parameter along `p0 -> p1` and the unit normal in
    /// instance space. Rays starting inside the shape report nothing.
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        match self.scale_type {
            ScaleType::Unit => self.shape.ray_cast(p0, p1),
            ScaleType::Uniform => {
                let inv = self.inv_scale.x;
                self.shape.ray_cast(p0 * inv, p1 * inv)
            }
            ScaleType::NonUniform => {
                let (t, n) = self.shape.ray_cast(p0 * self.inv_scale, p1 * self.inv_scale)?;
                Some((t, (n * self.inv_scale).normalize_or_zero()))
            }
            ScaleType::Global => {
                let at = self.alignment.transpose();
                let q0 = at * (p0 * self.inv_scale);
                let q1 = at * (p1 * self.inv_scale);
                let (t, n) = self.shape.ray_cast(q0, q1)?;
                Some((t, ((self.alignment * n) * self.inv_scale).normalize_or_zero()))
            }
        }
    }

    /// Ray cast with the segment given in the parent (body) space
    pub fn ray_cast_in_parent(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let l0 = self.local_matrix.untransform_point(p0);
        let l1 = self.local_matrix.untransform_point(p1);
        let (t, n) = self.ray_cast(l0, l1)?;
        Some((t, self.local_matrix.rotate_vector(n)))
    }

    /// Cross-section with the instance-space plane through `point`
    pub fn calculate_plane_intersection(&self, normal: DVec3, point: DVec3) -> Vec<DVec3> {
        match self.scale_type {
            ScaleType::Unit => self.shape.plane_intersection(normal, point),
            ScaleType::Uniform => {
                let s = self.scale.x;
                let mut points = self.shape.plane_intersection(normal, point * self.inv_scale.x);
                points.iter_mut().for_each(|p| *p *= s);
                points
            }
            ScaleType::NonUniform => {
                let Some(n) = (normal * self.scale).try_normalize() else {
                    return Vec::new();
                };
                let mut points = self.shape.plane_intersection(n, point * self.inv_scale);
                points.iter_mut().for_each(|p| *p *= self.scale);
                points
            }
            ScaleType::Global => {
                let at = self.alignment.transpose();
                let Some(n) = (at * (normal * self.scale)).try_normalize() else {
                    return Vec::new();
                };
                let p = at * (point * self.inv_scale);
                let mut points = self.shape.plane_intersection(n, p);
                points
                    .iter_mut()
                    .for_each(|q| *q = (self.alignment * *q) * self.scale);
                points
            }
        }
    }

    /// Oriented box in instance space as `(center, half_extents)`
    ///
    /// For a `Global` scale the box is the bound of the rotated shape box,
    /// which is conservative.
    pub fn calculate_obb(&self) -> (DVec3, DVec3) {
        let local = self.shape.local_aabb();
        let center = local.center();
        let half = local.half_extents();
        match self.scale_type {
            ScaleType::Unit => (center, half),
            ScaleType::Uniform => (center * self.scale.x, half * self.scale.x),
            ScaleType::NonUniform => (center * self.scale, half * self.scale),
            ScaleType::Global => {
                let a = self.alignment;
                let abs = DMat3::from_cols(a.x_axis.abs(), a.y_axis.abs(), a.z_axis.abs());
                ((a * center) * self.scale, (abs * half) * self.scale)
            }
        }
    }

    /// Bounding box of the instance after the transform `frame`
    ///
    /// `frame` maps instance space to the target space (the global matrix
    /// for a world box). Convex shapes get an exact box from the support
    /// mapping; compounds and meshes bound their oriented box.
    pub fn calculate_aabb(&self, frame: &Frame) -> Aabb {
        if self.shape.is_convex() {
            let mut min = DVec3::ZERO;
            let mut max = DVec3::ZERO;
            for axis in 0..3 {
                let mut e = DVec3::ZERO;
                e[axis] = 1.0;
                let d = frame.unrotate_vector(e);
                max[axis] = frame.transform_point(self.support(d))[axis];
                min[axis] = frame.transform_point(self.support(-d))[axis];
            }
            return Aabb::new(min, max);
        }
        let (center, half) = self.calculate_obb();
        let r = frame.matrix();
        let abs = DMat3::from_cols(r.x_axis.abs(), r.y_axis.abs(), r.z_axis.abs());
        Aabb::from_center_half_extents(frame.transform_point(center), abs * half)
    }

    /// World bounding box at the cached global matrix
    pub fn world_aabb(&self) -> Aabb {
        self.calculate_aabb(&self.global_matrix)
    }

    /// Mass properties in body space
    ///
    /// Null and mesh shapes are massless and return zero properties.
    pub fn calculate_inertia(&self) -> MassProperties {
        let props = self.shape.mass_properties();
        let linear = self.local_matrix.matrix() * self.shape_to_instance();
        props.mapped(linear, self.local_matrix.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_classification() {
        let mut inst = ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0));
        inst.set_scale(DVec3::splat(1.00005));
        assert_eq!(inst.scale_type(), ScaleType::Unit);
        assert_eq!(inst.scale(), DVec3::ONE);

        inst.set_scale(DVec3::splat(2.0));
        assert_eq!(inst.scale_type(), ScaleType::Uniform);
        assert_eq!(inst.max_scale(), 2.0);

        inst.set_scale(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(inst.scale_type(), ScaleType::NonUniform);
        assert_eq!(inst.inv_scale(), DVec3::new(1.0, 0.5, 1.0 / 3.0));
        assert_eq!(inst.max_scale(), 3.0);
    }

    #[test]
    fn test_global_scale_classification() {
        let mut inst = ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0));
        inst.set_global_scale(DMat3::from_diagonal(DVec3::new(2.0, 3.0, 4.0)));
        assert_eq!(inst.scale_type(), ScaleType::NonUniform);

        let r = DMat3::from_quat(DQuat::from_rotation_z(0.5));
        inst.set_global_scale(r * DMat3::from_diagonal(DVec3::new(2.0, 3.0, 4.0)) * r.transpose());
        assert_eq!(inst.scale_type(), ScaleType::Global);

        inst.set_global_scale(DMat3::from_diagonal(DVec3::splat(2.0)));
        assert_eq!(inst.scale_type(), ScaleType::Uniform);
    }

    #[test]
    fn test_space_round_trip_all_types() {
        let r = DMat3::from_quat(DQuat::from_rotation_x(0.3));
        let scales: [Box<dyn Fn(&mut ShapeInstance)>; 4] = [
            Box::new(|_| {}),
            Box::new(|i| i.set_scale(DVec3::splat(3.0))),
            Box::new(|i| i.set_scale(DVec3::new(1.0, 2.0, 0.5))),
            Box::new(move |i| i.set_global_scale(r * DMat3::from_diagonal(DVec3::new(1.0, 2.0, 0.5)) * r.transpose())),
        ];
        let p = DVec3::new(0.2, -0.7, 1.3);
        for apply in scales.iter() {
            let mut inst = ShapeInstance::new(Shape::sphere(1.0));
            apply(&mut inst);
            let back = inst.to_shape_space(inst.to_instance_space(p));
            assert!((back - p).length() < 1e-12);
            let linear = inst.shape_to_instance() * p;
            assert!((linear - inst.to_instance_space(p)).length() < 1e-12);
        }
    }

    #[test]
    fn test_aabb_of_rotated_box_is_exact() {
        let inst = ShapeInstance::new(Shape::cuboid(2.0, 2.0, 2.0));
        let frame = Frame::from_rotation(DQuat::from_rotation_z(std::f64::consts::FRAC_PI_4));
        let aabb = inst.calculate_aabb(&frame);
        let expected = std::f64::consts::SQRT_2;
        assert!((aabb.max.x - expected).abs() < 1e-12);
        assert!((aabb.max.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inertia_uses_local_matrix() {
        let inst = ShapeInstance::new(Shape::sphere(1.0))
            .with_local_matrix(Frame::from_position(DVec3::new(0.0, 2.0, 0.0)));
        let props = inst.calculate_inertia();
        assert_eq!(props.center, DVec3::new(0.0, 2.0, 0.0));
        assert!((props.inertia().x_axis.x - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_nonuniform_volume_scales() {
        let unit = ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0));
        let scaled = unit.clone().with_scale(DVec3::new(2.0, 3.0, 4.0));
        assert!((scaled.calculate_inertia().volume - 24.0 * unit.calculate_inertia().volume).abs() < 1e-12);
    }
}
