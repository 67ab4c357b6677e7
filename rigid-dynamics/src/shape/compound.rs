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
//! Compound shapes

use crate::geometry::{Aabb, FastRay};
use crate::math::{DMat3, DVec3};
use crate::shape::{MassProperties, ShapeInstance, StaticTree};

/// A rigid assembly of child instances
///
/// Children are placed by their local matrices in compound space. A static
/// tree over the child boxes accelerates ray casts and overlap queries.
#[derive(Debug, Clone)]
pub struct Compound {
    children: Vec<ShapeInstance>,
    child_boxes: Vec<Aabb>,
    tree: StaticTree,
}

impl Compound {
    /// Create a compound from its children
    pub fn new(children: Vec<ShapeInstance>) -> Self {
        let mut compound = Compound {
            children,
            child_boxes: Vec::new(),
            tree: StaticTree::default(),
        };
        compound.rebuild();
        compound
    }

    fn rebuild(&mut self) {
        self.child_boxes = self
            .children
            .iter()
            .map(|child| child.calculate_aabb(&child.local_matrix()))
            .collect();
        self.tree = StaticTree::build(&self.child_boxes);
    }

    /// Child instances
    pub fn children(&self) -> &[ShapeInstance] {
        &self.children
    }

    /// Compound-space box of one child
    pub fn child_aabb(&self, index: usize) -> Aabb {
        self.child_boxes[index]
    }

    /// Compound-space bounds
    pub fn local_aabb(&self) -> Aabb {
        self.tree.bounds()
    }

    /// Visit children whose box overlaps a compound-space box
    pub fn query_aabb(&self, aabb: &Aabb, visit: impl FnMut(usize)) {
        self.tree.query_aabb(aabb, visit);
    }

    /// Push a linear map of compound space into every child
    pub(crate) fn apply_linear(&mut self, linear: DMat3) {
        for child in &mut self.children {
            child.apply_parent_linear(linear);
        }
        self.rebuild();
    }

    /// Closest hit over all children
    pub fn ray_cast(&self, p0: DVec3, p1: DVec3) -> Option<(f64, DVec3)> {
        let ray = FastRay::new(p0, p1);
        let mut best: Option<(f64, DVec3)> = None;
        self.tree.query_ray(&ray, |index| {
            if let Some((t, n)) = self.children[index].ray_cast_in_parent(p0, p1) {
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, n));
                }
            }
            best.map_or(1.0, |(t, _)| t)
        });
        best
    }

    /// Volume-weighted combination of the children
    pub fn mass_properties(&self) -> MassProperties {
        MassProperties::combine(self.children.iter().map(|c| c.calculate_inertia()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Frame;
    use crate::shape::{ScaleType, Shape};
    use std::sync::Arc;

    fn dumbbell() -> Compound {
        let ball = Arc::new(Shape::sphere(1.0));
        Compound::new(vec![
            ShapeInstance::new(Arc::clone(&ball)).with_local_matrix(Frame::from_position(DVec3::new(-2.0, 0.0, 0.0))),
            ShapeInstance::new(ball).with_local_matrix(Frame::from_position(DVec3::new(2.0, 0.0, 0.0))),
        ])
    }

    #[test]
    fn test_bounds_cover_children() {
        let c = dumbbell();
        let b = c.local_aabb();
        assert!((b.min.x + 3.0).abs() < 1e-12);
        assert!((b.max.x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ray_hits_nearest_child() {
        let c = dumbbell();
        let (t, n) = c.ray_cast(DVec3::new(-10.0, 0.0, 0.0), DVec3::new(10.0, 0.0, 0.0)).unwrap();
        assert!((t - 7.0 / 20.0).abs() < 1e-12);
        assert!((n - DVec3::new(-1.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_apply_linear_scales_children() {
        let mut c = dumbbell();
        c.apply_linear(DMat3::from_diagonal(DVec3::splat(2.0)));
        assert_eq!(c.children()[1].local_matrix().position, DVec3::new(4.0, 0.0, 0.0));
        assert_eq!(c.children()[1].scale_type(), ScaleType::Uniform);
        assert!((c.local_aabb().max.x - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_mass_properties_parallel_axis() {
        let c = dumbbell();
        let props = c.mass_properties();
        assert!(props.center.length() < 1e-12);
        assert!((props.covariance.x_axis.x - (0.2 + 4.0)).abs() < 1e-12);
    }
}
