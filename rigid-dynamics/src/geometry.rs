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
//! Bounding boxes and rays
//!
//! Shared by the shape code, the broad-phase tree and scene queries.

use crate::body::BodyId;
use crate::math::DVec3;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl Aabb {
    /// Create a box from its corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Aabb { min, max }
    }

    /// Create a box from a center and half extents
    pub fn from_center_half_extents(center: DVec3, half: DVec3) -> Self {
        Aabb {
            min: center - half,
            max: center + half,
        }
    }

    /// An inverted box that any union replaces
    pub fn empty() -> Self {
        Aabb {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(-f64::MAX),
        }
    }

    /// Smallest box enclosing a set of points
    pub fn from_points(points: &[DVec3]) -> Self {
        points.iter().fold(Aabb::empty(), |acc, &p| acc.include(p))
    }

    /// Check whether the box encloses nothing
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Box grown to include a point
    pub fn include(&self, p: DVec3) -> Aabb {
        Aabb {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    /// Union of two boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box grown by `amount` on every side
    pub fn padded(&self, amount: f64) -> Aabb {
        Aabb {
            min: self.min - DVec3::splat(amount),
            max: self.max + DVec3::splat(amount),
        }
    }

    /// Box swept along a displacement
    pub fn swept(&self, displacement: DVec3) -> Aabb {
        Aabb {
            min: self.min + displacement.min(DVec3::ZERO),
            max: self.max + displacement.max(DVec3::ZERO),
        }
    }

    /// Test for overlap, touching boxes overlap
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check whether `other` lies completely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Check whether a point lies inside the box
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    /// Box center
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Surface area, the cost metric of the tree builders
    pub fn surface_area(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }
}

/// Segment `p0 -> p1` with precomputed reciprocals for slab tests
#[derive(Debug, Clone, Copy)]
pub struct FastRay {
    /// Start point
    pub p0: DVec3,
    /// End point
    pub p1: DVec3,
    /// `p1 - p0`
    pub diff: DVec3,
    inv_diff: DVec3,
    parallel: [bool; 3],
}

impl FastRay {
    /// Build a ray between two points
    pub fn new(p0: DVec3, p1: DVec3) -> Self {
        let diff = p1 - p0;
        let mut inv_diff = DVec3::ZERO;
        let mut parallel = [false; 3];
        for axis in 0..3 {
            if diff[axis].abs() < 1.0e-12 {
                parallel[axis] = true;
            } else {
                inv_diff[axis] = 1.0 / diff[axis];
            }
        }
        FastRay {
            p0,
            p1,
            diff,
            inv_diff,
            parallel,
        }
    }

    /// Point at parameter `t`
    pub fn point_at(&self, t: f64) -> DVec3 {
        self.p0 + self.diff * t
    }

    /// Clip the segment against a box
    ///
    /// Returns the entry and exit parameters in `[0, 1]`, or `None` when the
    /// segment misses.
    pub fn clip(&self, aabb: &Aabb) -> Option<(f64, f64)> {
        let mut t_min = 0.0f64;
        let mut t_max = 1.0f64;
        for axis in 0..3 {
            if self.parallel[axis] {
                if self.p0[axis] < aabb.min[axis] || self.p0[axis] > aabb.max[axis] {
                    return None;
                }
                continue;
            }
            let mut t0 = (aabb.min[axis] - self.p0[axis]) * self.inv_diff[axis];
            let mut t1 = (aabb.max[axis] - self.p0[axis]) * self.inv_diff[axis];
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }
}

/// Result of a ray cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Hit parameter along the segment, `0` at the start and `1` at the end
    pub param: f64,
    /// Hit point in the space the ray was expressed in
    pub point: DVec3,
    /// Unit surface normal at the hit point
    pub normal: DVec3,
    /// Body that was hit, when the cast went through the scene
    pub body: Option<BodyId>,
    /// Material id of the instance that was hit
    pub material_id: u32,
}

impl RayHit {
    /// Create a hit without body information
    pub fn new(param: f64, point: DVec3, normal: DVec3) -> Self {
        RayHit {
            param,
            point,
            normal,
            body: None,
            material_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap_and_union() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::new(DVec3::splat(0.5), DVec3::splat(2.0));
        let c = Aabb::new(DVec3::splat(3.0), DVec3::splat(4.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        let u = a.union(&c);
        assert!(u.contains(&a) && u.contains(&c));
        assert!(Aabb::empty().is_empty());
        assert_eq!(Aabb::empty().union(&a), a);
    }

    #[test]
    fn test_swept_box() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let s = a.swept(DVec3::new(0.0, -2.0, 1.0));
        assert_eq!(s.min, DVec3::new(0.0, -2.0, 0.0));
        assert_eq!(s.max, DVec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn test_ray_clip() {
        let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        let ray = FastRay::new(DVec3::new(-3.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0));
        let (t0, t1) = ray.clip(&aabb).unwrap();
        assert!((t0 - 1.0 / 3.0).abs() < 1e-12);
        assert!((t1 - 2.0 / 3.0).abs() < 1e-12);

        let miss = FastRay::new(DVec3::new(-3.0, 2.0, 0.0), DVec3::new(3.0, 2.0, 0.0));
        assert!(miss.clip(&aabb).is_none());

        let short = FastRay::new(DVec3::new(-3.0, 0.0, 0.0), DVec3::new(-2.0, 0.0, 0.0));
        assert!(short.clip(&aabb).is_none());
    }
}
