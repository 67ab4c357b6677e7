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
//! Persistent contacts
//!
//! A [`Contact`] lives from the step the two body boxes start overlapping
//! until the step they separate. Its manifold is rebuilt by the narrow
//! phase, but impulses of points that persist are carried over so the
//! solver can warm start.

use std::fmt;

use crate::body::BodyId;
use crate::config::{CONTACT_MERGE_DISTANCE, MAX_CONTACT_POINTS};
use crate::contract;
use crate::math::{orthonormal_basis, DVec3};

/// Order-independent key of a body pair
///
/// Built from the two body tags; `(a, b)` and `(b, a)` give the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactKey {
    low: u32,
    high: u32,
}

impl ContactKey {
    /// Key of the pair of body tags `a` and `b`
    ///
    /// # Panics
    ///
    /// Debug builds panic if both tags are equal.
    pub fn new(a: u32, b: u32) -> Self {
        contract!(a != b, "A body cannot be in contact with itself");
        ContactKey {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// Smaller tag
    pub fn low(&self) -> u32 {
        self.low
    }

    /// Larger tag
    pub fn high(&self) -> u32 {
        self.high
    }

    /// Both tags packed into one integer
    pub fn packed(&self) -> u64 {
        ((self.high as u64) << 32) | self.low as u64
    }
}

impl fmt::Display for ContactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contact({}, {})", self.low, self.high)
    }
}

/// Handle of a contact in the world's contact list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactId(pub(crate) u32);

impl ContactId {
    /// Raw slot index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One point of a contact manifold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World position, midway between the two surfaces
    pub point: DVec3,
    /// Unit normal pointing from body 0 towards body 1
    pub normal: DVec3,
    /// First friction direction
    pub dir0: DVec3,
    /// Second friction direction
    pub dir1: DVec3,
    /// Penetration depth, negative while the surfaces are still apart
    pub penetration: f64,
    /// Accumulated normal impulse
    pub normal_impulse: f64,
    /// Accumulated impulse along `dir0`
    pub friction_impulse0: f64,
    /// Accumulated impulse along `dir1`
    pub friction_impulse1: f64,
    /// Friction coefficient along `dir0`
    pub friction0: f64,
    /// Friction coefficient along `dir1`
    pub friction1: f64,
    /// Restitution used for this point
    pub restitution: f64,
}

impl ContactPoint {
    /// Create a point with fresh tangents and no impulse
    pub fn new(point: DVec3, normal: DVec3, penetration: f64) -> Self {
        let (dir0, dir1) = orthonormal_basis(normal);
        ContactPoint {
            point,
            normal,
            dir0,
            dir1,
            penetration,
            normal_impulse: 0.0,
            friction_impulse0: 0.0,
            friction_impulse1: 0.0,
            friction0: 0.0,
            friction1: 0.0,
            restitution: 0.0,
        }
    }
}

/// Material of a body pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    /// Coulomb friction
    pub friction: f64,
    /// Restitution
    pub restitution: f64,
    /// Tags of the two instance materials
    pub user_ids: (u32, u32),
}

impl ContactMaterial {
    /// Mix two shape materials: geometric mean friction, largest restitution
    pub fn combine(a: &crate::shape::ShapeMaterial, b: &crate::shape::ShapeMaterial) -> Self {
        ContactMaterial {
            friction: (a.friction * b.friction).max(0.0).sqrt(),
            restitution: a.restitution.max(b.restitution),
            user_ids: (a.user_id, b.user_id),
        }
    }
}

/// A persistent pair of potentially touching bodies
#[derive(Debug, Clone)]
pub struct Contact {
    key: ContactKey,
    body0: BodyId,
    body1: BodyId,
    points: Vec<ContactPoint>,
    material: ContactMaterial,
    stale: bool,
    pub(crate) active: bool,
}

impl Contact {
    /// Create an empty contact between two bodies
    pub fn new(key: ContactKey, body0: BodyId, body1: BodyId, material: ContactMaterial) -> Self {
        Contact {
            key,
            body0,
            body1,
            points: Vec::with_capacity(MAX_CONTACT_POINTS),
            material,
            stale: true,
            active: true,
        }
    }

    /// Pair key
    pub fn key(&self) -> ContactKey {
        self.key
    }

    /// First body; normals point away from it
    pub fn body0(&self) -> BodyId {
        self.body0
    }

    /// Second body
    pub fn body1(&self) -> BodyId {
        self.body1
    }

    /// Current manifold
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Mutable manifold, for friction overrides before the solve
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    /// Pair material
    pub fn material(&self) -> ContactMaterial {
        self.material
    }

    /// Whether the contact has any points this step
    pub fn is_touching(&self) -> bool {
        !self.points.is_empty()
    }

    /// Whether the solver should consider the contact
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the contact for this step
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Force the next narrow phase to rebuild the manifold from scratch
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Whether the next manifold update starts without warm-start data
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Replace the manifold, carrying impulses of points that persist
    ///
    /// A new point inherits the impulses of the closest old point within
    /// `match_distance`. Friction directions are kept when the normal barely
    /// changed so the warm-started friction impulse stays meaningful. A
    /// stale contact drops its old manifold first.
    pub fn update_points(&mut self, mut fresh: Vec<ContactPoint>, match_distance: f64) {
        if self.stale {
            self.points.clear();
        }
        let limit2 = match_distance * match_distance;
        for p in fresh.iter_mut() {
            p.friction0 = self.material.friction;
            p.friction1 = self.material.friction;
            p.restitution = self.material.restitution;
            let mut best: Option<(f64, &ContactPoint)> = None;
            for old in &self.points {
                let d2 = (old.point - p.point).length_squared();
                if d2 < limit2 && best.map_or(true, |(bd, _)| d2 < bd) {
                    best = Some((d2, old));
                }
            }
            if let Some((_, old)) = best {
                p.normal_impulse = old.normal_impulse;
                if old.normal.dot(p.normal) > 0.999 {
                    p.dir0 = old.dir0 - p.normal * old.dir0.dot(p.normal);
                    if let Some(d0) = p.dir0.try_normalize() {
                        p.dir0 = d0;
                        p.dir1 = p.normal.cross(d0);
                        p.friction_impulse0 = old.friction_impulse0;
                        p.friction_impulse1 = old.friction_impulse1;
                    } else {
                        let (d0, d1) = orthonormal_basis(p.normal);
                        p.dir0 = d0;
                        p.dir1 = d1;
                    }
                }
            }
        }
        self.points = fresh;
        self.stale = false;
    }

    /// Drop all points, keeping the contact alive
    pub fn clear_points(&mut self) {
        self.points.clear();
    }
}

/// Merge points closer than the merge distance, keeping the deepest
pub fn prune_duplicates(points: &mut Vec<ContactPoint>) {
    let limit2 = CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE;
    let mut i = 0;
    while i < points.len() {
        let mut j = i + 1;
        while j < points.len() {
            if (points[i].point - points[j].point).length_squared() < limit2 {
                if points[j].penetration > points[i].penetration {
                    points.swap(i, j);
                }
                points.swap_remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}

/// Reduce a manifold to at most [`MAX_CONTACT_POINTS`] points
///
/// Keeps the deepest point, then the point farthest from it, then the
/// point that maximizes the triangle area, then the point that adds the
/// most area outside that triangle.
pub fn reduce_manifold(points: &mut Vec<ContactPoint>) {
    if points.len() <= MAX_CONTACT_POINTS {
        return;
    }
    let mut chosen: Vec<usize> = Vec::with_capacity(MAX_CONTACT_POINTS);

    let deepest = (0..points.len())
        .max_by(|&a, &b| {
            points[a]
                .penetration
                .partial_cmp(&points[b].penetration)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    chosen.push(deepest);

    let p0 = points[deepest].point;
    let farthest = pick(points, &chosen, |p| (p - p0).length_squared());
    chosen.push(farthest);

    let p1 = points[farthest].point;
    let normal = points[deepest].normal;
    let third = pick(points, &chosen, |p| (p1 - p0).cross(p - p0).dot(normal).abs());
    chosen.push(third);

    let p2 = points[third].point;
    let fourth = pick(points, &chosen, |p| {
        // area added on the far side of each triangle edge
        let e0 = (p1 - p0).cross(p - p0).dot(normal);
        let e1 = (p2 - p1).cross(p - p1).dot(normal);
        let e2 = (p0 - p2).cross(p - p2).dot(normal);
        let orient = (p1 - p0).cross(p2 - p0).dot(normal).signum();
        (-e0 * orient).max(-e1 * orient).max(-e2 * orient)
    });
    chosen.push(fourth);

    let kept: Vec<ContactPoint> = chosen.iter().map(|&i| points[i]).collect();
    *points = kept;
}

fn pick(points: &[ContactPoint], chosen: &[usize], score: impl Fn(DVec3) -> f64) -> usize {
    let mut best = None;
    let mut best_score = f64::MIN;
    for (i, p) in points.iter().enumerate() {
        if chosen.contains(&i) {
            continue;
        }
        let s = score(p.point);
        if s > best_score {
            best_score = s;
            best = Some(i);
        }
    }
    best.unwrap_or(chosen[0])
}
