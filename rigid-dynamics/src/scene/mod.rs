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
//! Broad phase
//!
//! The [`Scene`] keeps one tree proxy per body, keyed by the body slot.
//! Each step the proxies of moving bodies are refreshed with their boxes
//! swept over the step, and every moving body queries the tree for
//! candidate partners. Scene queries (rays and boxes) go through the same
//! tree.

mod bvh;

pub use bvh::DynamicTree;

use crate::body::Body;
use crate::geometry::{Aabb, FastRay, RayHit};
use crate::parallel::WorkerPool;

/// Receives ray cast candidates and hits
pub trait RayCastNotify {
    /// Filter a body before its shape is tested
    fn on_precast(&mut self, _body: &Body) -> bool {
        true
    }

    /// Report a hit; the return value becomes the new maximum parameter
    ///
    /// Returning `hit.param` keeps only closer hits coming, returning `1.0`
    /// keeps the full segment.
    fn on_ray_cast_action(&mut self, hit: &RayHit) -> f64;
}

/// Keeps the closest hit
#[derive(Debug, Clone, Default)]
pub struct ClosestHit {
    /// Closest hit so far
    pub hit: Option<RayHit>,
}

impl RayCastNotify for ClosestHit {
    fn on_ray_cast_action(&mut self, hit: &RayHit) -> f64 {
        if self.hit.map_or(true, |h| hit.param < h.param) {
            self.hit = Some(*hit);
        }
        hit.param
    }
}

/// Collects every hit along the segment
#[derive(Debug, Clone, Default)]
pub struct AllHits {
    /// Hits in the order they were found
    pub hits: Vec<RayHit>,
}

impl RayCastNotify for AllHits {
    fn on_ray_cast_action(&mut self, hit: &RayHit) -> f64 {
        self.hits.push(*hit);
        1.0
    }
}

/// Bounding volume hierarchy over the bodies of a world
#[derive(Debug, Clone)]
pub struct Scene {
    tree: DynamicTree,
    nodes: Vec<Option<usize>>,
}

impl Scene {
    /// Create an empty scene with the given proxy margin
    pub fn new(margin: f64) -> Self {
        Scene {
            tree: DynamicTree::new(margin),
            nodes: Vec::new(),
        }
    }

    /// Underlying tree
    pub fn tree(&self) -> &DynamicTree {
        &self.tree
    }

    /// Number of proxies
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check whether the scene has no proxies
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Give a body a proxy
    pub fn add_body(&mut self, body: &mut Body, slot: usize) {
        if body.scene_node.is_none() {
            let node = self.tree.insert(body.aabb(), slot);
            if self.nodes.len() <= slot {
                self.nodes.resize(slot + 1, None);
            }
            self.nodes[slot] = Some(node);
            body.scene_node = Some(node);
        }
    }

    /// Drop the proxy of a body
    pub fn remove_body(&mut self, body: &mut Body) {
        if let Some(node) = body.scene_node.take() {
            let slot = self.tree.item(node);
            if let Some(entry) = self.nodes.get_mut(slot) {
                *entry = None;
            }
            self.tree.remove(node);
        }
    }

    /// Refresh the proxy of a moving body with its box swept over `dt`
    pub fn update_body(&mut self, body: &Body, dt: f64) -> bool {
        match body.scene_node {
            Some(node) => self.tree.update(node, body.swept_aabb(dt)),
            None => false,
        }
    }

    /// Candidate pairs of body slots
    ///
    /// Every slot in `active` queries the tree with its proxy box. A pair of
    /// two active slots is reported once. `accept` filters candidates
    /// before they are collected. Output pairs are `(low, high)`, sorted
    /// and unique.
    pub fn find_pairs<F>(&self, pool: &WorkerPool, active: &[usize], is_active: &[bool], accept: F) -> Vec<(usize, usize)>
    where
        F: Fn(usize, usize) -> bool + Sync + Send,
    {
        let tree = &self.tree;
        let found: Vec<Vec<(usize, usize)>> = pool.map(active, |&slot| {
            let mut local = Vec::new();
            let Some(node) = self.node_of(slot) else {
                return local;
            };
            tree.query_aabb(&tree.fat_aabb(node), |other| {
                if other == slot {
                    return;
                }
                let other_active = is_active.get(other).copied().unwrap_or(false);
                if other_active && other < slot {
                    return;
                }
                let pair = (slot.min(other), slot.max(other));
                if accept(pair.0, pair.1) {
                    local.push(pair);
                }
            });
            local
        });
        let mut pairs: Vec<(usize, usize)> = found.into_iter().flatten().collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Proxy node of a body slot
    pub fn node_of(&self, slot: usize) -> Option<usize> {
        self.nodes.get(slot).copied().flatten()
    }

    /// Visit body slots whose proxy overlaps a box
    pub fn query_aabb(&self, aabb: &Aabb, visit: impl FnMut(usize)) {
        self.tree.query_aabb(aabb, visit);
    }

    /// Visit body slots whose proxy the segment crosses
    pub fn query_ray(&self, ray: &FastRay, visit: impl FnMut(usize) -> f64) {
        self.tree.query_ray(ray, visit);
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{DVec3, Frame};
    use crate::shape::{Shape, ShapeInstance};

    fn ball_at(x: f64) -> Body {
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
            .with_matrix(Frame::from_position(DVec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_pairs_reported_once() {
        let mut scene = Scene::new(0.0);
        let mut bodies = vec![ball_at(0.0), ball_at(0.9), ball_at(5.0)];
        for (slot, body) in bodies.iter_mut().enumerate() {
            scene.add_body(body, slot);
        }
        let pool = WorkerPool::sequential();
        let pairs = scene.find_pairs(&pool, &[0, 1, 2], &[true, true, true], |_, _| true);
        assert_eq!(pairs, vec![(0, 1)]);

        let filtered = scene.find_pairs(&pool, &[0, 1, 2], &[true, true, true], |a, b| a + b > 1);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_inactive_partner_found_from_active_side() {
        let mut scene = Scene::new(0.0);
        let mut bodies = vec![ball_at(0.0), ball_at(0.9)];
        for (slot, body) in bodies.iter_mut().enumerate() {
            scene.add_body(body, slot);
        }
        let pool = WorkerPool::sequential();
        let pairs = scene.find_pairs(&pool, &[1], &[false, true], |_, _| true);
        assert_eq!(pairs, vec![(0, 1)]);

        scene.remove_body(&mut bodies[0]);
        assert_eq!(scene.len(), 1);
        assert!(scene.node_of(0).is_none());
        assert!(scene.find_pairs(&pool, &[1], &[false, true], |_, _| true).is_empty());
    }

    #[test]
    fn test_closest_hit_keeps_nearest() {
        let mut notify = ClosestHit::default();
        let far = RayHit::new(0.8, DVec3::ZERO, DVec3::Y);
        let near = RayHit::new(0.3, DVec3::ZERO, DVec3::Y);
        assert_eq!(notify.on_ray_cast_action(&far), 0.8);
        assert_eq!(notify.on_ray_cast_action(&near), 0.3);
        assert_eq!(notify.hit.map(|h| h.param), Some(0.3));
    }
}
