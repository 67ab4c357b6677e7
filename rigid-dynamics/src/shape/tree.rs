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
//! Static AABB tree over the parts of a compound or mesh
//!
//! Built once, top-down, by splitting at the median along the longest axis
//! of the centroid bounds. Never refit; shapes that change rebuild it.

use crate::geometry::{Aabb, FastRay};

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Leaf(usize),
    Inner(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    aabb: Aabb,
    kind: NodeKind,
}

/// Immutable bounding-volume hierarchy over indexed boxes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StaticTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl StaticTree {
    /// Build a tree over `boxes`; leaf payloads are the box indices
    pub fn build(boxes: &[Aabb]) -> Self {
        let mut tree = StaticTree {
            nodes: Vec::with_capacity(boxes.len() * 2),
            root: None,
        };
        if boxes.is_empty() {
            return tree;
        }
        let mut items: Vec<usize> = (0..boxes.len()).collect();
        let root = tree.build_range(boxes, &mut items);
        tree.root = Some(root);
        tree
    }

    fn build_range(&mut self, boxes: &[Aabb], items: &mut [usize]) -> usize {
        let bounds = items
            .iter()
            .fold(Aabb::empty(), |acc, &i| acc.union(&boxes[i]));
        if items.len() == 1 {
            self.nodes.push(Node {
                aabb: bounds,
                kind: NodeKind::Leaf(items[0]),
            });
            return self.nodes.len() - 1;
        }

        let centers = items
            .iter()
            .fold(Aabb::empty(), |acc, &i| acc.include(boxes[i].center()));
        let extent = centers.max - centers.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        items.sort_by(|&a, &b| {
            boxes[a].center()[axis]
                .partial_cmp(&boxes[b].center()[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = items.len() / 2;
        let (low, high) = items.split_at_mut(mid);
        let left = self.build_range(boxes, low);
        let right = self.build_range(boxes, high);
        self.nodes.push(Node {
            aabb: bounds,
            kind: NodeKind::Inner(left, right),
        });
        self.nodes.len() - 1
    }

    /// Bounds of everything in the tree
    pub fn bounds(&self) -> Aabb {
        self.root.map_or(Aabb::empty(), |r| self.nodes[r].aabb)
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf(_)))
            .count()
    }

    /// Visit every leaf whose box overlaps `aabb`
    pub fn query_aabb(&self, aabb: &Aabb, mut visit: impl FnMut(usize)) {
        let Some(root) = self.root else { return };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(item) => visit(item),
                NodeKind::Inner(l, r) => {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
    }

    /// Visit every leaf whose box the ray crosses
    ///
    /// The visitor returns the new maximum hit parameter, letting closer
    /// hits prune the remaining traversal.
    pub fn query_ray(&self, ray: &FastRay, mut visit: impl FnMut(usize) -> f64) {
        let Some(root) = self.root else { return };
        let mut max_t = 1.0f64;
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            match ray.clip(&node.aabb) {
                Some((t0, _)) if t0 <= max_t => {}
                _ => continue,
            }
            match node.kind {
                NodeKind::Leaf(item) => max_t = max_t.min(visit(item)),
                NodeKind::Inner(l, r) => {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
    }
}
