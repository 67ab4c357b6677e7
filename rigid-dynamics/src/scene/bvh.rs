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
//! Dynamic bounding volume tree
//!
//! Leaves store a fat box: the body box grown by a margin. As long as the
//! body box stays inside its fat box the leaf is left alone; otherwise it
//! is removed and reinserted. Insertion walks down choosing the child that
//! grows the least in surface area, then refits ancestors on the way up.

use crate::geometry::{Aabb, FastRay};

const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    parent: usize,
    left: usize,
    right: usize,
    /// Body slot for leaves
    item: usize,
    height: u32,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Incrementally updated AABB tree of scene proxies
#[derive(Debug, Clone)]
pub struct DynamicTree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: usize,
    margin: f64,
    leaves: usize,
}

impl DynamicTree {
    /// Create an empty tree whose leaves are grown by `margin`
    pub fn new(margin: f64) -> Self {
        DynamicTree {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NULL_NODE,
            margin,
            leaves: 0,
        }
    }

    /// Insert a proxy for `item`, returning its node
    pub fn insert(&mut self, aabb: Aabb, item: usize) -> usize {
        let node = self.alloc(Node {
            aabb: aabb.padded(self.margin),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            item,
            height: 0,
        });
        self.insert_leaf(node);
        self.leaves += 1;
        node
    }

    /// Remove a proxy
    pub fn remove(&mut self, node: usize) {
        if node >= self.nodes.len() || !self.nodes[node].is_leaf() || self.nodes[node].item == NULL_NODE {
            return;
        }
        self.remove_leaf(node);
        self.release(node);
        self.leaves -= 1;
    }

    /// Move a proxy, returning `true` if it had to be reinserted
    pub fn update(&mut self, node: usize, aabb: Aabb) -> bool {
        if self.nodes[node].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(node);
        self.nodes[node].aabb = aabb.padded(self.margin);
        self.insert_leaf(node);
        true
    }

    /// Fat box of a proxy
    pub fn fat_aabb(&self, node: usize) -> Aabb {
        self.nodes[node].aabb
    }

    /// Item stored in a proxy
    pub fn item(&self, node: usize) -> usize {
        self.nodes[node].item
    }

    /// Number of proxies
    pub fn len(&self) -> usize {
        self.leaves
    }

    /// Check whether the tree has no proxies
    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    /// Height of the root, `0` for a single leaf or an empty tree
    pub fn height(&self) -> u32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Bounds of everything in the tree
    pub fn bounds(&self) -> Aabb {
        if self.root == NULL_NODE {
            Aabb::empty()
        } else {
            self.nodes[self.root].aabb
        }
    }

    /// Visit the items whose fat box overlaps `aabb`
    pub fn query_aabb(&self, aabb: &Aabb, mut visit: impl FnMut(usize)) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                visit(node.item);
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Visit the items whose fat box the segment crosses
    ///
    /// The visitor returns the new maximum parameter; subtrees beyond it
    /// are skipped.
    pub fn query_ray(&self, ray: &FastRay, mut visit: impl FnMut(usize) -> f64) {
        if self.root == NULL_NODE {
            return;
        }
        let mut max_t = 1.0f64;
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            match ray.clip(&node.aabb) {
                Some((t0, _)) if t0 <= max_t => {}
                _ => continue,
            }
            if node.is_leaf() {
                max_t = max_t.min(visit(node.item));
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.parent = NULL_NODE;
        node.left = NULL_NODE;
        node.right = NULL_NODE;
        node.item = NULL_NODE;
        node.height = 0;
        self.free.push(index);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        let leaf_box = self.nodes[leaf].aabb;
        let mut sibling = self.root;
        while !self.nodes[sibling].is_leaf() {
            let node = &self.nodes[sibling];
            let area = node.aabb.surface_area();
            let combined_area = node.aabb.union(&leaf_box).surface_area();
            let cost = 2.0 * combined_area;
            let inherited = 2.0 * (combined_area - area);
            let cost_left = self.descend_cost(node.left, &leaf_box, inherited);
            let cost_right = self.descend_cost(node.right, &leaf_box, inherited);
            if cost < cost_left && cost < cost_right {
                break;
            }
            sibling = if cost_left < cost_right { node.left } else { node.right };
        }

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc(Node {
            aabb: leaf_box.union(&self.nodes[sibling].aabb),
            parent: old_parent,
            left: sibling,
            right: leaf,
            item: NULL_NODE,
            height: self.nodes[sibling].height + 1,
        });
        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].left == sibling {
            self.nodes[old_parent].left = new_parent;
        } else {
            self.nodes[old_parent].right = new_parent;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;
        self.refit(new_parent);
    }

    fn descend_cost(&self, child: usize, leaf_box: &Aabb, inherited: f64) -> f64 {
        let node = &self.nodes[child];
        let combined = node.aabb.union(leaf_box).surface_area();
        if node.is_leaf() {
            combined + inherited
        } else {
            combined - node.aabb.surface_area() + inherited
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }
        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].left == leaf {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.release(parent);
        } else {
            if self.nodes[grand_parent].left == parent {
                self.nodes[grand_parent].left = sibling;
            } else {
                self.nodes[grand_parent].right = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.release(parent);
            self.refit(grand_parent);
        }
        self.nodes[leaf].parent = NULL_NODE;
    }

    fn refit(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            let left = self.nodes[index].left;
            let right = self.nodes[index].right;
            let aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
            let height = 1 + self.nodes[left].height.max(self.nodes[right].height);
            let node = &mut self.nodes[index];
            node.aabb = aabb;
            node.height = height;
            index = node.parent;
        }
    }
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DVec3;

    fn unit_box(x: f64) -> Aabb {
        Aabb::from_center_half_extents(DVec3::new(x, 0.0, 0.0), DVec3::splat(0.5))
    }

    fn collect(tree: &DynamicTree, aabb: &Aabb) -> Vec<usize> {
        let mut items = Vec::new();
        tree.query_aabb(aabb, |i| items.push(i));
        items.sort_unstable();
        items
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = DynamicTree::new(0.1);
        for i in 0..10 {
            tree.insert(unit_box(i as f64 * 3.0), i);
        }
        assert_eq!(tree.len(), 10);
        assert_eq!(collect(&tree, &unit_box(6.0)), vec![2]);
        assert_eq!(collect(&tree, &Aabb::new(DVec3::splat(-1.0), DVec3::new(4.0, 1.0, 1.0))), vec![0, 1]);
        assert!(tree.height() >= 4);
    }

    #[test]
    fn test_update_inside_fat_box_is_free() {
        let mut tree = DynamicTree::new(0.5);
        let node = tree.insert(unit_box(0.0), 7);
        assert!(!tree.update(node, unit_box(0.2)));
        assert!(tree.update(node, unit_box(2.0)));
        assert_eq!(collect(&tree, &unit_box(2.0)), vec![7]);
        assert!(collect(&tree, &unit_box(-2.0)).is_empty());
    }

    #[test]
    fn test_remove_recycles_nodes() {
        let mut tree = DynamicTree::new(0.0);
        let nodes: Vec<usize> = (0..5).map(|i| tree.insert(unit_box(i as f64 * 2.0), i)).collect();
        tree.remove(nodes[2]);
        tree.remove(nodes[0]);
        assert_eq!(tree.len(), 3);
        assert_eq!(collect(&tree, &Aabb::new(DVec3::splat(-10.0), DVec3::splat(10.0))), vec![1, 3, 4]);
        tree.insert(unit_box(4.0), 9);
        assert_eq!(collect(&tree, &unit_box(4.0)), vec![9]);
    }

    #[test]
    fn test_ray_query_prunes() {
        let mut tree = DynamicTree::new(0.0);
        for i in 0..8 {
            tree.insert(unit_box(i as f64 * 2.0), i);
        }
        let ray = FastRay::new(DVec3::new(-2.0, 0.0, 0.0), DVec3::new(20.0, 0.0, 0.0));
        let mut visited = Vec::new();
        tree.query_ray(&ray, |i| {
            visited.push(i);
            if i == 0 {
                0.07
            } else {
                1.0
            }
        });
        // every other box starts beyond 0.07 along the ray
        assert_eq!(visited.last(), Some(&0));
    }
}
