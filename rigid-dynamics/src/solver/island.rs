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
//! Island discovery
//!
//! Movable bodies linked by touching contacts or active joints are merged
//! with a union-find. Immovable bodies never merge islands: a floor under
//! two separate stacks leaves two islands.

/// What links two bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Contact slot index
    Contact(usize),
    /// Joint slot index
    Joint(usize),
}

/// A constraint between body slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// First body slot
    pub body0: usize,
    /// Second body slot, `None` for the world
    pub body1: Option<usize>,
    /// Constraint behind the edge
    pub link: Link,
}

/// A group of bodies solved together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Island {
    /// Movable body slots, ascending
    pub bodies: Vec<usize>,
    /// Contact slots
    pub contacts: Vec<usize>,
    /// Joint slots
    pub joints: Vec<usize>,
}

impl Island {
    /// Check whether the island has anything to solve
    pub fn has_constraints(&self) -> bool {
        !self.contacts.is_empty() || !self.joints.is_empty()
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(count: usize) -> Self {
        UnionFind {
            parent: (0..count).collect(),
            rank: vec![0; count],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
    }
}

/// Split movable bodies into islands
///
/// `movable[i]` tells whether slot `i` holds an awake dynamic body. Edges
/// with no movable side are dropped. Islands come back ordered by their
/// lowest body slot.
pub fn build_islands(movable: &[bool], edges: &[Edge]) -> Vec<Island> {
    let is_movable = |slot: usize| movable.get(slot).copied().unwrap_or(false);
    let mut sets = UnionFind::new(movable.len());
    for edge in edges {
        if let Some(b1) = edge.body1 {
            if is_movable(edge.body0) && is_movable(b1) {
                sets.union(edge.body0, b1);
            }
        }
    }

    let mut island_of = vec![usize::MAX; movable.len()];
    let mut islands: Vec<Island> = Vec::new();
    for slot in (0..movable.len()).filter(|&s| movable[s]) {
        let root = sets.find(slot);
        if island_of[root] == usize::MAX {
            island_of[root] = islands.len();
            islands.push(Island::default());
        }
        islands[island_of[root]].bodies.push(slot);
    }

    for edge in edges {
        let anchor = if is_movable(edge.body0) {
            edge.body0
        } else {
            match edge.body1 {
                Some(b1) if is_movable(b1) => b1,
                _ => continue,
            }
        };
        let island = &mut islands[island_of[sets.find(anchor)]];
        match edge.link {
            Link::Contact(c) => island.contacts.push(c),
            Link::Joint(j) => island.joints.push(j),
        }
    }
    islands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(a: usize, b: usize, c: usize) -> Edge {
        Edge {
            body0: a,
            body1: Some(b),
            link: Link::Contact(c),
        }
    }

    #[test]
    fn test_static_body_does_not_merge() {
        // slot 0 is the floor, 1 and 2 rest on it separately
        let movable = [false, true, true];
        let islands = build_islands(&movable, &[contact(0, 1, 0), contact(2, 0, 1)]);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![1]);
        assert_eq!(islands[0].contacts, vec![0]);
        assert_eq!(islands[1].contacts, vec![1]);
    }

    #[test]
    fn test_chain_merges() {
        let movable = [true, true, true, true];
        let edges = [
            contact(0, 1, 0),
            Edge {
                body0: 2,
                body1: Some(1),
                link: Link::Joint(5),
            },
            Edge {
                body0: 3,
                body1: None,
                link: Link::Joint(6),
            },
        ];
        let islands = build_islands(&movable, &edges);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![0, 1, 2]);
        assert_eq!(islands[0].joints, vec![5]);
        assert_eq!(islands[1].bodies, vec![3]);
        assert_eq!(islands[1].joints, vec![6]);
        assert!(islands[1].has_constraints());
    }

    #[test]
    fn test_edges_between_immovable_bodies_are_dropped() {
        let islands = build_islands(&[false, false, true], &[contact(0, 1, 0)]);
        assert_eq!(islands.len(), 1);
        assert!(!islands[0].has_constraints());
    }
}
