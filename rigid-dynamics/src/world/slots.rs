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
//! Generational slot storage
//!
//! Removing a value bumps the generation of its slot, so handles issued
//! before the removal stop resolving even after the slot is reused.

#[derive(Debug, Clone)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot map keyed by `(index, generation)`
#[derive(Debug, Clone)]
pub(crate) struct Slots<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Slots<T> {
    pub(crate) fn new() -> Self {
        Slots {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value, returning its index and generation
    pub(crate) fn insert(&mut self, value: T) -> (u32, u32) {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            return (index, entry.generation);
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            value: Some(value),
        });
        (index, 0)
    }

    pub(crate) fn remove(&mut self, index: usize, generation: u32) -> Option<T> {
        let entry = self.entries.get_mut(index)?;
        if entry.generation != generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index as u32);
        self.len -= 1;
        Some(value)
    }

    /// Remove the live value in a slot regardless of generation
    pub(crate) fn remove_at(&mut self, index: usize) -> Option<T> {
        let generation = self.entries.get(index)?.generation;
        self.remove(index, generation)
    }

    pub(crate) fn get(&self, index: usize, generation: u32) -> Option<&T> {
        self.entries
            .get(index)
            .filter(|e| e.generation == generation)
            .and_then(|e| e.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, index: usize, generation: u32) -> Option<&mut T> {
        self.entries
            .get_mut(index)
            .filter(|e| e.generation == generation)
            .and_then(|e| e.value.as_mut())
    }

    /// Value in a slot regardless of generation
    pub(crate) fn at(&self, index: usize) -> Option<&T> {
        self.entries.get(index).and_then(|e| e.value.as_ref())
    }

    pub(crate) fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).and_then(|e| e.value.as_mut())
    }

    /// Number of slots ever allocated, live or free
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.value.as_ref().map(|v| (i, v)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, e)| e.value.as_mut().map(|v| (i, v)))
    }

    /// Live values with their slot, collected for parallel passes
    pub(crate) fn values_mut(&mut self) -> Vec<(usize, &mut T)> {
        self.iter_mut().collect()
    }
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lifecycle() {
        let mut slots = Slots::new();
        let (a, ga) = slots.insert("a");
        let (b, _) = slots.insert("b");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.remove(a as usize, ga), Some("a"));
        assert_eq!(slots.len(), 1);
        assert!(slots.get(a as usize, ga).is_none());
        assert_eq!(slots.at(b as usize), Some(&"b"));
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut slots = Slots::new();
        let (a, ga) = slots.insert(1);
        slots.remove(a as usize, ga);
        let (c, gc) = slots.insert(2);
        assert_eq!(a, c);
        assert_ne!(ga, gc);
        assert!(slots.remove(a as usize, ga).is_none());
        assert_eq!(slots.get(c as usize, gc), Some(&2));
        assert_eq!(slots.capacity(), 1);
    }

    #[test]
    fn test_iteration_skips_free_slots() {
        let mut slots = Slots::new();
        let ids: Vec<_> = (0..4).map(|i| slots.insert(i)).collect();
        slots.remove(ids[1].0 as usize, ids[1].1);
        let live: Vec<usize> = slots.iter().map(|(i, _)| i).collect();
        assert_eq!(live, vec![0, 2, 3]);
        for (_, v) in slots.iter_mut() {
            *v *= 10;
        }
        assert_eq!(slots.values_mut().len(), 3);
        assert_eq!(slots.at(3), Some(&30));
    }
}
