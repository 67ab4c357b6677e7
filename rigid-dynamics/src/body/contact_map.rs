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
//! Per-body contact map
//!
//! Narrow-phase workers attach and detach contacts of the same body from
//! different pair tests, so the map sits behind a [`SpinLock`]. Critical
//! sections are a single ordered-map operation.

use std::collections::BTreeMap;

use crate::collision::{ContactId, ContactKey};
use crate::sync::SpinLock;

/// Contacts of one body keyed by body pair
#[derive(Debug, Default)]
pub struct ContactMap {
    entries: SpinLock<BTreeMap<ContactKey, ContactId>>,
}

impl ContactMap {
    /// Create an empty map
    pub fn new() -> Self {
        ContactMap {
            entries: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Contact stored under `key`
    pub fn find(&self, key: ContactKey) -> Option<ContactId> {
        self.entries.lock().get(&key).copied()
    }

    /// Store a contact, returning `false` if the key was already present
    pub fn insert(&self, key: ContactKey, id: ContactId) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, id);
        true
    }

    /// Remove the contact stored under `key`
    pub fn remove(&self, key: ContactKey) -> Option<ContactId> {
        self.entries.lock().remove(&key)
    }

    /// Number of attached contacts
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check whether no contact is attached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of the attached contact ids in key order
    pub fn ids(&self) -> Vec<ContactId> {
        self.entries.lock().values().copied().collect()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
    }
}

impl Clone for ContactMap {
    fn clone(&self) -> Self {
        ContactMap {
            entries: SpinLock::new(self.entries.lock().clone()),
        }
    }
}
