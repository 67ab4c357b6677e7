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
//! Scratch buffer pooling
//!
//! Every island solve builds a row buffer whose length tracks the island.
//! Islands run on worker threads every step, so row buffers are parked on
//! a shared shelf between solves instead of being reallocated.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// Limits on what the shelf keeps between solves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Capacity reserved for a buffer created on a miss
    pub initial_capacity: usize,
    /// Idle buffers parked at most; the rest are freed on return
    pub max_idle: usize,
    /// Buffers that grew past this capacity are freed on return
    pub max_retained_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_capacity: 64,
            max_idle: 16,
            max_retained_capacity: 1 << 16,
        }
    }
}

/// Counters describing how well buffers are recycled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions served by a parked buffer
    pub hits: usize,
    /// Acquisitions that allocated
    pub misses: usize,
    /// Returned buffers freed instead of parked
    pub discarded: usize,
    /// Buffers parked right now
    pub idle: usize,
    /// Most buffers ever parked at once
    pub peak_idle: usize,
}

impl PoolStats {
    /// Fraction of acquisitions served without allocating, in `[0, 1]`
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[derive(Debug)]
struct Shelf<T> {
    idle: Vec<Vec<T>>,
    stats: PoolStats,
}

/// A shared shelf of `Vec` buffers
///
/// Clones share the same shelf.
///
/// # Examples
///
/// ```
/// use rigid_dynamics::pool::VecPool;
///
/// let pool: VecPool<f64> = VecPool::new();
/// pool.acquire().push(1.0);
/// let rows = pool.acquire();
/// assert!(rows.is_empty());
/// assert_eq!(pool.stats().hits, 1);
/// ```
pub struct VecPool<T> {
    shelf: Arc<Mutex<Shelf<T>>>,
    config: PoolConfig,
}

impl<T> VecPool<T> {
    /// Create a pool with default limits
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom limits
    pub fn with_config(config: PoolConfig) -> Self {
        VecPool {
            shelf: Arc::new(Mutex::new(Shelf {
                idle: Vec::new(),
                stats: PoolStats::default(),
            })),
            config,
        }
    }

    fn shelf(&self) -> MutexGuard<'_, Shelf<T>> {
        // buffers left by a panicking solve are cleared on reuse
        self.shelf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an empty buffer; it goes back on the shelf when dropped
    pub fn acquire(&self) -> ScratchBuffer<'_, T> {
        let parked = {
            let mut shelf = self.shelf();
            let parked = shelf.idle.pop();
            if parked.is_some() {
                shelf.stats.hits += 1;
            } else {
                shelf.stats.misses += 1;
            }
            shelf.stats.idle = shelf.idle.len();
            parked
        };
        let buffer = match parked {
            Some(buffer) => buffer,
            None => {
                trace!(capacity = self.config.initial_capacity, "Allocating scratch buffer");
                Vec::with_capacity(self.config.initial_capacity)
            }
        };
        ScratchBuffer { buffer, pool: self }
    }

    fn park(&self, mut buffer: Vec<T>) {
        let mut shelf = self.shelf();
        if shelf.idle.len() >= self.config.max_idle
            || buffer.capacity() > self.config.max_retained_capacity
        {
            shelf.stats.discarded += 1;
            return;
        }
        buffer.clear();
        shelf.idle.push(buffer);
        let idle = shelf.idle.len();
        shelf.stats.idle = idle;
        shelf.stats.peak_idle = shelf.stats.peak_idle.max(idle);
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PoolStats {
        self.shelf().stats
    }

    /// Free every parked buffer
    pub fn shrink(&self) {
        let mut shelf = self.shelf();
        shelf.idle.clear();
        shelf.stats.idle = 0;
    }

    /// Limits this pool was created with
    pub fn config(&self) -> PoolConfig {
        self.config
    }
}

impl<T> Default for VecPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for VecPool<T> {
    fn clone(&self) -> Self {
        VecPool {
            shelf: Arc::clone(&self.shelf),
            config: self.config,
        }
    }
}

impl<T> fmt::Debug for VecPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A buffer borrowed from a [`VecPool`]
pub struct ScratchBuffer<'a, T> {
    buffer: Vec<T>,
    pool: &'a VecPool<T>,
}

impl<T> Deref for ScratchBuffer<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.buffer
    }
}

impl<T> DerefMut for ScratchBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.buffer
    }
}

impl<T> Drop for ScratchBuffer<'_, T> {
    fn drop(&mut self) {
        self.pool.park(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returned_buffer_is_reused_empty() {
        let pool: VecPool<u32> = VecPool::new();
        pool.acquire().extend([1, 2, 3]);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= 3);
        drop(reused);

        let stats = pool.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.peak_idle, 1);
    }

    #[test]
    fn test_idle_limit_discards_extras() {
        let config = PoolConfig {
            max_idle: 2,
            ..PoolConfig::default()
        };
        let pool: VecPool<u32> = VecPool::with_config(config);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            let _c = pool.acquire();
        }
        let stats = pool.stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.discarded, 1);

        pool.shrink();
        assert_eq!(pool.stats().idle, 0);
    }

    #[test]
    fn test_oversized_buffer_is_freed() {
        let config = PoolConfig {
            initial_capacity: 4,
            max_retained_capacity: 8,
            ..PoolConfig::default()
        };
        let pool: VecPool<u8> = VecPool::with_config(config);
        pool.acquire().extend(0..32);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().discarded, 1);

        pool.acquire().push(1);
        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_clones_share_the_shelf() {
        let pool: VecPool<usize> = VecPool::new();
        let other = pool.clone();
        std::thread::scope(|scope| {
            scope.spawn(|| other.acquire().push(1));
            pool.acquire().push(2);
        });
        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 2);
        assert_eq!(other.stats(), stats);
        assert!(stats.idle >= 1);
    }

    #[test]
    fn test_empty_pool_hit_rate_is_zero() {
        assert_eq!(PoolStats::default().hit_rate(), 0.0);
    }
}
