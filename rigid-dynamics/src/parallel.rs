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
//! Fork/join scaffold for the step pipeline
//!
//! A world step runs its stages strictly in order. Inside a stage, work
//! over independent items (body ranges, candidate pairs, islands) is split
//! across a Rayon thread pool when the `parallel` feature is enabled, and
//! runs as a plain loop otherwise. Results always come back in input
//! order, so a step is deterministic regardless of the thread count.

use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use rayon::ThreadPool;

/// Pipeline stage, used to label tracing spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Force accumulation and velocity integration of external forces
    ExternalForces,
    /// Body box refresh and candidate pair search
    BroadPhase,
    /// Contact manifold generation
    NarrowPhase,
    /// Island building and constraint solving
    Solve,
    /// Position integration and sleep evaluation
    Integrate,
}

impl Stage {
    /// Stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::ExternalForces,
        Stage::BroadPhase,
        Stage::NarrowPhase,
        Stage::Solve,
        Stage::Integrate,
    ];

    /// Short name
    pub fn name(&self) -> &'static str {
        match self {
            Stage::ExternalForces => "external_forces",
            Stage::BroadPhase => "broad_phase",
            Stage::NarrowPhase => "narrow_phase",
            Stage::Solve => "solve",
            Stage::Integrate => "integrate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a pool runs its work
enum Executor {
    /// Plain loops on the caller thread
    Caller,
    /// Rayon's global pool
    #[cfg(feature = "parallel")]
    Global,
    /// A pool owned by this executor
    #[cfg(feature = "parallel")]
    Dedicated(ThreadPool),
}

/// Data-parallel executor
///
/// # Examples
///
/// ```
/// use rigid_dynamics::parallel::WorkerPool;
///
/// let pool = WorkerPool::new(2);
/// let squares = pool.map(&[1, 2, 3], |x| x * x);
/// assert_eq!(squares, vec![1, 4, 9]);
/// ```
pub struct WorkerPool {
    executor: Executor,
}

impl WorkerPool {
    /// Create a pool with `threads` workers
    ///
    /// `0` shares the global Rayon pool and `1` runs every call on the
    /// caller thread. Without the `parallel` feature every call runs on
    /// the caller thread.
    pub fn new(threads: usize) -> Self {
        #[cfg(feature = "parallel")]
        {
            let executor = match threads {
                0 => Executor::Global,
                1 => Executor::Caller,
                _ => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                    Ok(pool) => Executor::Dedicated(pool),
                    Err(err) => {
                        tracing::warn!(%err, threads, "Falling back to the global thread pool");
                        Executor::Global
                    }
                },
            };
            WorkerPool { executor }
        }
        #[cfg(not(feature = "parallel"))]
        {
            let _ = threads;
            Self::sequential()
        }
    }

    /// A pool that always runs on the caller thread
    pub fn sequential() -> Self {
        WorkerPool {
            executor: Executor::Caller,
        }
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        match &self.executor {
            Executor::Caller => 1,
            #[cfg(feature = "parallel")]
            Executor::Global => rayon::current_num_threads(),
            #[cfg(feature = "parallel")]
            Executor::Dedicated(pool) => pool.current_num_threads(),
        }
    }

    /// Check whether work is actually split across threads
    pub fn is_parallel(&self) -> bool {
        self.thread_count() > 1
    }

    /// Run a closure inside the pool
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.executor {
            #[cfg(feature = "parallel")]
            Executor::Dedicated(pool) => pool.install(op),
            _ => op(),
        }
    }

    /// Map every item, keeping input order
    pub fn map<T, R, F>(&self, items: &[T], op: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.executor {
            Executor::Caller => items.iter().map(op).collect(),
            #[cfg(feature = "parallel")]
            Executor::Global => items.par_iter().map(&op).collect(),
            #[cfg(feature = "parallel")]
            Executor::Dedicated(pool) => pool.install(|| items.par_iter().map(&op).collect()),
        }
    }

    /// Map every item mutably, keeping input order
    pub fn map_mut<T, R, F>(&self, items: &mut [T], op: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(&mut T) -> R + Sync + Send,
    {
        match &self.executor {
            Executor::Caller => items.iter_mut().map(op).collect(),
            #[cfg(feature = "parallel")]
            Executor::Global => items.par_iter_mut().map(&op).collect(),
            #[cfg(feature = "parallel")]
            Executor::Dedicated(pool) => pool.install(|| items.par_iter_mut().map(&op).collect()),
        }
    }

    /// Visit every item mutably
    pub fn for_each_mut<T, F>(&self, items: &mut [T], op: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        match &self.executor {
            Executor::Caller => items.iter_mut().for_each(op),
            #[cfg(feature = "parallel")]
            Executor::Global => items.par_iter_mut().for_each(&op),
            #[cfg(feature = "parallel")]
            Executor::Dedicated(pool) => pool.install(|| items.par_iter_mut().for_each(&op)),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.thread_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert_eq!(Stage::NarrowPhase.to_string(), "narrow_phase");
    }

    #[test]
    fn test_map_keeps_order() {
        let pool = WorkerPool::new(4);
        let items: Vec<usize> = (0..1000).collect();
        let out = pool.map(&items, |&i| i * 2);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
    }

    #[test]
    fn test_for_each_mut() {
        let pool = WorkerPool::sequential();
        let mut items = vec![1.0f64; 64];
        pool.for_each_mut(&mut items, |x| *x *= 3.0);
        assert!(items.iter().all(|&x| x == 3.0));
        let sums = pool.map_mut(&mut items, |x| {
            *x += 1.0;
            *x
        });
        assert_eq!(sums[0], 4.0);
    }

    #[test]
    fn test_sequential_stays_on_caller_thread() {
        let caller = std::thread::current().id();
        for pool in [WorkerPool::sequential(), WorkerPool::new(1)] {
            assert_eq!(pool.thread_count(), 1);
            assert!(!pool.is_parallel());
            let items: Vec<usize> = (0..10_000).collect();
            let threads = pool.map(&items, |_| std::thread::current().id());
            assert!(threads.iter().all(|&id| id == caller));

            let mut cells = vec![None; 256];
            pool.for_each_mut(&mut cells, |cell| *cell = Some(std::thread::current().id()));
            assert!(cells.iter().all(|&id| id == Some(caller)));
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_dedicated_pool_size() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.thread_count(), 3);
        assert!(pool.is_parallel());
        assert_eq!(pool.install(rayon::current_num_threads), 3);
    }
}
