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
//! Engine constants and configuration
//!
//! Tunables are grouped into plain structs that are handed to the world at
//! construction time. Nothing in the engine reads mutable process-wide
//! state; the constants below are fixed properties of the algorithms.
//!
//! # Environment Configuration
//!
//! [`WorldConfig::from_env`] starts from the defaults and applies:
//! ```bash
//! export RIGID_DYNAMICS_THREADS=8        # worker threads, 0 = rayon default
//! export RIGID_DYNAMICS_STEP_RATE=120    # fixed sub-steps per second
//! export RIGID_DYNAMICS_MAX_STEPS=4      # catch-up sub-steps per frame
//! ```

use crate::math::{DVec3, DEG_TO_RAD};

/// Bodies lighter than this are treated as immovable
pub const MIN_MASS: f64 = 1.0e-5;

/// Mass assigned to immovable bodies
pub const INFINITE_MASS: f64 = 1.0e15;

/// Padding added around every shape AABB
pub const AABB_PADDING: f64 = 1.0 / 16.0;

/// Two scale components closer than this are considered equal
pub const UNIFORM_SCALE_TOLERANCE: f64 = 1.0e-4;

/// Lower inertia bound as a fraction of the mass
pub const MIN_INERTIA_RATIO: f64 = 1.0e-4;

/// Upper inertia bound as a multiple of the mass
pub const MAX_INERTIA_RATIO: f64 = 1.0e4;

/// Default per-step rotation that triggers an instability warning
pub const MAX_ANGLE_STEP: f64 = 90.0 * DEG_TO_RAD;

/// Default per-step translation that triggers an instability warning
pub const MAX_LINEAR_STEP: f64 = 1.0;

/// Angular displacement per step below which orientation is not updated
pub const MIN_ANGLE_STEP: f64 = 0.0125 * DEG_TO_RAD;

/// Maximum number of points kept in a contact manifold
pub const MAX_CONTACT_POINTS: usize = 4;

/// Contact points closer than this are merged
pub const CONTACT_MERGE_DISTANCE: f64 = 1.0e-3;

/// Largest value a row bound may take
pub const LCP_MAX_VALUE: f64 = 1.0e10;

/// Constraint solver settings
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Projected Gauss-Seidel sweeps per step
    pub velocity_iterations: usize,
    /// Fraction of the penetration error corrected per step
    pub position_bias: f64,
    /// Penetration tolerated without correction
    pub allowed_penetration: f64,
    /// Scale applied to last step's impulses before solving
    pub warm_start_factor: f64,
    /// Regularizer applied to contact rows
    pub contact_regularizer: f64,
    /// Rows with a squared direction length below this are rejected
    pub degenerate_row_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            velocity_iterations: 8,
            position_bias: 0.2,
            allowed_penetration: 0.005,
            warm_start_factor: 1.0,
            contact_regularizer: 1.0e-4,
            degenerate_row_tolerance: 1.0e-12,
        }
    }
}

impl SolverConfig {
    /// Set the number of solver sweeps
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        assert!(iterations > 0, "Solver needs at least one iteration");
        self.velocity_iterations = iterations;
        self
    }

    /// Set the position correction factor
    pub fn with_position_bias(mut self, bias: f64) -> Self {
        assert!((0.0..=1.0).contains(&bias), "Position bias must be in [0, 1]");
        self.position_bias = bias;
        self
    }
}

/// Sleep (equilibrium) settings
#[derive(Debug, Clone, PartialEq)]
pub struct SleepConfig {
    /// Speed below which a body is a sleep candidate (compared squared)
    pub freeze_speed: f64,
    /// Consecutive candidate steps before the body actually sleeps
    pub frames_to_sleep: u32,
    /// Drag applied to candidate bodies while they settle
    pub freezing_drag: f64,
    /// Squared velocities below this snap to zero
    pub velocity_tolerance: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            freeze_speed: 0.05,
            frames_to_sleep: 8,
            freezing_drag: 0.9,
            velocity_tolerance: 1.0e-8,
        }
    }
}

impl SleepConfig {
    /// Squared freeze speed used by the equilibrium test
    pub fn freeze_speed2(&self) -> f64 {
        self.freeze_speed * self.freeze_speed
    }
}

/// World construction parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Fixed sub-steps per second
    pub step_rate: f64,
    /// Sub-steps run per `advance_time` call before backlog is discarded
    pub max_steps: u32,
    /// Default gravity applied by the built-in gravity provider
    pub gravity: DVec3,
    /// Worker threads, `0` lets rayon decide and `1` runs on the caller thread
    pub thread_count: usize,
    /// Separation at which speculative contact points are generated
    pub contact_margin: f64,
    /// Solver settings
    pub solver: SolverConfig,
    /// Sleep settings
    pub sleep: SleepConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            step_rate: 60.0,
            max_steps: 2,
            gravity: DVec3::new(0.0, -10.0, 0.0),
            thread_count: 0,
            contact_margin: 2.0 * AABB_PADDING,
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration overridden by `RIGID_DYNAMICS_*` variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(threads) = read_env::<usize>("RIGID_DYNAMICS_THREADS") {
            config.thread_count = threads;
        }
        if let Some(rate) = read_env::<f64>("RIGID_DYNAMICS_STEP_RATE") {
            if rate.is_finite() && rate > 0.0 {
                config.step_rate = rate;
            } else {
                tracing::warn!(rate, "ignoring non-positive RIGID_DYNAMICS_STEP_RATE");
            }
        }
        if let Some(steps) = read_env::<u32>("RIGID_DYNAMICS_MAX_STEPS") {
            config.max_steps = steps.max(1);
        }
        config
    }

    /// Set the fixed step rate in Hz
    pub fn with_step_rate(mut self, rate: f64) -> Self {
        assert!(rate.is_finite() && rate > 0.0, "Step rate must be positive and finite");
        self.step_rate = rate;
        self
    }

    /// Set the catch-up cap
    pub fn with_max_steps(mut self, steps: u32) -> Self {
        assert!(steps > 0, "At least one sub-step per frame is required");
        self.max_steps = steps;
        self
    }

    /// Set gravity
    pub fn with_gravity(mut self, gravity: DVec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the worker thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    /// Replace the solver settings
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Replace the sleep settings
    pub fn with_sleep(mut self, sleep: SleepConfig) -> Self {
        self.sleep = sleep;
        self
    }

    /// Length of one fixed sub-step in seconds
    pub fn step(&self) -> f64 {
        1.0 / self.step_rate
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.step_rate, 60.0);
        assert!((config.step() - 1.0 / 60.0).abs() < 1e-15);
        assert_eq!(config.solver.velocity_iterations, 8);
        assert!((config.sleep.freeze_speed2() - 0.0025).abs() < 1e-15);
    }

    #[test]
    fn test_builders() {
        let config = WorldConfig::new()
            .with_step_rate(120.0)
            .with_max_steps(4)
            .with_gravity(DVec3::ZERO)
            .with_solver(SolverConfig::default().with_iterations(16));
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.solver.velocity_iterations, 16);
        assert_eq!(config.gravity, DVec3::ZERO);
    }

    #[test]
    #[should_panic(expected = "Step rate must be positive and finite")]
    fn test_rejects_zero_rate() {
        WorldConfig::new().with_step_rate(0.0);
    }
}
