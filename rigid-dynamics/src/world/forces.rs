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
//! External force accumulation
//!
//! Before each step the world sums, for every awake dynamic body, the
//! force and torque the application added to the body and whatever the
//! registered [`ForceProvider`]s compute. The sum becomes the body's
//! external load for [`Body::integrate_external_force`].

use tracing::warn;

use crate::body::Body;
use crate::math::DVec3;

/// Largest total force accepted before it is scaled down
pub const DEFAULT_MAX_FORCE: f64 = 1.0e10;

/// Force and torque about the center of mass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Wrench {
    /// Force
    pub force: DVec3,
    /// Torque
    pub torque: DVec3,
}

impl Wrench {
    /// Pure force
    pub fn force(force: DVec3) -> Self {
        Wrench {
            force,
            torque: DVec3::ZERO,
        }
    }

    /// Check both vectors are finite
    pub fn is_valid(&self) -> bool {
        self.force.is_finite() && self.torque.is_finite()
    }
}

/// Computes a load for a body each step
///
/// Gravity, drag, wind or user input are all providers.
pub trait ForceProvider: Send + Sync {
    /// Load on `body`, or `None` if the provider does not apply
    fn compute_force(&self, body: &Body) -> Option<Wrench>;

    /// Descriptive name used in diagnostics
    fn name(&self) -> &str;
}

/// Uniform gravitational field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    acceleration: DVec3,
}

impl Gravity {
    /// Field with the given acceleration
    pub fn new(acceleration: DVec3) -> Self {
        Gravity { acceleration }
    }

    /// Acceleration of the field
    pub fn acceleration(&self) -> DVec3 {
        self.acceleration
    }
}

impl ForceProvider for Gravity {
    fn compute_force(&self, body: &Body) -> Option<Wrench> {
        body.is_dynamic().then(|| Wrench::force(self.acceleration * body.mass()))
    }

    fn name(&self) -> &str {
        "gravity"
    }
}

/// Registered providers
pub struct ForceRegistry {
    providers: Vec<Box<dyn ForceProvider>>,
    /// Total forces above this magnitude are scaled down to it
    pub max_force_magnitude: f64,
}

impl ForceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        ForceRegistry {
            providers: Vec::new(),
            max_force_magnitude: DEFAULT_MAX_FORCE,
        }
    }

    /// Add a provider
    pub fn register_provider(&mut self, provider: Box<dyn ForceProvider>) {
        self.providers.push(provider);
    }

    /// Remove every provider with the given name, returning how many went
    pub fn remove_provider(&mut self, name: &str) -> usize {
        let before = self.providers.len();
        self.providers.retain(|p| p.name() != name);
        before - self.providers.len()
    }

    /// Number of providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Drop every provider
    pub fn clear(&mut self) {
        self.providers.clear();
    }

    /// Sum the application load and every provider into the body's external load
    ///
    /// Non-finite contributions are skipped with a warning. Returns whether
    /// any load was applied.
    pub fn accumulate(&self, body: &mut Body) -> bool {
        let mut total = Wrench {
            force: body.force(),
            torque: body.torque(),
        };
        if !total.is_valid() {
            warn!(body = ?body.id(), "Skipping non-finite application force");
            total = Wrench::default();
        }

        for provider in &self.providers {
            let Some(wrench) = provider.compute_force(body) else {
                continue;
            };
            if !wrench.is_valid() {
                warn!(body = ?body.id(), provider = provider.name(), "Force provider produced a non-finite force");
                continue;
            }
            total.force += wrench.force;
            total.torque += wrench.torque;
        }

        let magnitude = total.force.length();
        if magnitude > self.max_force_magnitude {
            warn!(
                body = ?body.id(),
                magnitude,
                limit = self.max_force_magnitude,
                "Total force exceeds the limit"
            );
            total.force *= self.max_force_magnitude / magnitude;
        }

        body.external_force = total.force;
        body.external_torque = total.torque;
        total != Wrench::default()
    }
}

impl Default for ForceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ForceRegistry")
            .field("providers", &names)
            .field("max_force_magnitude", &self.max_force_magnitude)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Shape, ShapeInstance};

    struct Constant(DVec3);

    impl ForceProvider for Constant {
        fn compute_force(&self, _body: &Body) -> Option<Wrench> {
            Some(Wrench::force(self.0))
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn ball() -> Body {
        Body::new(ShapeInstance::new(Shape::sphere(1.0)), 2.0)
    }

    #[test]
    fn test_gravity_scales_with_mass() {
        let mut registry = ForceRegistry::new();
        registry.register_provider(Box::new(Gravity::new(DVec3::new(0.0, -10.0, 0.0))));
        let mut body = ball();
        assert!(registry.accumulate(&mut body));
        assert_eq!(body.external_force, DVec3::new(0.0, -20.0, 0.0));

        let mut floor = Body::new_static(ShapeInstance::new(Shape::cuboid(1.0, 1.0, 1.0)));
        assert!(!registry.accumulate(&mut floor));
    }

    #[test]
    fn test_invalid_force_skipped() {
        let mut registry = ForceRegistry::new();
        registry.register_provider(Box::new(Constant(DVec3::new(f64::NAN, 0.0, 0.0))));
        registry.register_provider(Box::new(Constant(DVec3::X)));
        let mut body = ball();
        body.add_force(DVec3::Y);
        registry.accumulate(&mut body);
        assert_eq!(body.external_force, DVec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_oversized_force_clamped() {
        let mut registry = ForceRegistry::new();
        registry.max_force_magnitude = 5.0;
        registry.register_provider(Box::new(Constant(DVec3::new(100.0, 0.0, 0.0))));
        let mut body = ball();
        registry.accumulate(&mut body);
        assert!((body.external_force.length() - 5.0).abs() < 1e-12);
        assert_eq!(registry.remove_provider("constant"), 1);
        assert_eq!(registry.provider_count(), 0);
    }
}
