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
//! Multi-body models
//!
//! A [`Model`] groups bodies and joints the application assembled into one
//! mechanism (a vehicle, a ragdoll, a robot arm). It owns no physics state:
//! the world keeps the bodies and joints, and counts a reference for every
//! one a registered model names, so they cannot be removed underneath it.
//!
//! # Version Compatibility
//!
//! Models report the model API version they were written against. The
//! major version must match [`MODEL_API_VERSION`]; for `0.x` versions the
//! minor version must match too.

use std::collections::HashMap;

use semver::Version;

use crate::body::BodyId;
use crate::error::{PhysicsError, PhysicsResult};
use crate::joint::JointId;
use crate::world::World;

/// Model API version implemented by this engine
pub const MODEL_API_VERSION: &str = "1.0.0";

/// A composite of bodies and joints updated once per world step
pub trait Model: Send {
    /// Unique name
    fn name(&self) -> &str;

    /// Model API version the model targets
    fn api_version(&self) -> &str {
        MODEL_API_VERSION
    }

    /// Bodies the model references
    fn bodies(&self) -> Vec<BodyId>;

    /// Joints the model references
    fn joints(&self) -> Vec<JointId>;

    /// Called before the physics of each step
    fn update(&mut self, world: &mut World, dt: f64);

    /// Called after the physics of each step
    fn post_update(&mut self, _world: &mut World, _dt: f64) {}
}

/// Check a model API version against the engine's
///
/// - Major version must match
/// - For major version 0, minor versions must match
/// - For major version >= 1, the model's minor version may not be newer
/// - Patch version is ignored
pub fn is_api_compatible(model_version: &str, engine_version: &str) -> bool {
    let (Ok(model), Ok(engine)) = (Version::parse(model_version), Version::parse(engine_version)) else {
        return false;
    };
    if model.major != engine.major {
        return false;
    }
    if model.major != 0 {
        model.minor <= engine.minor
    } else {
        model.minor == engine.minor
    }
}

pub(crate) struct ModelEntry {
    pub(crate) model: Box<dyn Model>,
    bodies: Vec<BodyId>,
    joints: Vec<JointId>,
}

/// Registered models and the references they hold
#[derive(Default)]
pub(crate) struct ModelRegistry {
    pub(crate) entries: Vec<ModelEntry>,
    body_refs: HashMap<BodyId, usize>,
    joint_refs: HashMap<JointId, usize>,
}

impl ModelRegistry {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.model.name() == name)
    }

    /// Validate and register a model whose bodies and joints were checked by the world
    pub(crate) fn insert(&mut self, model: Box<dyn Model>) -> PhysicsResult<()> {
        let name = model.name().to_string();
        if self.contains(&name) {
            return Err(PhysicsError::DuplicateModel(name));
        }
        let version = model.api_version();
        if !is_api_compatible(version, MODEL_API_VERSION) {
            return Err(PhysicsError::IncompatibleModel {
                name,
                found: version.to_string(),
                expected: MODEL_API_VERSION.to_string(),
            });
        }
        let bodies = model.bodies();
        let joints = model.joints();
        for &b in &bodies {
            *self.body_refs.entry(b).or_insert(0) += 1;
        }
        for &j in &joints {
            *self.joint_refs.entry(j).or_insert(0) += 1;
        }
        self.entries.push(ModelEntry { model, bodies, joints });
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> PhysicsResult<Box<dyn Model>> {
        let index = self
            .entries
            .iter()
            .position(|e| e.model.name() == name)
            .ok_or_else(|| PhysicsError::UnknownModel(name.to_string()))?;
        let entry = self.entries.remove(index);
        for b in &entry.bodies {
            release(&mut self.body_refs, b);
        }
        for j in &entry.joints {
            release(&mut self.joint_refs, j);
        }
        Ok(entry.model)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn Model> {
        self.entries
            .iter()
            .find(|e| e.model.name() == name)
            .map(|e| e.model.as_ref())
    }

    pub(crate) fn body_refs(&self, id: BodyId) -> usize {
        self.body_refs.get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn joint_refs(&self, id: JointId) -> usize {
        self.joint_refs.get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn release<K: std::hash::Hash + Eq>(refs: &mut HashMap<K, usize>, key: &K) {
    if let Some(count) = refs.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            refs.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        version: &'static str,
        bodies: Vec<BodyId>,
    }

    impl Model for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn api_version(&self) -> &str {
            self.version
        }

        fn bodies(&self) -> Vec<BodyId> {
            self.bodies.clone()
        }

        fn joints(&self) -> Vec<JointId> {
            Vec::new()
        }

        fn update(&mut self, _world: &mut World, _dt: f64) {}
    }

    fn named(name: &'static str, version: &'static str) -> Box<dyn Model> {
        Box::new(Named {
            name,
            version,
            bodies: vec![BodyId::new(0, 0)],
        })
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_api_compatible("1.0.0", "1.0.0"));
        assert!(is_api_compatible("1.0.5", "1.2.0"));
        assert!(!is_api_compatible("1.3.0", "1.2.0"));
        assert!(!is_api_compatible("2.0.0", "1.0.0"));
        assert!(!is_api_compatible("0.2.0", "0.1.0"));
        assert!(is_api_compatible("0.1.3", "0.1.0"));
        assert!(!is_api_compatible("not a version", "1.0.0"));
    }

    #[test]
    fn test_reference_counting() {
        let mut registry = ModelRegistry::default();
        registry.insert(named("a", "1.0.0")).unwrap();
        registry.insert(named("b", "1.0.0")).unwrap();
        assert_eq!(registry.body_refs(BodyId::new(0, 0)), 2);
        registry.remove("a").unwrap();
        assert_eq!(registry.body_refs(BodyId::new(0, 0)), 1);
        registry.remove("b").unwrap();
        assert_eq!(registry.body_refs(BodyId::new(0, 0)), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_rejections() {
        let mut registry = ModelRegistry::default();
        registry.insert(named("a", "1.0.0")).unwrap();
        assert_eq!(
            registry.insert(named("a", "1.0.0")),
            Err(PhysicsError::DuplicateModel("a".to_string()))
        );
        assert!(matches!(
            registry.insert(named("c", "2.0.0")),
            Err(PhysicsError::IncompatibleModel { .. })
        ));
        assert!(matches!(registry.remove("zzz"), Err(PhysicsError::UnknownModel(_))));
        assert!(registry.get("a").is_some());
    }
}
