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
//! The simulation world
//!
//! [`World`] owns every body, joint, contact and model, the broad-phase
//! scene, the worker pool and the constraint solver. Bodies and joints are
//! referred to through generational handles; removing one invalidates its
//! handle even when the slot is reused.
//!
//! # Example
//!
//! ```
//! use rigid_dynamics::prelude::*;
//!
//! let mut world = World::new(WorldConfig::default());
//! let floor = Body::new_static(ShapeInstance::new(Shape::cuboid(20.0, 1.0, 20.0)))
//!     .with_matrix(Frame::from_position(DVec3::new(0.0, -0.5, 0.0)));
//! world.add_body(floor);
//! let ball = world.add_body(
//!     Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
//!         .with_matrix(Frame::from_position(DVec3::new(0.0, 3.0, 0.0))),
//! );
//! world.advance_time(0.5);
//! assert!(world.body(ball).unwrap().position().y < 3.0);
//! ```

mod forces;
mod slots;
mod step;

pub use forces::{ForceProvider, ForceRegistry, Gravity, Wrench, DEFAULT_MAX_FORCE};

use tracing::debug;

use crate::body::{Body, BodyId};
use crate::collision::{Contact, ContactNotify, DefaultContactNotify};
use crate::config::WorldConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::geometry::{Aabb, FastRay};
use crate::joint::{Joint, JointId, JointKind};
use crate::math::{DVec3, Frame};
use crate::model::{Model, ModelRegistry};
use crate::parallel::WorkerPool;
use crate::scene::{RayCastNotify, Scene};
use crate::solver::{ConstraintSolver, Island, SolveStats};

use slots::Slots;

/// A rigid-body simulation
pub struct World {
    config: WorldConfig,
    bodies: Slots<Body>,
    joints: Slots<Joint>,
    contacts: Slots<Contact>,
    scene: Scene,
    pool: WorkerPool,
    solver: ConstraintSolver,
    forces: ForceRegistry,
    notify: Box<dyn ContactNotify>,
    models: ModelRegistry,
    islands: Vec<Island>,
    last_solve: SolveStats,
    next_tag: u32,
    accumulator: f64,
    time: f64,
    step_count: u64,
}

impl World {
    /// Create an empty world
    ///
    /// A [`Gravity`] provider with the configured acceleration is
    /// registered when the gravity is not zero.
    pub fn new(config: WorldConfig) -> Self {
        let mut forces = ForceRegistry::new();
        if config.gravity != DVec3::ZERO {
            forces.register_provider(Box::new(Gravity::new(config.gravity)));
        }
        World {
            pool: WorkerPool::new(config.thread_count),
            solver: ConstraintSolver::new(config.solver.clone()),
            scene: Scene::new(config.contact_margin),
            bodies: Slots::new(),
            joints: Slots::new(),
            contacts: Slots::new(),
            forces,
            notify: Box::new(DefaultContactNotify),
            models: ModelRegistry::default(),
            islands: Vec::new(),
            last_solve: SolveStats::default(),
            next_tag: 1,
            accumulator: 0.0,
            time: 0.0,
            step_count: 0,
            config,
        }
    }

    /// World settings
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Worker pool used by the parallel passes
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Constraint solver
    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    /// Counters of the last solve
    pub fn last_solve_stats(&self) -> SolveStats {
        self.last_solve
    }

    /// Islands found by the last step
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Steps run so far
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated time
    pub fn time(&self) -> f64 {
        self.time
    }

    // ---- bodies ----

    /// Add a body, returning its handle
    pub fn add_body(&mut self, mut body: Body) -> BodyId {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1).max(1);
        body.tag = tag;
        body.update_collision_matrix();
        let (index, generation) = self.bodies.insert(body);
        let id = BodyId::new(index, generation);
        if let Some(body) = self.bodies.at_mut(index as usize) {
            body.id = Some(id);
            body.shape_mut().set_owner(Some(id));
            self.scene.add_body(body, index as usize);
        }
        debug!(%id, tag, "Added body");
        id
    }

    /// Remove a body and every contact it has
    ///
    /// Fails while joints or models still reference the body.
    pub fn remove_body(&mut self, id: BodyId) -> PhysicsResult<Body> {
        let body = self.bodies.get(id.index(), id.generation()).ok_or_else(|| unknown_body(id))?;
        let count = body.joints().len() + self.models.body_refs(id);
        if count > 0 {
            return Err(PhysicsError::InUse {
                what: format!("body {id}"),
                count,
            });
        }
        let stale: Vec<usize> = self
            .contacts
            .iter()
            .filter(|(_, c)| c.body0() == id || c.body1() == id)
            .map(|(slot, _)| slot)
            .collect();
        for slot in stale {
            self.destroy_contact(slot);
        }
        let mut body = self.bodies.remove(id.index(), id.generation()).ok_or_else(|| unknown_body(id))?;
        self.scene.remove_body(&mut body);
        body.id = None;
        body.shape_mut().set_owner(None);
        debug!(%id, "Removed body");
        Ok(body)
    }

    /// Body behind a handle
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.index(), id.generation())
    }

    /// Mutable body behind a handle
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.index(), id.generation())
    }

    /// Every body with its handle, in slot order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter().filter_map(|(_, b)| b.id.map(|id| (id, b)))
    }

    /// Number of bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Move a body, refreshing its broad-phase proxy and waking it
    pub fn set_body_matrix(&mut self, id: BodyId, matrix: Frame) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(id.index(), id.generation()).ok_or_else(|| unknown_body(id))?;
        body.set_matrix(matrix);
        self.scene.update_body(body, 0.0);
        if body.inv_mass() > 0.0 {
            body.set_sleep_state(false);
        }
        Ok(())
    }

    /// Put a body to sleep or wake it up
    ///
    /// When the body is a dynamic body nearly at rest, the manifolds of its
    /// contacts are invalidated so the next narrow phase rebuilds them.
    /// Returns whether they were invalidated.
    pub fn set_sleep_state(&mut self, id: BodyId, sleep: bool) -> PhysicsResult<bool> {
        let body = self.bodies.get_mut(id.index(), id.generation()).ok_or_else(|| unknown_body(id))?;
        let resting = body.set_sleep_state(sleep);
        if resting {
            let ids: Vec<_> = body.contacts().ids();
            for contact in ids {
                if let Some(c) = self.contacts.at_mut(contact.index()) {
                    c.invalidate();
                }
            }
        }
        Ok(resting)
    }

    // ---- joints ----

    /// Add a joint between bodies already in the world
    pub fn add_joint(&mut self, mut joint: Joint) -> PhysicsResult<JointId> {
        let b0 = joint.body0();
        let b1 = joint.body1();
        if Some(b0) == b1 {
            return Err(PhysicsError::SelfJoint(b0.to_string()));
        }
        self.body(b0).ok_or_else(|| unknown_body(b0))?;
        if let Some(b1) = b1 {
            self.body(b1).ok_or_else(|| unknown_body(b1))?;
        }

        let collide = joint.collision_enabled();
        joint.impulses.clear();
        let (index, generation) = self.joints.insert(joint);
        let id = JointId::new(index, generation);
        if let Some(joint) = self.joints.at_mut(index as usize) {
            joint.id = Some(id);
        }
        for body in [Some(b0), b1].into_iter().flatten() {
            if let Some(body) = self.body_mut(body) {
                body.attach_joint(id);
            }
        }
        if let (false, Some(b1)) = (collide, b1) {
            self.remove_contact_between(b0, b1);
        }
        debug!(%id, body0 = %b0, "Added joint");
        Ok(id)
    }

    /// Add a joint whose frames start out at world pivots
    ///
    /// `pivot0` is the joint frame on body 0 and `pivot1` the frame on
    /// body 1 (or in the world), both in world space. An effector gets a
    /// target equal to its starting pose, so it begins at rest.
    pub fn add_joint_from_pivots(
        &mut self,
        mut kind: JointKind,
        body0: BodyId,
        body1: Option<BodyId>,
        pivot0: Frame,
        pivot1: Frame,
    ) -> PhysicsResult<JointId> {
        let matrix0 = self.body(body0).ok_or_else(|| unknown_body(body0))?.matrix();
        let local0 = matrix0.inverse() * pivot0;
        let local1 = match body1 {
            Some(b1) => self.body(b1).ok_or_else(|| unknown_body(b1))?.matrix().inverse() * pivot1,
            None => pivot1,
        };
        if let JointKind::Ik6DofEffector(effector) = &mut kind {
            effector.set_offset_matrix(pivot1.inverse() * pivot0);
        }
        self.add_joint(Joint::new(kind, body0, body1, local0, local1))
    }

    /// Add a joint whose two frames coincide at a world pivot
    pub fn add_joint_at(
        &mut self,
        kind: JointKind,
        body0: BodyId,
        body1: Option<BodyId>,
        pivot: Frame,
    ) -> PhysicsResult<JointId> {
        self.add_joint_from_pivots(kind, body0, body1, pivot, pivot)
    }

    /// Remove a joint and wake its bodies
    ///
    /// Fails while a model still references the joint.
    pub fn remove_joint(&mut self, id: JointId) -> PhysicsResult<Joint> {
        self.joints.get(id.index(), id.generation()).ok_or_else(|| unknown_joint(id))?;
        let refs = self.models.joint_refs(id);
        if refs > 0 {
            return Err(PhysicsError::InUse {
                what: format!("joint {id}"),
                count: refs,
            });
        }
        let mut joint = self.joints.remove(id.index(), id.generation()).ok_or_else(|| unknown_joint(id))?;
        for body in [Some(joint.body0()), joint.body1()].into_iter().flatten() {
            if let Some(body) = self.body_mut(body) {
                body.detach_joint(id);
            }
        }
        joint.id = None;
        debug!(%id, "Removed joint");
        Ok(joint)
    }

    /// Joint behind a handle
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.index(), id.generation())
    }

    /// Mutable joint behind a handle
    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.joints.get_mut(id.index(), id.generation())
    }

    /// Every joint with its handle
    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().filter_map(|(_, j)| j.id.map(|id| (id, j)))
    }

    /// Number of joints
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ---- models ----

    /// Register a model
    ///
    /// Every body and joint it names must exist; each gains a reference.
    pub fn add_model(&mut self, model: Box<dyn Model>) -> PhysicsResult<()> {
        for b in model.bodies() {
            self.body(b).ok_or_else(|| unknown_body(b))?;
        }
        for j in model.joints() {
            self.joint(j).ok_or_else(|| unknown_joint(j))?;
        }
        let name = model.name().to_string();
        self.models.insert(model)?;
        debug!(model = %name, "Added model");
        Ok(())
    }

    /// Unregister a model, releasing its references
    pub fn remove_model(&mut self, name: &str) -> PhysicsResult<Box<dyn Model>> {
        self.models.remove(name)
    }

    /// Registered model by name
    pub fn model(&self, name: &str) -> Option<&dyn Model> {
        self.models.get(name)
    }

    /// Number of models
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Model references held on a body
    pub fn body_ref_count(&self, id: BodyId) -> usize {
        self.models.body_refs(id)
    }

    // ---- forces and callbacks ----

    /// Add a force provider
    pub fn add_force_provider(&mut self, provider: Box<dyn ForceProvider>) {
        self.forces.register_provider(provider);
    }

    /// Force providers
    pub fn forces(&self) -> &ForceRegistry {
        &self.forces
    }

    /// Mutable force providers
    pub fn forces_mut(&mut self) -> &mut ForceRegistry {
        &mut self.forces
    }

    /// Replace the contact callbacks
    pub fn set_contact_notify(&mut self, notify: Box<dyn ContactNotify>) {
        self.notify = notify;
    }

    // ---- contacts ----

    /// Every live contact
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().map(|(_, c)| c)
    }

    /// Number of live contacts
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Contact between two bodies, looked up from either side
    pub fn contact_between(&self, a: BodyId, b: BodyId) -> Option<&Contact> {
        let body_a = self.body(a)?;
        let body_b = self.body(b)?;
        let id = body_a.find_contact(body_b)?;
        self.contacts.at(id.index())
    }

    fn remove_contact_between(&mut self, a: BodyId, b: BodyId) {
        let found = match (self.body(a), self.body(b)) {
            (Some(ba), Some(bb)) => ba.find_contact(bb),
            _ => None,
        };
        if let Some(id) = found {
            self.destroy_contact(id.index());
        }
    }

    /// Drop a contact, detaching it from both bodies
    fn destroy_contact(&mut self, slot: usize) {
        let Some(contact) = self.contacts.at(slot) else {
            return;
        };
        let key = contact.key();
        let (id0, id1) = (contact.body0(), contact.body1());
        let eq0 = self.body(id0).map_or(true, Body::equilibrium);
        let eq1 = self.body(id1).map_or(true, Body::equilibrium);
        for id in [id0, id1] {
            if let Some(body) = self.body(id) {
                body.detach_contact(key, eq0 && eq1);
            }
        }
        self.contacts.remove_at(slot);
    }

    // ---- queries ----

    /// Cast the segment `p0`-`p1` through the scene
    ///
    /// Every body whose box the segment crosses is offered to
    /// `notify.on_precast`, then tested; hits go to
    /// `notify.on_ray_cast_action`, whose return value truncates the rest
    /// of the search.
    pub fn ray_cast(&self, notify: &mut dyn RayCastNotify, p0: DVec3, p1: DVec3) {
        if (p1 - p0).length_squared() <= 1.0e-12 {
            return;
        }
        let ray = FastRay::new(p0, p1);
        let mut max_param = 1.0f64;
        self.scene.query_ray(&ray, |slot| {
            let Some(body) = self.bodies.at(slot) else {
                return max_param;
            };
            if !notify.on_precast(body) {
                return max_param;
            }
            if let Some(hit) = body.ray_cast(&ray, max_param) {
                if hit.param < max_param {
                    max_param = max_param.min(notify.on_ray_cast_action(&hit));
                }
            }
            max_param
        });
    }

    /// Bodies whose box overlaps `aabb`
    pub fn aabb_query(&self, aabb: &Aabb) -> Vec<BodyId> {
        let mut found = Vec::new();
        self.scene.query_aabb(aabb, |slot| {
            if let Some(body) = self.bodies.at(slot) {
                if body.aabb().overlaps(aabb) {
                    found.extend(body.id());
                }
            }
        });
        found.sort_unstable();
        found
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contacts.len())
            .field("models", &self.models.len())
            .field("step_count", &self.step_count)
            .field("time", &self.time)
            .finish()
    }
}

fn unknown_body(id: BodyId) -> PhysicsError {
    PhysicsError::UnknownBody(id.to_string())
}

fn unknown_joint(id: JointId) -> PhysicsError {
    PhysicsError::UnknownJoint(id.to_string())
}
