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
//! Step pipeline
//!
//! One fixed step runs, in order: model updates, external forces, broad
//! phase, narrow phase, islands and solve, position integration, sleep
//! evaluation, model post updates. Passes over independent items go
//! through the worker pool; everything that edits shared structure (the
//! tree, the contact list, body joint lists) runs on the caller thread.

use tracing::{debug, debug_span, trace};

use crate::body::Body;
use crate::collision::{collide_bodies, Contact, ContactId, ContactKey, ContactMaterial};
use crate::config::AABB_PADDING;
use crate::parallel::Stage;
use crate::joint::Joint;
use crate::solver::{build_islands, ContactInput, Edge, Island, IslandProblem, JointInput, Link};

use super::{Slots, World};

/// Old points closer than this to a new point hand over their impulses
const CONTACT_MATCH_DISTANCE: f64 = AABB_PADDING;

impl World {
    /// Advance by wall-clock time, running whole fixed steps
    ///
    /// Time accumulates across calls. When more than `max_steps` steps are
    /// pending the excess is discarded, then every whole step held by the
    /// accumulator runs. Returns the number of steps run.
    ///
    /// # Panics
    ///
    /// Panics if `timestep` is negative or not finite.
    pub fn advance_time(&mut self, timestep: f64) -> u32 {
        assert!(
            timestep.is_finite() && timestep >= 0.0,
            "Timestep must be finite and non-negative"
        );
        let step = self.config.step();
        self.accumulator += timestep;

        let pending = (self.accumulator / step).floor();
        let max_steps = f64::from(self.config.max_steps);
        if pending > max_steps {
            let dropped = step * (pending - max_steps);
            self.accumulator -= dropped;
            debug!(dropped, pending, max_steps, "Discarding catch-up time");
        }

        let mut steps = 0;
        while self.accumulator >= step {
            self.update(step);
            self.accumulator -= step;
            steps += 1;
        }
        steps
    }

    /// Run exactly one step of `dt` seconds
    ///
    /// # Panics
    ///
    /// Panics if `dt` is not positive and finite.
    pub fn update(&mut self, dt: f64) {
        assert!(dt.is_finite() && dt > 0.0, "Timestep must be positive and finite");
        let span = debug_span!("step", index = self.step_count);
        let _enter = span.enter();

        self.update_models(dt, false);
        self.integrate_external_forces(dt);
        self.broad_phase(dt);
        self.narrow_phase(dt);
        self.solve(dt);
        self.integrate_velocities(dt);
        self.update_sleep();
        self.update_models(dt, true);

        for (_, body) in self.bodies.iter_mut() {
            body.clear_forces();
        }
        self.step_count += 1;
        self.time += dt;
    }

    fn update_models(&mut self, dt: f64, post: bool) {
        if self.models.entries.is_empty() {
            return;
        }
        let mut entries = std::mem::take(&mut self.models.entries);
        for entry in entries.iter_mut() {
            if post {
                entry.model.post_update(self, dt);
            } else {
                entry.model.update(self, dt);
            }
        }
        // models registered during the callbacks land behind the existing ones
        entries.append(&mut self.models.entries);
        self.models.entries = entries;
    }

    fn integrate_external_forces(&mut self, dt: f64) {
        let _stage = debug_span!("stage", name = %Stage::ExternalForces).entered();
        let forces = &self.forces;
        let mut bodies = self.bodies.values_mut();
        self.pool.for_each_mut(&mut bodies, |(_, body)| {
            if body.is_dynamic() && !body.equilibrium() {
                forces.accumulate(body);
                body.integrate_external_force(dt);
            }
        });
    }

    fn broad_phase(&mut self, dt: f64) {
        let _stage = debug_span!("stage", name = %Stage::BroadPhase).entered();
        let capacity = self.bodies.capacity();
        let mut is_active = vec![false; capacity];
        let mut active = Vec::new();
        for (slot, body) in self.bodies.iter() {
            if !body.equilibrium() {
                self.scene.update_body(body, dt);
                is_active[slot] = true;
                active.push(slot);
            }
        }

        let bodies = &self.bodies;
        let joints = &self.joints;
        let pairs = self.scene.find_pairs(&self.pool, &active, &is_active, |a, b| {
            let (Some(body_a), Some(body_b)) = (bodies.at(a), bodies.at(b)) else {
                return false;
            };
            if !body_a.is_dynamic() && !body_b.is_dynamic() {
                return false;
            }
            if body_a.find_contact(body_b).is_some() {
                return false;
            }
            !shares_rigid_joint(joints, body_a, body_b)
        });

        for (a, b) in pairs {
            self.create_contact(a, b);
        }
        self.remove_separated_contacts(dt);
    }

    fn create_contact(&mut self, a: usize, b: usize) {
        let (Some(body_a), Some(body_b)) = (self.bodies.at(a), self.bodies.at(b)) else {
            return;
        };
        let (Some(id_a), Some(id_b)) = (body_a.id(), body_b.id()) else {
            return;
        };
        if !self.notify.on_aabb_overlap(body_a, body_b) {
            return;
        }
        let key = ContactKey::new(body_a.tag(), body_b.tag());
        let material = ContactMaterial::combine(&body_a.shape().material(), &body_b.shape().material());
        let (index, _) = self.contacts.insert(Contact::new(key, id_a, id_b, material));
        let contact_id = ContactId(index);
        body_a.attach_contact(key, contact_id);
        body_b.attach_contact(key, contact_id);
        trace!(%key, "Created contact");
    }

    fn remove_separated_contacts(&mut self, dt: f64) {
        let separated: Vec<usize> = self
            .contacts
            .iter()
            .filter(|(_, contact)| {
                match (self.body(contact.body0()), self.body(contact.body1())) {
                    (Some(b0), Some(b1)) => {
                        let awake = !b0.equilibrium() || !b1.equilibrium();
                        awake && !b0.swept_aabb(dt).overlaps(&b1.swept_aabb(dt))
                    }
                    _ => true,
                }
            })
            .map(|(slot, _)| slot)
            .collect();
        for slot in separated {
            self.destroy_contact(slot);
        }
    }

    fn narrow_phase(&mut self, dt: f64) {
        let _stage = debug_span!("stage", name = %Stage::NarrowPhase).entered();
        let margin = self.config.contact_margin;
        let bodies = &self.bodies;
        let notify = self.notify.as_ref();
        let mut contacts = self.contacts.values_mut();
        self.pool.for_each_mut(&mut contacts, |(_, contact)| {
            let b0 = bodies.get(contact.body0().index(), contact.body0().generation());
            let b1 = bodies.get(contact.body1().index(), contact.body1().generation());
            let (Some(b0), Some(b1)) = (b0, b1) else {
                return;
            };
            if b0.equilibrium() && b1.equilibrium() {
                return;
            }
            let relative_speed = (b1.velocity() - b0.velocity()).length();
            let max_gap = margin + relative_speed * dt;
            let points = collide_bodies(b0, b1, max_gap);
            contact.update_points(points, CONTACT_MATCH_DISTANCE);
            notify.on_contact_process(contact, dt);
        });
    }

    fn solve(&mut self, dt: f64) {
        let _stage = debug_span!("stage", name = %Stage::Solve).entered();
        self.wake_touched_bodies();

        let capacity = self.bodies.capacity();
        let mut movable = vec![false; capacity];
        for (slot, body) in self.bodies.iter() {
            movable[slot] = body.is_dynamic() && !body.equilibrium();
        }

        let mut edges = Vec::new();
        for (slot, contact) in self.contacts.iter() {
            if contact.is_active() && contact.is_touching() {
                edges.push(Edge {
                    body0: contact.body0().index(),
                    body1: Some(contact.body1().index()),
                    link: Link::Contact(slot),
                });
            }
        }
        for (slot, joint) in self.joints.iter() {
            if joint.is_active() {
                edges.push(Edge {
                    body0: joint.body0().index(),
                    body1: joint.body1().map(|b| b.index()),
                    link: Link::Joint(slot),
                });
            }
        }
        let islands = build_islands(&movable, &edges);

        let mut problems: Vec<IslandProblem> = islands
            .iter()
            .filter(|island| island.has_constraints())
            .map(|island| self.gather_problem(island, &movable))
            .collect();
        self.last_solve = self.solver.solve(&self.pool, &mut problems, dt);
        for problem in problems {
            self.scatter_problem(problem, dt);
        }
        trace!(islands = islands.len(), rows = self.last_solve.rows, "Solved");
        self.islands = islands;
    }

    /// A sleeping body touched or linked by an awake one wakes up
    fn wake_touched_bodies(&mut self) {
        let mut wake = Vec::new();
        let mut consider = |a: Option<&Body>, b: Option<&Body>| {
            if let (Some(a), Some(b)) = (a, b) {
                let awake = |x: &Body| x.is_dynamic() && !x.equilibrium();
                if awake(a) && b.is_dynamic() && b.equilibrium() {
                    wake.extend(b.id());
                } else if awake(b) && a.is_dynamic() && a.equilibrium() {
                    wake.extend(a.id());
                }
            }
        };
        for (_, contact) in self.contacts.iter() {
            if contact.is_touching() {
                consider(self.body(contact.body0()), self.body(contact.body1()));
            }
        }
        for (_, joint) in self.joints.iter() {
            if let Some(b1) = joint.body1() {
                consider(self.body(joint.body0()), self.body(b1));
            }
        }
        for id in wake {
            if let Some(body) = self.body_mut(id) {
                body.set_sleep_state(false);
            }
        }
    }

    fn gather_problem(&self, island: &Island, movable: &[bool]) -> IslandProblem {
        let mut problem = IslandProblem::new();
        let add = |problem: &mut IslandProblem, slot: usize| {
            self.bodies
                .at(slot)
                .map(|body| problem.add_body(slot, body, movable.get(slot).copied().unwrap_or(false)))
        };
        for &slot in &island.contacts {
            let Some(contact) = self.contacts.at(slot) else {
                continue;
            };
            let b0 = add(&mut problem, contact.body0().index());
            let b1 = add(&mut problem, contact.body1().index());
            if let (Some(body0), Some(body1)) = (b0, b1) {
                problem.contacts.push(ContactInput {
                    slot,
                    body0,
                    body1,
                    points: contact.points().to_vec(),
                });
            }
        }
        for &slot in &island.joints {
            let Some(joint) = self.joints.at(slot) else {
                continue;
            };
            let Some(body0) = add(&mut problem, joint.body0().index()) else {
                continue;
            };
            let body1 = match joint.body1() {
                Some(b1) => match add(&mut problem, b1.index()) {
                    Some(local) => Some(local),
                    None => continue,
                },
                None => None,
            };
            problem.joints.push(JointInput {
                slot,
                joint: joint.clone(),
                body0,
                body1,
            });
        }
        problem
    }

    fn scatter_problem(&mut self, problem: IslandProblem, dt: f64) {
        for solved in problem.bodies.iter().filter(|b| b.movable) {
            if let Some(body) = self.bodies.at_mut(solved.slot) {
                body.apply_solver_velocity(solved.veloc, solved.omega, dt);
            }
        }
        for input in problem.contacts {
            if let Some(contact) = self.contacts.at_mut(input.slot) {
                for (point, solved) in contact.points_mut().iter_mut().zip(&input.points) {
                    point.normal_impulse = solved.normal_impulse;
                    point.friction_impulse0 = solved.friction_impulse0;
                    point.friction_impulse1 = solved.friction_impulse1;
                }
            }
        }
        for input in problem.joints {
            if let Some(joint) = self.joints.at_mut(input.slot) {
                joint.impulses = input.joint.impulses;
            }
        }
    }

    fn integrate_velocities(&mut self, dt: f64) {
        let _stage = debug_span!("stage", name = %Stage::Integrate).entered();
        let mut bodies = self.bodies.values_mut();
        self.pool.for_each_mut(&mut bodies, |(_, body)| {
            if !body.equilibrium() {
                body.integrate_velocity(dt);
            }
        });
    }

    fn update_sleep(&mut self) {
        let sleep = self.config.sleep.clone();
        for (_, body) in self.bodies.iter_mut() {
            if !body.equilibrium() {
                body.evaluate_sleep_state(&sleep);
            }
        }
        // jointed groups only sleep together
        for island in &self.islands {
            if island.joints.is_empty() {
                continue;
            }
            let all_resting = island
                .bodies
                .iter()
                .all(|&slot| self.bodies.at(slot).map_or(true, Body::joint_fence));
            if all_resting {
                for &slot in &island.bodies {
                    if let Some(body) = self.bodies.at(slot) {
                        body.set_equilibrium(true);
                    }
                }
            }
        }
    }
}

/// Whether the two bodies share a joint that disables their collision
fn shares_rigid_joint(joints: &Slots<Joint>, a: &Body, b: &Body) -> bool {
    let (Some(id_a), Some(id_b)) = (a.id(), b.id()) else {
        return false;
    };
    a.joints().iter().any(|j| {
        joints
            .get(j.index(), j.generation())
            .map_or(false, |joint| joint.links(id_a, id_b) && !joint.collision_enabled())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyId;
    use crate::config::WorldConfig;
    use crate::math::{DVec3, Frame};
    use crate::shape::{Shape, ShapeInstance};

    fn sequential_world(gravity: DVec3) -> World {
        World::new(WorldConfig {
            gravity,
            thread_count: 1,
            ..WorldConfig::default()
        })
    }

    fn add_floor(world: &mut World) -> BodyId {
        world.add_body(
            Body::new_static(ShapeInstance::new(Shape::cuboid(20.0, 1.0, 20.0)))
                .with_matrix(Frame::from_position(DVec3::new(0.0, -0.5, 0.0))),
        )
    }

    fn add_ball(world: &mut World, height: f64) -> BodyId {
        world.add_body(
            Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
                .with_matrix(Frame::from_position(DVec3::new(0.0, height, 0.0))),
        )
    }

    #[test]
    fn test_advance_time_runs_whole_steps() {
        let mut world = sequential_world(DVec3::ZERO);
        let step = world.config().step();
        assert_eq!(world.advance_time(step * 0.5), 0);
        assert_eq!(world.advance_time(step * 0.5), 1);
        assert_eq!(world.step_count(), 1);
        assert!((world.time() - step).abs() < 1e-12);
    }

    #[test]
    fn test_advance_time_discards_backlog() {
        let mut world = sequential_world(DVec3::ZERO);
        let step = world.config().step();
        let steps = world.advance_time(step * 10.25);
        assert_eq!(steps, world.config().max_steps);
        assert_eq!(world.advance_time(0.0), 0);
    }

    #[test]
    #[should_panic(expected = "positive and finite")]
    fn test_update_rejects_zero_step() {
        let mut world = sequential_world(DVec3::ZERO);
        world.update(0.0);
    }

    #[test]
    fn test_free_fall_follows_gravity() {
        let mut world = sequential_world(DVec3::new(0.0, -10.0, 0.0));
        let ball = add_ball(&mut world, 10.0);
        let step = world.config().step();
        for _ in 0..30 {
            world.update(step);
        }
        let body = world.body(ball).unwrap();
        let expected_speed = 10.0 * 30.0 * step;
        assert!((body.velocity().y + expected_speed).abs() < 1e-6);
        assert!(body.position().y < 10.0);
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn test_ball_lands_and_sleeps() {
        let mut world = sequential_world(DVec3::new(0.0, -10.0, 0.0));
        let floor = add_floor(&mut world);
        let ball = add_ball(&mut world, 0.5);
        let step = world.config().step();
        for _ in 0..120 {
            world.update(step);
        }
        let contact = world.contact_between(ball, floor).expect("ball rests on the floor");
        assert!(contact.is_touching());
        let body = world.body(ball).unwrap();
        assert!((body.position().y - 0.5).abs() < 0.02);
        assert!(body.equilibrium());
    }

    #[test]
    fn test_disabled_joint_collision_suppresses_contact() {
        let mut world = sequential_world(DVec3::ZERO);
        let a = add_ball(&mut world, 0.0);
        let b = add_ball(&mut world, 0.8);
        world
            .add_joint_at(
                crate::joint::JointKind::Ball,
                a,
                Some(b),
                Frame::from_position(DVec3::new(0.0, 0.4, 0.0)),
            )
            .unwrap();
        world.update(world.config().step());
        assert!(world.contact_between(a, b).is_none());
    }

    #[test]
    fn test_models_run_each_step() {
        struct Counter {
            body: BodyId,
            before: u32,
            after: u32,
        }

        impl crate::model::Model for Counter {
            fn name(&self) -> &str {
                "counter"
            }

            fn bodies(&self) -> Vec<BodyId> {
                vec![self.body]
            }

            fn joints(&self) -> Vec<crate::joint::JointId> {
                Vec::new()
            }

            fn update(&mut self, world: &mut World, _dt: f64) {
                self.before += 1;
                if let Some(body) = world.body_mut(self.body) {
                    body.add_force(DVec3::new(1.0, 0.0, 0.0));
                }
            }

            fn post_update(&mut self, _world: &mut World, _dt: f64) {
                self.after += 1;
            }
        }

        let mut world = sequential_world(DVec3::ZERO);
        let ball = add_ball(&mut world, 0.0);
        world
            .add_model(Box::new(Counter {
                body: ball,
                before: 0,
                after: 0,
            }))
            .unwrap();
        let step = world.config().step();
        world.update(step);
        world.update(step);
        assert_eq!(world.model_count(), 1);
        assert!(world.body(ball).unwrap().velocity().x > 0.0);
        assert!(world.remove_body(ball).is_err());
        assert!(world.remove_model("counter").is_ok());
        assert!(world.remove_body(ball).is_ok());
    }
}
