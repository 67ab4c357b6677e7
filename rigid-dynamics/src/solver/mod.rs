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
//! Constraint solver
//!
//! Every island is copied into an [`IslandProblem`]: solver bodies
//! (immovable ones with zero inverse mass), the touching contacts and the
//! active joints. Problems are independent, so they are solved in parallel
//! with a projected Gauss-Seidel iteration over bounded rows and written
//! back by the world afterwards.
//!
//! Rows of one contact point are laid out as normal, first friction,
//! second friction. Friction bounds follow the current normal impulse.

mod island;

pub use island::{build_islands, Edge, Island, Link};

use std::collections::HashMap;

use tracing::trace;

use crate::body::Body;
use crate::collision::ContactPoint;
use crate::config::{SolverConfig, LCP_MAX_VALUE};
use crate::joint::{BodyState, ConstraintDescriptor, JacobianRow, Joint, MIN_REGULARIZER};
use crate::math::{DMat3, DVec3, Frame};
use crate::parallel::WorkerPool;
use crate::pool::{PoolStats, VecPool};

/// Approach speed above which restitution applies
const RESTITUTION_SPEED: f64 = 1.0;

/// Effective masses below this make a row inert
const MIN_EFFECTIVE_MASS: f64 = 1.0e-12;

/// Island-local copy of a body
#[derive(Debug, Clone, PartialEq)]
pub struct SolverBody {
    /// Body slot in the world
    pub slot: usize,
    /// Whether the result is written back
    pub movable: bool,
    inv_mass: f64,
    inv_inertia: DMat3,
    /// Body transform
    pub matrix: Frame,
    /// World center of mass
    pub com: DVec3,
    /// Linear velocity
    pub veloc: DVec3,
    /// Angular velocity
    pub omega: DVec3,
}

impl SolverBody {
    /// Copy the state of a body; immovable copies get zero inverses
    pub fn from_body(slot: usize, body: &Body, movable: bool) -> Self {
        let movable = movable && body.is_dynamic();
        let (inv_mass, inv_inertia) = if movable {
            (body.inv_mass(), body.world_inv_inertia())
        } else {
            (0.0, DMat3::ZERO)
        };
        SolverBody {
            slot,
            movable,
            inv_mass,
            inv_inertia,
            matrix: body.matrix(),
            com: body.com(),
            veloc: body.velocity(),
            omega: body.omega(),
        }
    }

    fn state(&self) -> BodyState {
        BodyState {
            com: self.com,
            veloc: self.veloc,
            omega: self.omega,
        }
    }
}

/// A contact as seen by the solver
#[derive(Debug, Clone)]
pub struct ContactInput {
    /// Contact slot in the world
    pub slot: usize,
    /// Local index of body 0
    pub body0: usize,
    /// Local index of body 1
    pub body1: usize,
    /// Manifold, impulses updated by the solve
    pub points: Vec<ContactPoint>,
}

/// A joint as seen by the solver
#[derive(Debug, Clone)]
pub struct JointInput {
    /// Joint slot in the world
    pub slot: usize,
    /// Copy of the joint; its impulses are updated by the solve
    pub joint: Joint,
    /// Local index of body 0
    pub body0: usize,
    /// Local index of body 1, `None` for the world
    pub body1: Option<usize>,
}

/// Everything needed to solve one island
#[derive(Debug, Clone, Default)]
pub struct IslandProblem {
    /// Solver bodies
    pub bodies: Vec<SolverBody>,
    /// Contacts
    pub contacts: Vec<ContactInput>,
    /// Joints
    pub joints: Vec<JointInput>,
    lookup: HashMap<usize, usize>,
}

impl IslandProblem {
    /// Empty problem
    pub fn new() -> Self {
        Self::default()
    }

    /// Local index of a body, copying it in on first use
    pub fn add_body(&mut self, slot: usize, body: &Body, movable: bool) -> usize {
        if let Some(&local) = self.lookup.get(&slot) {
            return local;
        }
        let local = self.bodies.len();
        self.bodies.push(SolverBody::from_body(slot, body, movable));
        self.lookup.insert(slot, local);
        local
    }

    /// Local index of a body slot already in the problem
    pub fn local(&self, slot: usize) -> Option<usize> {
        self.lookup.get(&slot).copied()
    }
}

/// Counters of one solve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Rows solved
    pub rows: usize,
    /// Joint rows rejected as degenerate
    pub rejected: usize,
}

impl std::ops::AddAssign for SolveStats {
    fn add_assign(&mut self, other: SolveStats) {
        self.rows += other.rows;
        self.rejected += other.rejected;
    }
}

#[derive(Debug, Clone, Copy)]
struct SolverRow {
    body0: usize,
    body1: Option<usize>,
    linear0: DVec3,
    angular0: DVec3,
    linear1: DVec3,
    angular1: DVec3,
    /// `M^-1 J^T` for both bodies
    im_linear0: DVec3,
    im_angular0: DVec3,
    im_linear1: DVec3,
    im_angular1: DVec3,
    target: f64,
    lower: f64,
    upper: f64,
    inv_diag: f64,
    impulse: f64,
    /// Normal row and coefficient bounding a friction row
    friction: Option<(usize, f64)>,
}

impl SolverRow {
    #[allow(clippy::too_many_arguments)]
    fn new(
        bodies: &[SolverBody],
        body0: usize,
        body1: Option<usize>,
        jacobian: (DVec3, DVec3, DVec3, DVec3),
        regularizer: f64,
        lower: f64,
        upper: f64,
    ) -> Self {
        let (linear0, angular0, linear1, angular1) = jacobian;
        let b0 = &bodies[body0];
        let im_linear0 = linear0 * b0.inv_mass;
        let im_angular0 = b0.inv_inertia * angular0;
        let (im_linear1, im_angular1) = match body1 {
            Some(b) => (linear1 * bodies[b].inv_mass, bodies[b].inv_inertia * angular1),
            None => (DVec3::ZERO, DVec3::ZERO),
        };
        let jmj = linear0.dot(im_linear0) + angular0.dot(im_angular0) + linear1.dot(im_linear1) + angular1.dot(im_angular1);
        let inv_diag = if jmj > MIN_EFFECTIVE_MASS {
            1.0 / (jmj * (1.0 + regularizer))
        } else {
            0.0
        };
        SolverRow {
            body0,
            body1,
            linear0,
            angular0,
            linear1,
            angular1,
            im_linear0,
            im_angular0,
            im_linear1,
            im_angular1,
            target: 0.0,
            lower,
            upper,
            inv_diag,
            impulse: 0.0,
            friction: None,
        }
    }

    fn rate(&self, bodies: &[SolverBody]) -> f64 {
        let b0 = &bodies[self.body0];
        let mut v = self.linear0.dot(b0.veloc) + self.angular0.dot(b0.omega);
        if let Some(b) = self.body1 {
            v += self.linear1.dot(bodies[b].veloc) + self.angular1.dot(bodies[b].omega);
        }
        v
    }

    fn apply(&self, bodies: &mut [SolverBody], impulse: f64) {
        let b0 = &mut bodies[self.body0];
        b0.veloc += self.im_linear0 * impulse;
        b0.omega += self.im_angular0 * impulse;
        if let Some(b) = self.body1 {
            let b1 = &mut bodies[b];
            b1.veloc += self.im_linear1 * impulse;
            b1.omega += self.im_angular1 * impulse;
        }
    }
}

/// Projected Gauss-Seidel solver over island problems
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    config: SolverConfig,
    rows: VecPool<SolverRow>,
}

impl ConstraintSolver {
    /// Create a solver
    pub fn new(config: SolverConfig) -> Self {
        ConstraintSolver {
            config,
            rows: VecPool::new(),
        }
    }

    /// Solver settings
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Row buffer pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.rows.stats()
    }

    /// Solve every problem, in parallel when the pool allows it
    pub fn solve(&self, pool: &WorkerPool, problems: &mut [IslandProblem], dt: f64) -> SolveStats {
        let per_island = pool.map_mut(problems, |problem| self.solve_island(problem, dt));
        let mut total = SolveStats::default();
        for stats in per_island {
            total += stats;
        }
        total
    }

    /// Solve one island in place
    pub fn solve_island(&self, problem: &mut IslandProblem, dt: f64) -> SolveStats {
        let mut stats = SolveStats::default();
        if dt <= 0.0 || (problem.contacts.is_empty() && problem.joints.is_empty()) {
            return stats;
        }
        let mut rows = self.rows.acquire();
        self.build_contact_rows(problem, dt, &mut rows);
        let joint_ranges = self.build_joint_rows(problem, dt, &mut rows, &mut stats);
        stats.rows = rows.len();

        let bodies = &mut problem.bodies;
        for row in rows.iter() {
            if row.impulse != 0.0 {
                row.apply(bodies, row.impulse);
            }
        }

        for _ in 0..self.config.velocity_iterations {
            for i in 0..rows.len() {
                let row = rows[i];
                if row.inv_diag == 0.0 {
                    continue;
                }
                let (lower, upper) = match row.friction {
                    Some((normal, mu)) => {
                        let limit = mu * rows[normal].impulse;
                        (-limit, limit)
                    }
                    None => (row.lower, row.upper),
                };
                let delta = (row.target - row.rate(bodies)) * row.inv_diag;
                let impulse = (row.impulse + delta).clamp(lower, upper);
                let applied = impulse - row.impulse;
                if applied != 0.0 {
                    row.apply(bodies, applied);
                    rows[i].impulse = impulse;
                }
            }
        }

        let mut index = 0;
        for contact in problem.contacts.iter_mut() {
            for point in contact.points.iter_mut() {
                point.normal_impulse = rows[index].impulse;
                point.friction_impulse0 = rows[index + 1].impulse;
                point.friction_impulse1 = rows[index + 2].impulse;
                index += 3;
            }
        }
        for (input, (start, count)) in problem.joints.iter_mut().zip(joint_ranges) {
            input.joint.impulses.clear();
            input.joint.impulses.extend(rows[start..start + count].iter().map(|r| r.impulse));
        }
        trace!(rows = stats.rows, bodies = problem.bodies.len(), "Solved island");
        stats
    }

    fn build_contact_rows(&self, problem: &IslandProblem, dt: f64, rows: &mut Vec<SolverRow>) {
        let config = &self.config;
        let bodies = &problem.bodies;
        for contact in &problem.contacts {
            let (b0, b1) = (contact.body0, contact.body1);
            for point in &contact.points {
                let r0 = point.point - bodies[b0].com;
                let r1 = point.point - bodies[b1].com;
                let axis = |d: DVec3| (-d, -r0.cross(d), d, r1.cross(d));

                let normal_index = rows.len();
                let mut normal = SolverRow::new(
                    bodies,
                    b0,
                    Some(b1),
                    axis(point.normal),
                    config.contact_regularizer,
                    0.0,
                    LCP_MAX_VALUE,
                );
                let vn = normal.rate(bodies);
                let pen = point.penetration;
                let mut target = if pen < 0.0 {
                    pen / dt
                } else if pen > config.allowed_penetration {
                    config.position_bias * (pen - config.allowed_penetration) / dt
                } else {
                    0.0
                };
                if vn < -RESTITUTION_SPEED {
                    target = target.max(-point.restitution * vn);
                }
                normal.target = target;
                normal.impulse = point.normal_impulse * config.warm_start_factor;
                rows.push(normal);

                let frictions = [
                    (point.dir0, point.friction0, point.friction_impulse0),
                    (point.dir1, point.friction1, point.friction_impulse1),
                ];
                for (dir, mu, impulse) in frictions {
                    let mut row = SolverRow::new(
                        bodies,
                        b0,
                        Some(b1),
                        axis(dir),
                        config.contact_regularizer,
                        -LCP_MAX_VALUE,
                        LCP_MAX_VALUE,
                    );
                    row.friction = Some((normal_index, mu.max(0.0)));
                    row.impulse = impulse * config.warm_start_factor;
                    rows.push(row);
                }
            }
        }
    }

    fn build_joint_rows(
        &self,
        problem: &IslandProblem,
        dt: f64,
        rows: &mut Vec<SolverRow>,
        stats: &mut SolveStats,
    ) -> Vec<(usize, usize)> {
        let config = &self.config;
        let bodies = &problem.bodies;
        let mut ranges = Vec::with_capacity(problem.joints.len());
        for input in &problem.joints {
            let b0 = &bodies[input.body0];
            let b1 = input.body1.map(|b| &bodies[b]);
            let (matrix0, matrix1) = input.joint.global_matrices(&b0.matrix, b1.map(|b| &b.matrix));
            let mut desc = ConstraintDescriptor::new(dt, b0.state(), b1.map(SolverBody::state).unwrap_or_default())
                .with_tolerance(config.degenerate_row_tolerance);
            input.joint.jacobian_derivative(&mut desc, matrix0, matrix1);
            stats.rejected += desc.rejected();

            let start = rows.len();
            let jacobian_rows = desc.into_rows();
            let warm = input.joint.impulses.len() == jacobian_rows.len();
            for (k, jr) in jacobian_rows.iter().enumerate() {
                let mut row = self.joint_row(bodies, input, jr);
                row.target = match jr.motor {
                    Some(motor) => motor,
                    None => -config.position_bias * jr.error / dt,
                };
                if warm {
                    row.impulse = (input.joint.impulses[k] * config.warm_start_factor).clamp(row.lower, row.upper);
                }
                rows.push(row);
            }
            ranges.push((start, jacobian_rows.len()));
        }
        ranges
    }

    fn joint_row(&self, bodies: &[SolverBody], input: &JointInput, jr: &JacobianRow) -> SolverRow {
        SolverRow::new(
            bodies,
            input.body0,
            input.body1,
            (jr.linear0, jr.angular0, jr.linear1, jr.angular1),
            jr.regularizer.max(MIN_REGULARIZER),
            jr.lower,
            jr.upper,
        )
    }
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyId;
    use crate::joint::JointKind;
    use crate::shape::{Shape, ShapeInstance};

    fn ball(position: DVec3, veloc: DVec3) -> Body {
        Body::new(ShapeInstance::new(Shape::sphere(0.5)), 1.0)
            .with_matrix(Frame::from_position(position))
            .with_velocity(veloc)
    }

    fn floor() -> Body {
        Body::new_static(ShapeInstance::new(Shape::cuboid(10.0, 1.0, 10.0)))
    }

    fn resting_contact(penetration: f64, falling: f64) -> IslandProblem {
        let mut problem = IslandProblem::new();
        let b0 = problem.add_body(0, &floor(), false);
        let b1 = problem.add_body(1, &ball(DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, -falling, 0.0)), true);
        let mut point = ContactPoint::new(DVec3::new(0.0, 0.5, 0.0), DVec3::Y, penetration);
        point.friction0 = 0.5;
        point.friction1 = 0.5;
        problem.contacts.push(ContactInput {
            slot: 0,
            body0: b0,
            body1: b1,
            points: vec![point],
        });
        problem
    }

    #[test]
    fn test_contact_stops_approach() {
        let solver = ConstraintSolver::default();
        let mut problem = resting_contact(0.0, 2.0);
        let stats = solver.solve_island(&mut problem, 1.0 / 60.0);
        assert_eq!(stats.rows, 3);
        assert!(problem.bodies[1].veloc.y.abs() < 1e-3);
        assert!(problem.contacts[0].points[0].normal_impulse > 1.9);
        assert!(!problem.bodies[0].movable);
        assert_eq!(problem.bodies[0].veloc, DVec3::ZERO);
    }

    #[test]
    fn test_speculative_gap_closes_exactly() {
        let dt = 0.1;
        let solver = ConstraintSolver::default();
        let mut problem = resting_contact(-0.05, 2.0);
        solver.solve_island(&mut problem, dt);
        assert!((problem.bodies[1].veloc.y + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_separating_contact_pulls_nothing() {
        let solver = ConstraintSolver::default();
        let mut problem = resting_contact(0.0, -1.0);
        solver.solve_island(&mut problem, 1.0 / 60.0);
        assert_eq!(problem.contacts[0].points[0].normal_impulse, 0.0);
        assert!((problem.bodies[1].veloc.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_friction_is_bounded_by_normal_impulse() {
        let solver = ConstraintSolver::default();
        let mut problem = resting_contact(0.0, 1.0);
        problem.bodies[1].veloc.x = 5.0;
        solver.solve_island(&mut problem, 1.0 / 60.0);
        let p = problem.contacts[0].points[0];
        assert!(p.normal_impulse > 0.0);
        assert!(p.friction_impulse0.abs() <= 0.5 * p.normal_impulse + 1e-9);
        assert!(p.friction_impulse1.abs() <= 0.5 * p.normal_impulse + 1e-9);
        assert!(problem.bodies[1].veloc.x < 5.0);
    }

    #[test]
    fn test_ball_joint_to_world_holds_pivot() {
        let solver = ConstraintSolver::new(SolverConfig::default().with_iterations(20));
        let body = ball(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, -1.0, 0.0));
        let joint = Joint::new(
            JointKind::Ball,
            BodyId::new(0, 0),
            None,
            Frame::from_position(-DVec3::X),
            Frame::IDENTITY,
        );
        let mut problem = IslandProblem::new();
        let b0 = problem.add_body(0, &body, true);
        problem.joints.push(JointInput {
            slot: 0,
            joint,
            body0: b0,
            body1: None,
        });
        let stats = solver.solve_island(&mut problem, 1.0 / 60.0);
        assert_eq!(stats.rows, 3);
        let b = &problem.bodies[0];
        let pivot_velocity = b.veloc + b.omega.cross(-DVec3::X);
        assert!(pivot_velocity.length() < 1e-2);
        assert_eq!(problem.joints[0].joint.impulses().len(), 3);
    }

    #[test]
    fn test_row_buffers_are_recycled() {
        let solver = ConstraintSolver::default();
        for _ in 0..3 {
            let mut problem = resting_contact(0.0, 1.0);
            solver.solve_island(&mut problem, 1.0 / 60.0);
        }
        let stats = solver.pool_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }
}
