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
//! Jacobian rows submitted by joints
//!
//! A row constrains one scalar quantity `C` of the two bodies whose rate
//! is `J v`. Rows start out hard (the solver drives `C` back to zero with
//! the position bias) and become soft when a spring/damper acceleration
//! is attached to them.

use tracing::debug;

use crate::config::LCP_MAX_VALUE;
use crate::math::DVec3;

/// Rows whose direction is shorter than this are rejected
pub const DEFAULT_ROW_TOLERANCE: f64 = 1.0e-12;

/// Regularizer range accepted by soft rows
pub const MIN_REGULARIZER: f64 = 1.0e-4;
/// Upper end of the regularizer range
pub const MAX_REGULARIZER: f64 = 0.99;

/// Velocity state of one side of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    /// World center of mass
    pub com: DVec3,
    /// Linear velocity
    pub veloc: DVec3,
    /// Angular velocity
    pub omega: DVec3,
}

/// One scalar constraint equation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianRow {
    /// Linear part acting on body 0
    pub linear0: DVec3,
    /// Angular part acting on body 0
    pub angular0: DVec3,
    /// Linear part acting on body 1
    pub linear1: DVec3,
    /// Angular part acting on body 1
    pub angular1: DVec3,
    /// Current value of the constrained quantity
    pub error: f64,
    /// Current rate `J v`
    pub relative_velocity: f64,
    /// Target rate of a soft row; hard rows leave it empty
    pub motor: Option<f64>,
    /// Lower impulse bound
    pub lower: f64,
    /// Upper impulse bound
    pub upper: f64,
    /// Softness added to the row's effective mass
    pub regularizer: f64,
}

impl JacobianRow {
    fn new(linear0: DVec3, angular0: DVec3, linear1: DVec3, angular1: DVec3, error: f64) -> Self {
        JacobianRow {
            linear0,
            angular0,
            linear1,
            angular1,
            error,
            relative_velocity: 0.0,
            motor: None,
            lower: -LCP_MAX_VALUE,
            upper: LCP_MAX_VALUE,
            regularizer: 0.0,
        }
    }

    /// `J v` for the given body states
    pub fn rate(&self, body0: &BodyState, body1: &BodyState) -> f64 {
        self.linear0.dot(body0.veloc)
            + self.angular0.dot(body0.omega)
            + self.linear1.dot(body1.veloc)
            + self.angular1.dot(body1.omega)
    }
}

/// Row collector passed to a joint each step
#[derive(Debug, Clone)]
pub struct ConstraintDescriptor {
    dt: f64,
    body0: BodyState,
    body1: BodyState,
    rows: Vec<JacobianRow>,
    rejected: usize,
    tolerance: f64,
    last_accepted: bool,
}

impl ConstraintDescriptor {
    /// Start collecting rows for bodies in the given states
    pub fn new(dt: f64, body0: BodyState, body1: BodyState) -> Self {
        ConstraintDescriptor {
            dt,
            body0,
            body1,
            rows: Vec::with_capacity(6),
            rejected: 0,
            tolerance: DEFAULT_ROW_TOLERANCE,
            last_accepted: false,
        }
    }

    /// Squared direction length below which rows are rejected
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Time step of the solve
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Accepted rows
    pub fn rows(&self) -> &[JacobianRow] {
        &self.rows
    }

    /// Number of accepted rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of rows rejected as degenerate
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub(crate) fn into_rows(self) -> Vec<JacobianRow> {
        self.rows
    }

    fn push(&mut self, mut row: JacobianRow, direction: DVec3) -> bool {
        if !(direction.length_squared() >= self.tolerance) {
            debug!(?direction, "Rejecting degenerate jacobian row");
            self.rejected += 1;
            self.last_accepted = false;
            return false;
        }
        row.relative_velocity = row.rate(&self.body0, &self.body1);
        self.rows.push(row);
        self.last_accepted = true;
        true
    }

    fn last(&mut self) -> Option<&mut JacobianRow> {
        if self.last_accepted {
            self.rows.last_mut()
        } else {
            None
        }
    }

    /// Keep the points `p0` on body 0 and `p1` on body 1 together along `dir`
    ///
    /// Returns `false` and adds nothing if `dir` is degenerate.
    pub fn add_linear_row(&mut self, p0: DVec3, p1: DVec3, dir: DVec3) -> bool {
        let dir = dir.normalize_or_zero();
        let r0 = p0 - self.body0.com;
        let r1 = p1 - self.body1.com;
        let row = JacobianRow::new(dir, r0.cross(dir), -dir, -r1.cross(dir), dir.dot(p0 - p1));
        self.push(row, dir)
    }

    /// Drive the rotation of body 0 relative to body 1 about `dir` to zero
    ///
    /// `angle` is the current relative angle about `dir`.
    pub fn add_angular_row(&mut self, dir: DVec3, angle: f64) -> bool {
        let dir = dir.normalize_or_zero();
        let row = JacobianRow::new(DVec3::ZERO, dir, DVec3::ZERO, -dir, angle);
        self.push(row, dir)
    }

    /// Lower impulse bound of the last row
    pub fn set_lower_friction(&mut self, value: f64) {
        if let Some(row) = self.last() {
            row.lower = value.max(-LCP_MAX_VALUE);
        }
    }

    /// Upper impulse bound of the last row
    pub fn set_high_friction(&mut self, value: f64) {
        if let Some(row) = self.last() {
            row.upper = value.min(LCP_MAX_VALUE);
        }
    }

    /// Make the last row a spring/damper
    ///
    /// Computes the implicit acceleration
    /// `a = -(ks x + kd v + dt ks v) / (1 + dt kd + dt^2 ks)` from the row's
    /// error `x` and rate `v`, stores the target rate `v + a dt` and the
    /// regularizer clamped to `[1e-4, 0.99]`. Returns the acceleration.
    pub fn set_mass_spring_damper_acceleration(&mut self, regularizer: f64, spring: f64, damper: f64) -> Option<f64> {
        let dt = self.dt;
        let row = self.last()?;
        let ks = spring.abs();
        let kd = damper.abs();
        let x = row.error;
        let v = row.relative_velocity;
        let accel = -(ks * x + kd * v + dt * ks * v) / (1.0 + dt * kd + dt * dt * ks);
        row.motor = Some(v + accel * dt);
        row.regularizer = regularizer.clamp(MIN_REGULARIZER, MAX_REGULARIZER);
        Some(accel)
    }

    /// Drive the last row with a prescribed acceleration
    pub fn set_motor_acceleration(&mut self, accel: f64) {
        let dt = self.dt;
        if let Some(row) = self.last() {
            row.motor = Some(row.relative_velocity + accel * dt);
        }
    }
}

/// Angle that rotates `from` onto `to` about `axis`
///
/// Both vectors are expected to be roughly perpendicular to `axis`.
pub fn angle_about(from: DVec3, to: DVec3, axis: DVec3) -> f64 {
    let sin = from.cross(to).dot(axis);
    let cos = from.dot(to);
    sin.atan2(cos)
}
