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
//! Six degree of freedom effector
//!
//! Pulls a frame on the child body towards a target frame expressed in the
//! parent's joint frame. Linear rows and the rows that close the rotation
//! are soft springs; rows that only hold the rotation axis in place are
//! hard, bounded by the torque limit. Used to pose limbs and end effectors
//! of models.

use crate::config::LCP_MAX_VALUE;
use crate::joint::descriptor::{angle_about, ConstraintDescriptor};
use crate::math::{orthonormal_basis, DVec3, Frame, DEG_TO_RAD};

/// Relative angle above which a single axis-angle row is used
const SMALL_ANGLE: f64 = 3.0 * DEG_TO_RAD;

/// How the effector drives orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationType {
    /// Position only
    #[default]
    Disabled,
    /// Align rotation about the target pin only
    FixAxis,
    /// Rotate along the shortest arc onto the target
    ShortestPath,
}

/// Soft 6-DOF target tracking joint
#[derive(Debug, Clone, PartialEq)]
pub struct Ik6DofEffector {
    target: Frame,
    rotation_type: RotationType,
    control_dof: u8,
    linear_spring: f64,
    linear_damper: f64,
    linear_regularizer: f64,
    angular_spring: f64,
    angular_damper: f64,
    angular_regularizer: f64,
    max_force: f64,
    max_torque: f64,
}

impl Default for Ik6DofEffector {
    fn default() -> Self {
        Ik6DofEffector {
            target: Frame::IDENTITY,
            rotation_type: RotationType::Disabled,
            control_dof: 0xff,
            linear_spring: 1000.0,
            linear_damper: 50.0,
            linear_regularizer: 5.0e-3,
            angular_spring: 1000.0,
            angular_damper: 50.0,
            angular_regularizer: 5.0e-3,
            max_force: LCP_MAX_VALUE,
            max_torque: LCP_MAX_VALUE,
        }
    }
}

impl Ik6DofEffector {
    /// Effector with default springs and no rotation control
    pub fn new() -> Self {
        Self::default()
    }

    /// Target frame relative to the parent joint frame
    pub fn offset_matrix(&self) -> Frame {
        self.target
    }

    /// Move the target
    pub fn set_offset_matrix(&mut self, target: Frame) {
        self.target = target;
    }

    /// Orientation mode
    pub fn rotation_type(&self) -> RotationType {
        self.rotation_type
    }

    /// Set the orientation mode
    pub fn set_rotation_type(&mut self, rotation_type: RotationType) {
        self.rotation_type = rotation_type;
    }

    /// Bitmask of driven linear axes, bits 0-2 for x, y and z
    pub fn control_dof(&self) -> u8 {
        self.control_dof
    }

    /// Restrict the driven axes
    pub fn set_control_dof(&mut self, mask: u8) {
        self.control_dof = mask;
    }

    /// Linear spring, damper and regularizer
    pub fn linear_spring_damper(&self) -> (f64, f64, f64) {
        (self.linear_spring, self.linear_damper, self.linear_regularizer)
    }

    /// Set the linear spring, damper and regularizer
    pub fn set_linear_spring_damper(&mut self, regularizer: f64, spring: f64, damper: f64) {
        self.linear_spring = spring.abs();
        self.linear_damper = damper.abs();
        self.linear_regularizer = regularizer.abs();
    }

    /// Angular spring, damper and regularizer
    pub fn angular_spring_damper(&self) -> (f64, f64, f64) {
        (self.angular_spring, self.angular_damper, self.angular_regularizer)
    }

    /// Set the angular spring, damper and regularizer
    pub fn set_angular_spring_damper(&mut self, regularizer: f64, spring: f64, damper: f64) {
        self.angular_spring = spring.abs();
        self.angular_damper = damper.abs();
        self.angular_regularizer = regularizer.abs();
    }

    /// Largest force a linear row may apply
    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    /// Clamp the linear rows
    pub fn set_max_force(&mut self, force: f64) {
        self.max_force = force.abs().min(LCP_MAX_VALUE);
    }

    /// Largest torque an angular row may apply
    pub fn max_torque(&self) -> f64 {
        self.max_torque
    }

    /// Clamp the angular rows
    pub fn set_max_torque(&mut self, torque: f64) {
        self.max_torque = torque.abs().min(LCP_MAX_VALUE);
    }

    fn controls(&self, bit: u8) -> bool {
        self.control_dof & (1 << bit) != 0
    }

    pub(crate) fn jacobian_derivative(&self, desc: &mut ConstraintDescriptor, matrix0: Frame, matrix1: Frame) {
        let target = matrix1 * self.target;
        self.submit_linear_rows(desc, matrix0, matrix1, target);
        match self.rotation_type {
            RotationType::Disabled => {}
            RotationType::FixAxis => self.submit_fix_axis(desc, matrix0, target),
            RotationType::ShortestPath => self.submit_shortest_path(desc, matrix0, target),
        }
    }

    fn submit_linear_rows(&self, desc: &mut ConstraintDescriptor, matrix0: Frame, matrix1: Frame, target: Frame) {
        let p0 = matrix0.position;
        let p1 = target.position;
        let axes = [DVec3::X, DVec3::Y, DVec3::Z];
        for (bit, axis) in axes.into_iter().enumerate() {
            if !self.controls(bit as u8) {
                continue;
            }
            let dir = matrix1.rotate_vector(axis);
            if desc.add_linear_row(p0, p1, dir) {
                desc.set_mass_spring_damper_acceleration(
                    self.linear_regularizer,
                    self.linear_spring,
                    self.linear_damper * 2.0,
                );
                desc.set_lower_friction(-self.max_force);
                desc.set_high_friction(self.max_force);
            }
        }
    }

    fn soft_angular_row(&self, desc: &mut ConstraintDescriptor, dir: DVec3, angle: f64) {
        if desc.add_angular_row(dir, angle) {
            desc.set_mass_spring_damper_acceleration(self.angular_regularizer, self.angular_spring, self.angular_damper);
            desc.set_lower_friction(-self.max_torque);
            desc.set_high_friction(self.max_torque);
        }
    }

    fn hard_angular_row(&self, desc: &mut ConstraintDescriptor, dir: DVec3) {
        if desc.add_angular_row(dir, 0.0) {
            desc.set_lower_friction(-self.max_torque);
            desc.set_high_friction(self.max_torque);
        }
    }

    /// One unbounded soft row twisting about the target pin
    fn submit_fix_axis(&self, desc: &mut ConstraintDescriptor, matrix0: Frame, target: Frame) {
        let pin = target.rotate_vector(DVec3::X);
        let up_target = target.rotate_vector(DVec3::Y);
        let up0 = matrix0.rotate_vector(DVec3::Y);
        if desc.add_angular_row(pin, angle_about(up_target, up0, pin)) {
            desc.set_mass_spring_damper_acceleration(self.angular_regularizer, self.angular_spring, self.angular_damper);
        }
    }

    fn submit_shortest_path(&self, desc: &mut ConstraintDescriptor, matrix0: Frame, target: Frame) {
        let mut relative = (target.rotation.inverse() * matrix0.rotation).normalize();
        if relative.w < 0.0 {
            relative = -relative;
        }
        let (local_axis, angle) = relative.to_axis_angle();
        if angle > SMALL_ANGLE {
            let axis = target.rotate_vector(local_axis).normalize_or_zero();
            let (u, v) = orthonormal_basis(axis);
            self.soft_angular_row(desc, axis, angle);
            self.hard_angular_row(desc, u);
            self.hard_angular_row(desc, v);
        } else {
            let front = target.rotate_vector(DVec3::X);
            let up = target.rotate_vector(DVec3::Y);
            let right = target.rotate_vector(DVec3::Z);
            let front0 = matrix0.rotate_vector(DVec3::X);
            let up0 = matrix0.rotate_vector(DVec3::Y);
            self.soft_angular_row(desc, up, angle_about(front, front0, up));
            self.soft_angular_row(desc, right, angle_about(front, front0, right));
            self.soft_angular_row(desc, front, angle_about(up, up0, front));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::descriptor::BodyState;
    use crate::math::DQuat;

    fn rows_for(effector: &Ik6DofEffector, matrix0: Frame, matrix1: Frame) -> ConstraintDescriptor {
        let mut desc = ConstraintDescriptor::new(1.0 / 60.0, BodyState::default(), BodyState::default());
        effector.jacobian_derivative(&mut desc, matrix0, matrix1);
        desc
    }

    #[test]
    fn test_defaults() {
        let e = Ik6DofEffector::new();
        assert_eq!(e.rotation_type(), RotationType::Disabled);
        assert_eq!(e.control_dof(), 0xff);
        assert_eq!(e.linear_spring_damper(), (1000.0, 50.0, 5.0e-3));
        assert_eq!(e.max_force(), LCP_MAX_VALUE);
    }

    #[test]
    fn test_identity_target_rows_are_at_rest() {
        let mut e = Ik6DofEffector::new();
        e.set_rotation_type(RotationType::ShortestPath);
        let frame = Frame::from_position(DVec3::new(1.0, 2.0, 3.0));
        let desc = rows_for(&e, frame, frame);
        assert_eq!(desc.row_count(), 6);
        for row in desc.rows() {
            assert!(row.error.abs() < 1e-12);
            assert!(row.motor.unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn test_large_rotation_uses_axis_angle_row() {
        let mut e = Ik6DofEffector::new();
        e.set_rotation_type(RotationType::ShortestPath);
        let matrix0 = Frame::from_rotation(DQuat::from_rotation_z(0.5));
        let desc = rows_for(&e, matrix0, Frame::IDENTITY);
        let angular = &desc.rows()[3];
        assert!((angular.error - 0.5).abs() < 1e-9);
        assert!((angular.angular0 - DVec3::Z).length() < 1e-9);
        assert!(angular.motor.is_some());
        for row in &desc.rows()[4..] {
            assert_eq!(row.error, 0.0);
            assert!(row.motor.is_none(), "axis holding rows are hard");
            assert_eq!(row.lower, -LCP_MAX_VALUE);
        }
    }

    #[test]
    fn test_small_rotation_measures_frame_axes() {
        let mut e = Ik6DofEffector::new();
        e.set_rotation_type(RotationType::ShortestPath);
        e.set_max_torque(40.0);
        let matrix0 = Frame::from_rotation(DQuat::from_rotation_z(0.02));
        let desc = rows_for(&e, matrix0, Frame::IDENTITY);
        assert_eq!(desc.row_count(), 6);
        let angular = &desc.rows()[3..];
        let expected = [(DVec3::Y, 0.0), (DVec3::Z, 0.02), (DVec3::X, 0.0)];
        for (row, (axis, error)) in angular.iter().zip(expected) {
            assert!((row.angular0 - axis).length() < 1e-12);
            assert!((row.error - error).abs() < 1e-12, "error {}", row.error);
            assert!(row.motor.is_some());
            assert_eq!((row.lower, row.upper), (-40.0, 40.0));
        }
    }

    #[test]
    fn test_control_mask_and_fix_axis() {
        let mut e = Ik6DofEffector::new();
        e.set_rotation_type(RotationType::FixAxis);
        e.set_control_dof(0b1001);
        e.set_max_force(-20.0);
        let matrix0 = Frame::new(DQuat::from_rotation_x(0.2), DVec3::new(0.3, 0.0, 0.0));
        let desc = rows_for(&e, matrix0, Frame::IDENTITY);
        assert_eq!(desc.row_count(), 2);
        let linear = desc.rows()[0];
        assert!((linear.error - 0.3).abs() < 1e-12);
        assert_eq!(linear.lower, -20.0);
        let twist = desc.rows()[1];
        assert!((twist.error - 0.2).abs() < 1e-9);
        assert!(twist.motor.is_some());
        assert_eq!(twist.lower, -LCP_MAX_VALUE);
    }
}
