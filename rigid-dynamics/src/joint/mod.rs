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
//! Bilateral constraints
//!
//! A [`Joint`] ties body 0 to body 1, or to the world when body 1 is
//! `None`. Each body carries a local joint frame; every step the joint
//! compares the two frames in world space and submits one
//! [`JacobianRow`] per constrained degree of freedom to a
//! [`ConstraintDescriptor`].
//!
//! Frames follow one axis convention: X is the pin (front), Y is up and
//! Z is right.

mod descriptor;
mod effector;

pub use descriptor::{
    angle_about, BodyState, ConstraintDescriptor, JacobianRow, DEFAULT_ROW_TOLERANCE, MAX_REGULARIZER,
    MIN_REGULARIZER,
};
pub use effector::{Ik6DofEffector, RotationType};

use std::fmt;

use crate::body::BodyId;
use crate::math::{DVec3, Frame};

/// Generational handle of a joint in a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId {
    index: u32,
    generation: u32,
}

impl JointId {
    /// Create a handle from a slot index and generation
    pub fn new(index: u32, generation: u32) -> Self {
        JointId { index, generation }
    }

    /// Slot index
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when the handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Joint({}, gen: {})", self.index, self.generation)
    }
}

/// Revolute joint about the pin axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HingeJoint {
    limits: Option<(f64, f64)>,
}

impl HingeJoint {
    /// Free hinge
    pub fn new() -> Self {
        Self::default()
    }

    /// Hinge whose angle stays within `[min, max]`
    pub fn with_limits(min: f64, max: f64) -> Self {
        HingeJoint {
            limits: Some((min.min(max), min.max(max))),
        }
    }

    /// Angle limits
    pub fn limits(&self) -> Option<(f64, f64)> {
        self.limits
    }

    /// Set or clear the angle limits
    pub fn set_limits(&mut self, limits: Option<(f64, f64)>) {
        self.limits = limits.map(|(a, b)| (a.min(b), a.max(b)));
    }

    /// Angle of body 0 about the pin relative to body 1
    pub fn angle(matrix0: &Frame, matrix1: &Frame) -> f64 {
        angle_about(
            matrix1.rotate_vector(DVec3::Y),
            matrix0.rotate_vector(DVec3::Y),
            matrix1.rotate_vector(DVec3::X),
        )
    }
}

/// The closed set of joint kinds
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    /// Keeps the two pivots together
    Ball,
    /// Ball plus alignment of the pins
    Hinge(HingeJoint),
    /// Locks all six degrees of freedom
    Fixed,
    /// Soft target tracking
    Ik6DofEffector(Ik6DofEffector),
}

impl JointKind {
    /// Most rows the kind submits per step
    pub fn max_rows(&self) -> usize {
        match self {
            JointKind::Ball => 3,
            JointKind::Hinge(_) => 6,
            JointKind::Fixed | JointKind::Ik6DofEffector(_) => 6,
        }
    }
}

/// A joint between two bodies
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) id: Option<JointId>,
    kind: JointKind,
    body0: BodyId,
    body1: Option<BodyId>,
    local_matrix0: Frame,
    local_matrix1: Frame,
    collision_enabled: bool,
    active: bool,
    /// Impulses of the previous solve, one per row, for warm starting
    pub(crate) impulses: Vec<f64>,
}

impl Joint {
    /// Create a joint from frames local to each body
    ///
    /// With `body1 == None`, `local_matrix1` is a world frame.
    pub fn new(kind: JointKind, body0: BodyId, body1: Option<BodyId>, local_matrix0: Frame, local_matrix1: Frame) -> Self {
        Joint {
            id: None,
            kind,
            body0,
            body1,
            local_matrix0,
            local_matrix1,
            collision_enabled: false,
            active: true,
            impulses: Vec::new(),
        }
    }

    /// Handle assigned by the world
    pub fn id(&self) -> Option<JointId> {
        self.id
    }

    /// Kind and parameters
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable kind and parameters
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Effector parameters, when the joint is an effector
    pub fn effector_mut(&mut self) -> Option<&mut Ik6DofEffector> {
        match &mut self.kind {
            JointKind::Ik6DofEffector(e) => Some(e),
            _ => None,
        }
    }

    /// Child body
    pub fn body0(&self) -> BodyId {
        self.body0
    }

    /// Parent body, `None` for the world
    pub fn body1(&self) -> Option<BodyId> {
        self.body1
    }

    /// Check whether the joint links `a` and `b` in any order
    pub fn links(&self, a: BodyId, b: BodyId) -> bool {
        (self.body0 == a && self.body1 == Some(b)) || (self.body0 == b && self.body1 == Some(a))
    }

    /// Joint frame in body 0 space
    pub fn local_matrix0(&self) -> Frame {
        self.local_matrix0
    }

    /// Joint frame in body 1 space
    pub fn local_matrix1(&self) -> Frame {
        self.local_matrix1
    }

    /// World joint frames for the given body transforms
    pub fn global_matrices(&self, body0: &Frame, body1: Option<&Frame>) -> (Frame, Frame) {
        let m0 = *body0 * self.local_matrix0;
        let m1 = match body1 {
            Some(frame) => *frame * self.local_matrix1,
            None => self.local_matrix1,
        };
        (m0, m1)
    }

    /// Whether the two bodies still collide with each other
    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    /// Let the linked bodies collide
    pub fn set_collision_enabled(&mut self, enabled: bool) {
        self.collision_enabled = enabled;
    }

    /// Whether the joint takes part in the solve
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the joint
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.impulses.clear();
        }
    }

    /// Impulses applied by the last solve
    pub fn impulses(&self) -> &[f64] {
        &self.impulses
    }

    /// Submit the rows of this joint for world joint frames `matrix0` and `matrix1`
    pub fn jacobian_derivative(&self, desc: &mut ConstraintDescriptor, matrix0: Frame, matrix1: Frame) {
        match &self.kind {
            JointKind::Ball => submit_ball(desc, &matrix0, &matrix1),
            JointKind::Hinge(hinge) => {
                submit_ball(desc, &matrix0, &matrix1);
                submit_pin_alignment(desc, &matrix0, &matrix1);
                if let Some((min, max)) = hinge.limits {
                    submit_hinge_limit(desc, &matrix0, &matrix1, min, max);
                }
            }
            JointKind::Fixed => {
                submit_ball(desc, &matrix0, &matrix1);
                let pin = matrix1.rotate_vector(DVec3::X);
                desc.add_angular_row(pin, HingeJoint::angle(&matrix0, &matrix1));
                submit_pin_alignment(desc, &matrix0, &matrix1);
            }
            JointKind::Ik6DofEffector(effector) => effector.jacobian_derivative(desc, matrix0, matrix1),
        }
    }
}

fn submit_ball(desc: &mut ConstraintDescriptor, matrix0: &Frame, matrix1: &Frame) {
    for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
        desc.add_linear_row(matrix0.position, matrix1.position, matrix1.rotate_vector(axis));
    }
}

fn submit_pin_alignment(desc: &mut ConstraintDescriptor, matrix0: &Frame, matrix1: &Frame) {
    let front0 = matrix0.rotate_vector(DVec3::X);
    let front1 = matrix1.rotate_vector(DVec3::X);
    for axis in [DVec3::Y, DVec3::Z] {
        let dir = matrix1.rotate_vector(axis);
        desc.add_angular_row(dir, angle_about(front1, front0, dir));
    }
}

fn submit_hinge_limit(desc: &mut ConstraintDescriptor, matrix0: &Frame, matrix1: &Frame, min: f64, max: f64) {
    let angle = HingeJoint::angle(matrix0, matrix1);
    let pin = matrix1.rotate_vector(DVec3::X);
    if angle < min {
        if desc.add_angular_row(pin, angle - min) {
            desc.set_lower_friction(0.0);
        }
    } else if angle > max && desc.add_angular_row(pin, angle - max) {
        desc.set_high_friction(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DQuat;

    fn rows(kind: JointKind, matrix0: Frame, matrix1: Frame) -> Vec<JacobianRow> {
        let joint = Joint::new(kind, BodyId::new(0, 0), None, Frame::IDENTITY, Frame::IDENTITY);
        let mut desc = ConstraintDescriptor::new(1.0 / 60.0, BodyState::default(), BodyState::default());
        joint.jacobian_derivative(&mut desc, matrix0, matrix1);
        desc.into_rows()
    }

    #[test]
    fn test_joint_id_display() {
        let id = JointId::new(3, 1);
        assert_eq!(id.index(), 3);
        assert_eq!(id.to_string(), "Joint(3, gen: 1)");
    }

    #[test]
    fn test_row_counts() {
        assert_eq!(rows(JointKind::Ball, Frame::IDENTITY, Frame::IDENTITY).len(), 3);
        assert_eq!(rows(JointKind::Hinge(HingeJoint::new()), Frame::IDENTITY, Frame::IDENTITY).len(), 5);
        assert_eq!(rows(JointKind::Fixed, Frame::IDENTITY, Frame::IDENTITY).len(), 6);
    }

    #[test]
    fn test_ball_error_measures_pivot_offset() {
        let matrix0 = Frame::from_position(DVec3::new(0.0, 0.25, 0.0));
        let r = rows(JointKind::Ball, matrix0, Frame::IDENTITY);
        assert_eq!(r[0].error, 0.0);
        assert_eq!(r[1].error, 0.25);
    }

    #[test]
    fn test_hinge_limit_row_is_one_sided() {
        let hinge = HingeJoint::with_limits(-0.5, 0.5);
        let matrix0 = Frame::from_rotation(DQuat::from_rotation_x(0.7));
        assert!((HingeJoint::angle(&matrix0, &Frame::IDENTITY) - 0.7).abs() < 1e-12);
        let r = rows(JointKind::Hinge(hinge), matrix0, Frame::IDENTITY);
        assert_eq!(r.len(), 6);
        let limit = r[5];
        assert!((limit.error - 0.2).abs() < 1e-12);
        assert_eq!(limit.upper, 0.0);
    }

    #[test]
    fn test_links_and_global_matrices() {
        let a = BodyId::new(1, 0);
        let b = BodyId::new(2, 0);
        let joint = Joint::new(
            JointKind::Ball,
            a,
            Some(b),
            Frame::from_position(DVec3::X),
            Frame::from_position(-DVec3::X),
        );
        assert!(joint.links(b, a));
        let (m0, m1) = joint.global_matrices(&Frame::IDENTITY, Some(&Frame::from_position(DVec3::new(2.0, 0.0, 0.0))));
        assert_eq!(m0.position, m1.position);
        assert!(!joint.collision_enabled());
    }
}
