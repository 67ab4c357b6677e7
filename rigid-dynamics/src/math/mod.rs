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
//! Math and numeric primitives
//!
//! Vectors, quaternions and 3x3 matrices come from `glam` in double
//! precision. This module adds the rigid [`Frame`] transform used for body
//! and shape placement plus the few numeric kernels the solver and shape
//! code need: Gaussian elimination, orthonormal bases, polar decomposition
//! and vertex welding.

mod polar;
mod vertex;

pub use glam::{DMat3, DQuat, DVec3};
pub use polar::{jacobi_eigen, polar_decomposition};
pub use vertex::vertex_list_to_index_list;

use std::ops::Mul;

/// Degrees to radians
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Rigid transform made of a unit rotation and a translation
///
/// A point `p` expressed in the frame's local space maps to
/// `rotation * p + position` in the parent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Orientation, always kept at unit length
    pub rotation: DQuat,
    /// Origin of the frame in parent space
    pub position: DVec3,
}

impl Frame {
    /// The identity transform
    pub const IDENTITY: Frame = Frame {
        rotation: DQuat::IDENTITY,
        position: DVec3::ZERO,
    };

    /// Create a frame from a rotation and a position
    pub fn new(rotation: DQuat, position: DVec3) -> Self {
        Frame { rotation, position }
    }

    /// Create a translation-only frame
    pub fn from_position(position: DVec3) -> Self {
        Frame {
            rotation: DQuat::IDENTITY,
            position,
        }
    }

    /// Create a rotation-only frame
    pub fn from_rotation(rotation: DQuat) -> Self {
        Frame {
            rotation,
            position: DVec3::ZERO,
        }
    }

    /// Map a local point into parent space
    #[inline]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.position
    }

    /// Map a parent-space point into local space
    #[inline]
    pub fn untransform_point(&self, p: DVec3) -> DVec3 {
        self.rotation.inverse() * (p - self.position)
    }

    /// Rotate a local direction into parent space
    #[inline]
    pub fn rotate_vector(&self, v: DVec3) -> DVec3 {
        self.rotation * v
    }

    /// Rotate a parent-space direction into local space
    #[inline]
    pub fn unrotate_vector(&self, v: DVec3) -> DVec3 {
        self.rotation.inverse() * v
    }

    /// Inverse transform
    pub fn inverse(&self) -> Frame {
        let inv = self.rotation.inverse();
        Frame {
            rotation: inv,
            position: -(inv * self.position),
        }
    }

    /// Rotation part as a matrix whose columns are the local axes
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.rotation)
    }

    /// Check that every component is finite
    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.position.is_finite()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::IDENTITY
    }
}

/// `a * b` applies `b` first, then `a`.
impl Mul for Frame {
    type Output = Frame;

    fn mul(self, rhs: Frame) -> Frame {
        Frame {
            rotation: (self.rotation * rhs.rotation).normalize(),
            position: self.transform_point(rhs.position),
        }
    }
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting
///
/// A singular pivot leaves the corresponding unknown at zero rather than
/// producing infinities.
pub fn solve_gaussian(a: DMat3, b: DVec3) -> DVec3 {
    // row-major working copy
    let mut m = [
        [a.x_axis.x, a.y_axis.x, a.z_axis.x, b.x],
        [a.x_axis.y, a.y_axis.y, a.z_axis.y, b.y],
        [a.x_axis.z, a.y_axis.z, a.z_axis.z, b.z],
    ];

    for col in 0..3 {
        let mut pivot = col;
        for row in col + 1..3 {
            if m[row][col].abs() > m[pivot][col].abs() {
                pivot = row;
            }
        }
        m.swap(col, pivot);

        let diag = m[col][col];
        if diag.abs() < 1.0e-12 {
            continue;
        }
        for row in col + 1..3 {
            let factor = m[row][col] / diag;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let diag = m[row][row];
        if diag.abs() < 1.0e-12 {
            continue;
        }
        let mut acc = m[row][3];
        for k in row + 1..3 {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / diag;
    }
    DVec3::new(x[0], x[1], x[2])
}

/// Build two unit tangents orthogonal to `n` and to each other
pub fn orthonormal_basis(n: DVec3) -> (DVec3, DVec3) {
    let t0 = if n.x.abs() > 0.577 {
        DVec3::new(n.y, -n.x, 0.0)
    } else {
        DVec3::new(0.0, n.z, -n.y)
    }
    .normalize();
    let t1 = n.cross(t0);
    (t0, t1)
}

/// Diagonal of a matrix
#[inline]
pub fn diagonal(m: &DMat3) -> DVec3 {
    DVec3::new(m.x_axis.x, m.y_axis.y, m.z_axis.z)
}

/// Truncate a double to single-precision mantissa while keeping its exponent
pub fn round_to_float(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let exp = value.abs().log2().floor() as i32 + 1;
    let mantissa = value / 2f64.powi(exp);
    let power = (1u32 << 23) as f64;
    let mantissa = (mantissa * power).floor() / power;
    mantissa * 2f64.powi(exp)
}

/// Check whether a rotation matrix is the identity within `tolerance`
pub fn is_identity(m: &DMat3, tolerance: f64) -> bool {
    m.abs_diff_eq(DMat3::IDENTITY, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let frame = Frame::new(
            DQuat::from_axis_angle(DVec3::new(1.0, 2.0, 3.0).normalize(), 0.7),
            DVec3::new(4.0, -1.0, 2.0),
        );
        let p = DVec3::new(0.3, -2.0, 5.0);
        let q = frame.untransform_point(frame.transform_point(p));
        assert!((p - q).length() < 1e-12);

        let composed = frame * frame.inverse();
        assert!(composed.position.length() < 1e-12);
        assert!(composed.rotation.abs_diff_eq(DQuat::IDENTITY, 1e-12));
    }

    #[test]
    fn test_solve_gaussian_matches_inverse() {
        let a = DMat3::from_cols(
            DVec3::new(4.0, 1.0, 0.5),
            DVec3::new(0.2, 3.0, -1.0),
            DVec3::new(1.0, 0.0, 5.0),
        );
        let b = DVec3::new(1.0, -2.0, 3.0);
        let x = solve_gaussian(a, b);
        assert!((a * x - b).length() < 1e-10);
    }

    #[test]
    fn test_solve_gaussian_needs_pivoting() {
        let a = DMat3::from_cols(
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, 2.0),
        );
        let b = DVec3::new(3.0, 5.0, 4.0);
        let x = solve_gaussian(a, b);
        assert!((x - DVec3::new(5.0, 3.0, 2.0)).length() < 1e-12);
    }

    #[test]
    fn test_orthonormal_basis() {
        for n in [DVec3::X, DVec3::Y, DVec3::new(1.0, 1.0, 1.0).normalize()] {
            let (t0, t1) = orthonormal_basis(n);
            assert!(t0.dot(n).abs() < 1e-12);
            assert!(t1.dot(n).abs() < 1e-12);
            assert!(t0.dot(t1).abs() < 1e-12);
            assert!((t0.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_round_to_float() {
        let v = 0.1f64;
        let r = round_to_float(v);
        assert!((r - v).abs() < 1e-7);
        assert!(r <= v);
        assert_eq!(round_to_float(0.0), 0.0);
        assert_eq!(round_to_float(1.0), 1.0);
    }
}
