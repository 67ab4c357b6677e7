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
//! Symmetric eigen-decomposition and polar decomposition

use glam::{DMat3, DVec3};

const MAX_SWEEPS: usize = 32;

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations
///
/// Returns `(eigenvalues, eigenvectors)` where the eigenvectors are the
/// columns of the returned matrix and form a proper rotation
/// (determinant +1). A diagonal input is returned untouched.
pub fn jacobi_eigen(m: DMat3) -> (DVec3, DMat3) {
    let mut a = m.to_cols_array_2d();
    let mut v = DMat3::IDENTITY.to_cols_array_2d();

    for _ in 0..MAX_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off < 1.0e-24 {
            break;
        }
        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            if a[p][q].abs() < 1.0e-30 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // A' = J^T A J with J the (p, q) plane rotation
            for k in 0..3 {
                let akp = a[k][p];
                let akq = a[k][q];
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let apk = a[p][k];
                let aqk = a[q][k];
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let vp = row[p];
                let vq = row[q];
                row[p] = c * vp - s * vq;
                row[q] = s * vp + c * vq;
            }
        }
    }

    // v was accumulated as rows of the transposed basis
    let mut vectors = DMat3::from_cols_array_2d(&v).transpose();
    if vectors.determinant() < 0.0 {
        vectors.z_axis = -vectors.z_axis;
    }
    (DVec3::new(a[0][0], a[1][1], a[2][2]), vectors)
}

/// Polar decomposition of a linear map with positive determinant
///
/// Returns `(local, scale, alignment)` such that
/// `m == local * DMat3::from_diagonal(scale) * alignment`, where `local` and
/// `alignment` are proper rotations and every scale component is positive.
pub fn polar_decomposition(m: DMat3) -> (DMat3, DVec3, DMat3) {
    let (eigenvalues, vectors) = jacobi_eigen(m.transpose() * m);
    let scale = DVec3::new(
        eigenvalues.x.max(0.0).sqrt(),
        eigenvalues.y.max(0.0).sqrt(),
        eigenvalues.z.max(0.0).sqrt(),
    );
    let inv_scale = DVec3::new(
        if scale.x > 1.0e-12 { 1.0 / scale.x } else { 0.0 },
        if scale.y > 1.0e-12 { 1.0 / scale.y } else { 0.0 },
        if scale.z > 1.0e-12 { 1.0 / scale.z } else { 0.0 },
    );
    let local = m * vectors * DMat3::from_diagonal(inv_scale);
    (local, scale, vectors.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    fn reconstruct(local: DMat3, scale: DVec3, alignment: DMat3) -> DMat3 {
        local * DMat3::from_diagonal(scale) * alignment
    }

    #[test]
    fn test_jacobi_diagonal_is_untouched() {
        let (values, vectors) = jacobi_eigen(DMat3::from_diagonal(DVec3::new(4.0, 9.0, 16.0)));
        assert_eq!(values, DVec3::new(4.0, 9.0, 16.0));
        assert_eq!(vectors, DMat3::IDENTITY);
    }

    #[test]
    fn test_jacobi_reconstructs_symmetric() {
        let r = DMat3::from_quat(DQuat::from_axis_angle(DVec3::new(1.0, -2.0, 0.5).normalize(), 0.9));
        let m = r * DMat3::from_diagonal(DVec3::new(1.0, 2.0, 3.0)) * r.transpose();
        let (values, vectors) = jacobi_eigen(m);
        let back = vectors * DMat3::from_diagonal(values) * vectors.transpose();
        assert!(back.abs_diff_eq(m, 1e-9));
    }

    #[test]
    fn test_polar_of_rotated_stretch() {
        let local = DMat3::from_quat(DQuat::from_rotation_y(0.4));
        let align = DMat3::from_quat(DQuat::from_rotation_x(-0.3));
        let m = local * DMat3::from_diagonal(DVec3::new(2.0, 3.0, 0.5)) * align;
        let (l, s, a) = polar_decomposition(m);
        assert!(reconstruct(l, s, a).abs_diff_eq(m, 1e-9));
        assert!((l.determinant() - 1.0).abs() < 1e-9);
        assert!((a.determinant() - 1.0).abs() < 1e-9);
        assert!(s.min_element() > 0.0);
    }

    #[test]
    fn test_polar_of_axis_scale_has_identity_alignment() {
        let m = DMat3::from_diagonal(DVec3::new(2.0, 3.0, 4.0));
        let (l, s, a) = polar_decomposition(m);
        assert_eq!(s, DVec3::new(2.0, 3.0, 4.0));
        assert!(a.abs_diff_eq(DMat3::IDENTITY, 1e-12));
        assert!(l.abs_diff_eq(DMat3::IDENTITY, 1e-12));
    }
}
