//! Rigid-body transform helpers
//!
//! Rigid parameters are `[tx, ty, tz, rx, ry, rz]`: translations in mm and
//! rotations in radians about the x (pitch), y (roll) and z (yaw) axes. The
//! matrix is composed as `T · Rx · Ry · Rz`.
//!
//! All three rotations are right-handed: a positive angle turns the next axis
//! towards the one after it (yaw takes +x towards +y). SPM's `spm_matrix`
//! writes its x and z rotations transposed, so its pitch and yaw columns carry
//! the opposite sign of ours for the same motion; roll and translations agree.

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::realign_pipeline::common::error::{RealignError, Result};

/// Below this |cos(ry)| the x and z rotations are not separable.
const GIMBAL_EPSILON: f64 = 1e-9;

/// Translation and per-axis rotation extracted from a rigid matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidParameters {
    /// Translation in mm
    pub translation: Vector3<f64>,
    /// Rotation about x, y, z in radians
    pub rotation: Vector3<f64>,
}

impl RigidParameters {
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.translation.x,
            self.translation.y,
            self.translation.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        ]
    }
}

fn rotation_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, c, -s,
        0.0, s, c,
    )
}

fn rotation_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, 0.0, s,
        0.0, 1.0, 0.0,
        -s, 0.0, c,
    )
}

fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, -s, 0.0,
        s, c, 0.0,
        0.0, 0.0, 1.0,
    )
}

/// Builds the 4×4 rigid matrix for `[tx, ty, tz, rx, ry, rz]`.
pub fn rigid_matrix(params: &[f64; 6]) -> Matrix4<f64> {
    let rotation = rotation_x(params[3]) * rotation_y(params[4]) * rotation_z(params[5]);

    let mut matrix = Matrix4::identity();
    matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    matrix[(0, 3)] = params[0];
    matrix[(1, 3)] = params[1];
    matrix[(2, 3)] = params[2];
    matrix
}

/// Inverse of [`rigid_matrix`] for a matrix with an orthonormal rotation block.
pub fn decompose_rigid(matrix: &Matrix4<f64>) -> RigidParameters {
    let r = matrix.fixed_view::<3, 3>(0, 0);

    let ry = r[(0, 2)].clamp(-1.0, 1.0).asin();
    let (rx, rz) = if ry.cos().abs() > GIMBAL_EPSILON {
        ((-r[(1, 2)]).atan2(r[(2, 2)]), (-r[(0, 1)]).atan2(r[(0, 0)]))
    } else {
        (r[(2, 1)].atan2(r[(1, 1)]), 0.0)
    };

    RigidParameters {
        translation: Vector3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]),
        rotation: Vector3::new(rx, ry, rz),
    }
}

/// World-to-world correction `estimated · original⁻¹`, so that
/// `world_to_world(estimated, original) · original == estimated`.
pub fn world_to_world(estimated: &Matrix4<f64>, original: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    let inverse = original.try_inverse().ok_or_else(|| {
        RealignError::Transform("original voxel-to-world affine is singular".to_string())
    })?;
    Ok(estimated * inverse)
}

/// Motion parameters of one timepoint in the order written to the parameter file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParameters {
    /// Translation x, y, z in mm
    pub translation: [f64; 3],
    /// Yaw (z), roll (y), pitch (x) in degrees
    pub rotation: [f64; 3],
}

impl MotionParameters {
    pub fn from_world_to_world(matrix: &Matrix4<f64>) -> Self {
        let rigid = decompose_rigid(matrix);
        Self {
            translation: [rigid.translation.x, rigid.translation.y, rigid.translation.z],
            rotation: [
                rigid.rotation.z.to_degrees(),
                rigid.rotation.y.to_degrees(),
                rigid.rotation.x.to_degrees(),
            ],
        }
    }

    /// `[tx, ty, tz, yaw, roll, pitch]`
    pub fn row(&self) -> [f64; 6] {
        [
            self.translation[0],
            self.translation[1],
            self.translation[2],
            self.rotation[0],
            self.rotation[1],
            self.rotation[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_identity_decomposes_to_zero() {
        let params = decompose_rigid(&Matrix4::identity());

        assert_relative_eq!(params.translation, Vector3::zeros());
        assert_relative_eq!(params.rotation, Vector3::zeros());
    }

    #[test]
    fn test_decompose_recovers_composed_parameters() {
        let expected = [1.5, -2.0, 0.25, 0.05, -0.12, 0.3];
        let params = decompose_rigid(&rigid_matrix(&expected)).to_array();

        for (got, want) in params.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_decompose_at_gimbal_lock_reproduces_matrix() {
        let matrix = rigid_matrix(&[0.0, 0.0, 0.0, 0.4, std::f64::consts::FRAC_PI_2, 0.0]);
        let params = decompose_rigid(&matrix).to_array();

        assert_relative_eq!(rigid_matrix(&params), matrix, epsilon = 1e-9);
    }

    #[test]
    fn test_world_to_world_recovers_estimated_affine() {
        let original = Matrix4::new(
            3.0, 0.0, 0.0, -90.0,
            0.0, 3.0, 0.0, -126.0,
            0.0, 0.0, 3.5, -72.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let correction = rigid_matrix(&[2.0, 0.5, -1.0, 0.01, 0.02, -0.03]);
        let estimated = correction * original;

        let w2w = world_to_world(&estimated, &original).unwrap();

        assert_relative_eq!(w2w, correction, epsilon = 1e-9);
        assert_relative_eq!(w2w * original, estimated, epsilon = 1e-9);
    }

    #[test]
    fn test_world_to_world_rejects_singular_original() {
        let result = world_to_world(&Matrix4::identity(), &Matrix4::zeros());
        assert!(matches!(result, Err(RealignError::Transform(_))));
    }

    #[test]
    fn test_motion_parameters_reorder_to_yaw_roll_pitch_degrees() {
        let pitch = 1.0_f64.to_radians();
        let roll = 2.0_f64.to_radians();
        let yaw = 3.0_f64.to_radians();
        let motion = MotionParameters::from_world_to_world(&rigid_matrix(&[
            2.0, 0.0, -1.0, pitch, roll, yaw,
        ]));

        let row = motion.row();
        assert_relative_eq!(row[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(row[2], -1.0, epsilon = 1e-12);
        assert_relative_eq!(row[3], 3.0, epsilon = 1e-9);
        assert_relative_eq!(row[4], 2.0, epsilon = 1e-9);
        assert_relative_eq!(row[5], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotations_are_right_handed() {
        let quarter = std::f64::consts::FRAC_PI_2;
        let x = Vector4::new(1.0, 0.0, 0.0, 1.0);
        let y = Vector4::new(0.0, 1.0, 0.0, 1.0);

        let yawed = rigid_matrix(&[0.0, 0.0, 0.0, 0.0, 0.0, quarter]) * x;
        let pitched = rigid_matrix(&[0.0, 0.0, 0.0, quarter, 0.0, 0.0]) * y;

        assert_relative_eq!(yawed, Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(pitched, Vector4::new(0.0, 0.0, 1.0, 1.0), epsilon = 1e-12);
    }
}
