//! Volume series types

use nalgebra::{Matrix4, Vector3};
use ndarray::{Array4, ArrayView3, Axis};

use crate::realign_pipeline::common::error::{RealignError, Result};

/// A time series of 3D volumes
#[derive(Debug, Clone)]
pub struct VolumeSeries {
    /// Intensities indexed `[x, y, z, t]`
    data: Array4<f32>,
    /// Voxel-to-world affine of each volume, in time order
    affines: Vec<Matrix4<f64>>,
}

impl VolumeSeries {
    /// Builds a series whose volumes all share `affine`.
    pub fn new(data: Array4<f32>, affine: Matrix4<f64>) -> Result<Self> {
        let count = data.len_of(Axis(3));
        Self::with_affines(data, vec![affine; count])
    }

    pub fn with_affines(data: Array4<f32>, affines: Vec<Matrix4<f64>>) -> Result<Self> {
        let shape = data.shape();
        if shape.iter().any(|&d| d == 0) {
            return Err(RealignError::InvalidArgument(format!(
                "volume series has an empty dimension: {:?}",
                shape
            )));
        }
        if affines.len() != shape[3] {
            return Err(RealignError::InvalidArgument(format!(
                "expected {} affines, got {}",
                shape[3],
                affines.len()
            )));
        }
        Ok(Self { data, affines })
    }

    /// Spatial dimensions `[nx, ny, nz]`.
    pub fn dims(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Number of timepoints.
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn frame(&self, t: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(3), t)
    }

    pub fn affine(&self, t: usize) -> &Matrix4<f64> {
        &self.affines[t]
    }

    pub fn affines(&self) -> &[Matrix4<f64>] {
        &self.affines
    }

    /// Voxel edge lengths in mm, from the column norms of the affine of volume `t`.
    pub fn voxel_size(&self, t: usize) -> Vector3<f64> {
        let affine = &self.affines[t];
        Vector3::new(
            affine.fixed_view::<3, 1>(0, 0).norm(),
            affine.fixed_view::<3, 1>(0, 1).norm(),
            affine.fixed_view::<3, 1>(0, 2).norm(),
        )
    }

    /// True when every volume carries the same affine.
    pub fn has_uniform_affine(&self) -> bool {
        self.affines.windows(2).all(|pair| pair[0] == pair[1])
    }
}
