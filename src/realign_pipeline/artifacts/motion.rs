use nalgebra::Matrix4;
use tracing::{info, instrument};

use crate::realign_pipeline::artifacts::matrix_stack::MatrixStack;
use crate::realign_pipeline::artifacts::params_file::write_parameters;
use crate::realign_pipeline::common::error::{RealignError, Result};
use crate::realign_pipeline::options::ResolvedOutputs;
use crate::realign_pipeline::transform::{MotionParameters, world_to_world};

/// Per-timepoint transforms and motion parameters of one realignment, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEstimate {
    /// Estimated voxel-to-world affines
    pub voxel_to_world: Vec<Matrix4<f64>>,
    /// Corrections with `world_to_world[t] · original[t] = voxel_to_world[t]`
    pub world_to_world: Vec<Matrix4<f64>>,
    pub parameters: Vec<MotionParameters>,
}

impl MotionEstimate {
    pub fn derive(original: &[Matrix4<f64>], estimated: Vec<Matrix4<f64>>) -> Result<Self> {
        if original.len() != estimated.len() {
            return Err(RealignError::Estimator(format!(
                "estimator returned {} affines for {} volumes",
                estimated.len(),
                original.len()
            )));
        }

        let world_to_world = estimated
            .iter()
            .zip(original)
            .map(|(estimated, original)| world_to_world(estimated, original))
            .collect::<Result<Vec<_>>>()?;
        let parameters = world_to_world
            .iter()
            .map(MotionParameters::from_world_to_world)
            .collect();

        Ok(Self {
            voxel_to_world: estimated,
            world_to_world,
            parameters,
        })
    }

    pub fn len(&self) -> usize {
        self.voxel_to_world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_to_world.is_empty()
    }

    /// Writes every artifact that is not skipped in `outputs`.
    #[instrument(skip_all, fields(timepoints = self.len()))]
    pub fn write(&self, outputs: &ResolvedOutputs) -> Result<()> {
        if let Some(path) = &outputs.params {
            write_parameters(path, &self.parameters)?;
            info!(path = %path.display(), "Wrote motion parameters");
        }
        if let Some(path) = &outputs.world_to_world {
            MatrixStack::from_matrices(&self.world_to_world).write_json(path)?;
            info!(path = %path.display(), "Wrote world-to-world matrices");
        }
        if let Some(path) = &outputs.voxel_to_world {
            MatrixStack::from_matrices(&self.voxel_to_world).write_json(path)?;
            info!(path = %path.display(), "Wrote voxel-to-world matrices");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realign_pipeline::artifacts::read_parameters;
    use crate::realign_pipeline::transform::rigid_matrix;
    use approx::assert_relative_eq;

    fn original() -> Matrix4<f64> {
        Matrix4::new(
            3.0, 0.0, 0.0, -90.0,
            0.0, 3.0, 0.0, -126.0,
            0.0, 0.0, 3.5, -72.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[test]
    fn test_world_to_world_times_original_is_estimated() {
        let corrections = [
            Matrix4::identity(),
            rigid_matrix(&[2.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            rigid_matrix(&[0.3, -1.0, 0.5, 0.01, -0.02, 0.015]),
        ];
        let originals = vec![original(); 3];
        let estimated: Vec<_> = corrections.iter().map(|c| c * original()).collect();

        let motion = MotionEstimate::derive(&originals, estimated.clone()).unwrap();

        assert_eq!(motion.len(), 3);
        for t in 0..3 {
            assert_relative_eq!(motion.world_to_world[t] * originals[t], estimated[t], epsilon = 1e-9);
        }
        assert_relative_eq!(motion.parameters[1].translation[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(motion.parameters[0].row()[0], 0.0);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let result = MotionEstimate::derive(&[original(); 2], vec![original()]);
        assert!(matches!(result, Err(RealignError::Estimator(_))));
    }

    #[test]
    fn test_write_honours_skipped_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let motion = MotionEstimate::derive(&[original(); 2], vec![original(); 2]).unwrap();
        let outputs = ResolvedOutputs {
            params: Some(dir.path().join("rp.txt")),
            world_to_world: None,
            voxel_to_world: Some(dir.path().join("v2w.json")),
        };

        motion.write(&outputs).unwrap();

        assert_eq!(read_parameters(&dir.path().join("rp.txt")).unwrap().len(), 2);
        assert_eq!(
            MatrixStack::read_json(&dir.path().join("v2w.json")).unwrap().len(),
            2
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
