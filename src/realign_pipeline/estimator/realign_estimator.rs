use nalgebra::Matrix4;

use crate::realign_pipeline::common::error::Result;
use crate::realign_pipeline::estimator::types::EstimatorConfig;
use crate::realign_pipeline::volume::VolumeSeries;

pub trait RealignEstimator {
    /// Returns one updated voxel-to-world affine per volume, in input order.
    fn estimate(&self, series: &VolumeSeries, config: &EstimatorConfig) -> Result<Vec<Matrix4<f64>>>;
}
