//! Least-squares rigid-body realignment.
//!
//! Every volume is smoothed and converted to B-spline coefficients once. A
//! grid of reference points spaced `sep` mm apart is drawn from the reference
//! volume, and the `quality` fraction of those points with the steepest
//! intensity gradient is kept. For each source volume a Gauss-Newton solver
//! then fits the six rigid parameters of a world-space correction `W`, plus an
//! intensity scale, minimising
//!
//! ```text
//! sum_i ( F(V_src⁻¹ · W⁻¹ · V_ref · x_i) - s · G(x_i) )²
//! ```
//!
//! where `F` is the source volume, `G` the reference, `V` the voxel-to-world
//! affines and `x_i` the sample points. The updated voxel-to-world affine of
//! the source is `W · V_src`.
//!
//! The first pass uses the first volume as reference. With register-to-mean
//! enabled, a second pass realigns every volume to the mean of the series
//! resliced with the first-pass corrections.

use nalgebra::{Matrix4, SMatrix, SVector, Vector3, Vector4};
use ndarray::{Array3, ArrayView3};
use tracing::{debug, info, instrument, trace};

use crate::realign_pipeline::common::error::{RealignError, Result};
use crate::realign_pipeline::estimator::bspline::BSplineVolume;
use crate::realign_pipeline::estimator::realign_estimator::RealignEstimator;
use crate::realign_pipeline::estimator::smoothing::{fwhm_to_sigma, smooth};
use crate::realign_pipeline::estimator::types::EstimatorConfig;
use crate::realign_pipeline::options::types::{MAX_INTERP_DEGREE, MIN_INTERP_DEGREE};
use crate::realign_pipeline::transform::{decompose_rigid, rigid_matrix};
use crate::realign_pipeline::volume::VolumeSeries;

/// Fewest usable sample points a fit may rest on.
const MIN_SAMPLE_POINTS: usize = 32;
/// Step for the central differences of the voxel mapping with respect to each parameter.
const PARAMETER_DELTA: f64 = 1e-4;
/// Parameter updates smaller than this end the iteration.
const MIN_STEP_NORM: f64 = 1e-10;
/// A normal-matrix diagonal entry this small relative to the largest marks a parameter
/// the data cannot constrain.
const SINGULAR_RATIO: f64 = 1e-12;

type NormalMatrix = SMatrix<f64, 7, 7>;
type ParameterVector = SVector<f64, 7>;

/// Gauss-Newton rigid-body estimator over B-spline interpolated volumes.
pub struct RigidEstimator;

/// Reference sample points and their intensities.
struct ReferenceSamples {
    /// Homogeneous voxel coordinates in the reference grid
    points: Vec<Vector4<f64>>,
    values: Vec<f64>,
    affine: Matrix4<f64>,
}

impl ReferenceSamples {
    fn new(reference: &BSplineVolume, affine: &Matrix4<f64>, config: &EstimatorConfig) -> Result<Self> {
        let voxel = voxel_size(affine);
        let dims = reference.dims();
        let steps = [0, 1, 2].map(|a| config.sep / voxel[a]);
        let counts = [0, 1, 2].map(|a| ((dims[a] - 1) as f64 / steps[a]).floor() as usize + 1);

        let mut candidates = Vec::with_capacity(counts.iter().product());
        for k in 0..counts[2] {
            for j in 0..counts[1] {
                for i in 0..counts[0] {
                    let point = Vector3::new(
                        i as f64 * steps[0],
                        j as f64 * steps[1],
                        k as f64 * steps[2],
                    );
                    let (value, gradient) = reference.sample_with_gradient(&point);
                    let gradient_mm = gradient.component_div(&voxel).norm();
                    candidates.push((gradient_mm, point, value));
                }
            }
        }

        let keep = ((candidates.len() as f64) * config.quality).ceil() as usize;
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(keep);

        if candidates.len() < MIN_SAMPLE_POINTS {
            return Err(RealignError::Estimator(format!(
                "only {} sample points available, need at least {}; reduce sep or raise quality",
                candidates.len(),
                MIN_SAMPLE_POINTS
            )));
        }

        debug!("Sampling reference at {} points", candidates.len());

        let (points, values): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .map(|(_, p, value)| (Vector4::new(p.x, p.y, p.z, 1.0), value))
            .unzip();

        Ok(Self {
            points,
            values,
            affine: *affine,
        })
    }
}

fn voxel_size(affine: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(
        affine.fixed_view::<3, 1>(0, 0).norm(),
        affine.fixed_view::<3, 1>(0, 1).norm(),
        affine.fixed_view::<3, 1>(0, 2).norm(),
    )
}

fn invert(matrix: &Matrix4<f64>, what: &str) -> Result<Matrix4<f64>> {
    matrix
        .try_inverse()
        .ok_or_else(|| RealignError::Estimator(format!("{} is singular", what)))
}

/// Intensities as `f64`, with non-finite values (masked background) set to zero.
fn finite_intensities(frame: ArrayView3<'_, f32>) -> Array3<f64> {
    frame.mapv(|v| if v.is_finite() { v as f64 } else { 0.0 })
}

/// Logs at info level when progress reporting is on, debug otherwise.
fn report(config: &EstimatorConfig, message: std::fmt::Arguments<'_>) {
    if config.progress {
        info!("{}", message);
    } else {
        debug!("{}", message);
    }
}

impl RigidEstimator {
    fn prepare(&self, volume: Array3<f64>, affine: &Matrix4<f64>, config: &EstimatorConfig) -> BSplineVolume {
        let sigma = fwhm_to_sigma(config.fwhm, &voxel_size(affine));
        BSplineVolume::new(smooth(volume, sigma, config.wrap), config.interp, config.wrap)
    }

    /// Fits the world-space correction that brings `source` onto `reference`.
    fn register(
        &self,
        reference: &ReferenceSamples,
        source: &BSplineVolume,
        source_affine: &Matrix4<f64>,
        initial: &Matrix4<f64>,
        config: &EstimatorConfig,
    ) -> Result<Matrix4<f64>> {
        let source_inverse = invert(source_affine, "source voxel-to-world affine")?;
        let mapping = |params: &[f64; 6]| -> Result<Matrix4<f64>> {
            let correction_inverse = invert(&rigid_matrix(params), "rigid correction")?;
            Ok(source_inverse * correction_inverse * reference.affine)
        };

        let mut params = decompose_rigid(initial).to_array();
        let mut scale = 1.0;
        let mut previous_mse: Option<f64> = None;

        for iteration in 0..config.max_iterations {
            let current = mapping(&params)?;
            let mut derivatives = [Matrix4::zeros(); 6];
            for (k, derivative) in derivatives.iter_mut().enumerate() {
                let mut forward = params;
                let mut backward = params;
                forward[k] += PARAMETER_DELTA;
                backward[k] -= PARAMETER_DELTA;
                *derivative = (mapping(&forward)? - mapping(&backward)?) / (2.0 * PARAMETER_DELTA);
            }

            let mut normal = NormalMatrix::zeros();
            let mut gradient = ParameterVector::zeros();
            let mut sum_squares = 0.0;
            let mut used = 0usize;

            for (point, &target) in reference.points.iter().zip(&reference.values) {
                let voxel = (current * point).xyz();
                if !source.contains(&voxel) {
                    continue;
                }

                let (value, image_gradient) = source.sample_with_gradient(&voxel);
                let residual = value - scale * target;

                let mut row = ParameterVector::zeros();
                for (k, derivative) in derivatives.iter().enumerate() {
                    row[k] = image_gradient.dot(&(derivative * point).xyz());
                }
                row[6] = -target;

                normal += row * row.transpose();
                gradient += row * residual;
                sum_squares += residual * residual;
                used += 1;
            }

            if used < MIN_SAMPLE_POINTS {
                return Err(RealignError::Estimator(format!(
                    "only {} sample points overlap the source volume",
                    used
                )));
            }

            let mse = sum_squares / used as f64;
            let diagonal = normal.diagonal();
            let largest = diagonal.max();
            if diagonal.iter().any(|&d| d <= largest * SINGULAR_RATIO) {
                return Err(RealignError::Estimator(
                    "normal equations are singular; the volume has too little contrast".to_string(),
                ));
            }
            let step = normal
                .cholesky()
                .ok_or_else(|| {
                    RealignError::Estimator(
                        "normal equations are singular; the volume has too little contrast".to_string(),
                    )
                })?
                .solve(&(-gradient));

            for (k, param) in params.iter_mut().enumerate() {
                *param += step[k];
            }
            scale += step[6];

            trace!(iteration, mse, points = used, "Gauss-Newton step");

            let converged = previous_mse
                .is_some_and(|previous| (previous - mse).abs() <= config.tolerance * previous);
            if converged || step.norm() < MIN_STEP_NORM {
                break;
            }
            previous_mse = Some(mse);
        }

        Ok(rigid_matrix(&params))
    }

    /// Mean of all volumes resliced into the grid of the first one with their corrections.
    fn mean_volume(
        &self,
        series: &VolumeSeries,
        corrections: &[Matrix4<f64>],
        config: &EstimatorConfig,
    ) -> Result<Array3<f64>> {
        let dims = series.dims();
        let mut sum = Array3::<f64>::zeros((dims[0], dims[1], dims[2]));
        let mut hits = Array3::<u32>::zeros((dims[0], dims[1], dims[2]));
        let reference_affine = series.affine(0);

        for (t, correction) in corrections.iter().enumerate() {
            let volume = BSplineVolume::new(finite_intensities(series.frame(t)), config.interp, config.wrap);
            let mapping = invert(series.affine(t), "source voxel-to-world affine")?
                * invert(correction, "rigid correction")?
                * reference_affine;

            for ((x, y, z), total) in sum.indexed_iter_mut() {
                let voxel = (mapping * Vector4::new(x as f64, y as f64, z as f64, 1.0)).xyz();
                if volume.contains(&voxel) {
                    *total += volume.sample(&voxel);
                    hits[[x, y, z]] += 1;
                }
            }
        }

        sum.zip_mut_with(&hits, |total, &count| {
            *total = if count > 0 { *total / count as f64 } else { 0.0 };
        });
        Ok(sum)
    }
}

impl RealignEstimator for RigidEstimator {
    #[instrument(skip_all, fields(volumes = series.len(), rtm = config.rtm))]
    fn estimate(&self, series: &VolumeSeries, config: &EstimatorConfig) -> Result<Vec<Matrix4<f64>>> {
        if series.is_empty() {
            return Err(RealignError::Estimator("volume series is empty".to_string()));
        }
        if !(MIN_INTERP_DEGREE..=MAX_INTERP_DEGREE).contains(&config.interp) {
            return Err(RealignError::Estimator(format!(
                "unsupported interpolation degree {}",
                config.interp
            )));
        }

        let count = series.len();
        if count == 1 {
            return Ok(series.affines().to_vec());
        }
        let mut corrections = vec![Matrix4::identity(); count];

        let volumes: Vec<BSplineVolume> = {
            let _span = tracing::info_span!("prepare_volumes").entered();
            (0..count)
                .map(|t| self.prepare(finite_intensities(series.frame(t)), series.affine(t), config))
                .collect()
        };

        {
            let _span = tracing::info_span!("register_to_first").entered();
            let reference = ReferenceSamples::new(&volumes[0], series.affine(0), config)?;
            for t in 1..count {
                corrections[t] =
                    self.register(&reference, &volumes[t], series.affine(t), &Matrix4::identity(), config)?;
                report(config, format_args!("Registered volume {}/{} to first", t + 1, count));
            }
        }

        if config.rtm {
            let _span = tracing::info_span!("register_to_mean").entered();
            let mean = self.mean_volume(series, &corrections, config)?;
            let mean = self.prepare(mean, series.affine(0), config);
            let reference = ReferenceSamples::new(&mean, series.affine(0), config)?;
            for t in 0..count {
                corrections[t] =
                    self.register(&reference, &volumes[t], series.affine(t), &corrections[t], config)?;
                report(config, format_args!("Registered volume {}/{} to mean", t + 1, count));
            }
        }

        Ok(corrections
            .iter()
            .zip(series.affines())
            .map(|(correction, affine)| correction * affine)
            .collect())
    }
}
