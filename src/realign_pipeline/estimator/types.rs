//! Estimator configuration

use crate::realign_pipeline::options::RealignOptions;

/// Iteration cap per volume and pass.
pub const DEFAULT_MAX_ITERATIONS: usize = 64;
/// Relative decrease of the mean squared residual below which iteration stops.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Settings handed to a [`RealignEstimator`](super::RealignEstimator).
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub quality: f64,
    /// FWHM in mm
    pub fwhm: f64,
    /// Sample spacing in mm
    pub sep: f64,
    pub rtm: bool,
    pub wrap: [bool; 3],
    /// B-spline degree, 1..=7
    pub interp: u8,
    /// Report per-volume progress at info level instead of debug
    pub progress: bool,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl From<&RealignOptions> for EstimatorConfig {
    fn from(options: &RealignOptions) -> Self {
        Self {
            quality: options.quality,
            fwhm: options.fwhm,
            sep: options.sep,
            rtm: options.rtm,
            wrap: options.wrap,
            interp: options.interp,
            progress: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::from(&RealignOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_options_drops_test_flag_and_progress() {
        let options = RealignOptions::builder()
            .quality(0.7)
            .rtm(false)
            .wrap([true, false, false])
            .interp(4)
            .test(true)
            .build();

        let config = EstimatorConfig::from(&options);

        assert_eq!(config.quality, 0.7);
        assert!(!config.rtm);
        assert_eq!(config.wrap, [true, false, false]);
        assert_eq!(config.interp, 4);
        assert!(!config.progress);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
