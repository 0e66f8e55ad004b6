//! Rigid-body realignment estimation
//!
//! The brick talks to the estimator through [`RealignEstimator`]; the crate's
//! own implementation is [`RigidEstimator`].

mod bspline;
mod realign_estimator;
mod rigid_estimator;
mod smoothing;
pub mod types;

pub use bspline::BSplineVolume;
pub use realign_estimator::RealignEstimator;
pub use rigid_estimator::RigidEstimator;
pub use smoothing::{fwhm_to_sigma, smooth};
pub use types::EstimatorConfig;
