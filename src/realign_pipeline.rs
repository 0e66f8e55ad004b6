//! fMRI realignment pipeline module
//!
//! Rigid-body motion correction of 4D functional series, split into option
//! defaulting, volume I/O, temporary staging, estimation, transform
//! decomposition and artifact writing. [`RealignBrick`] ties them together.

pub mod artifacts;
pub mod bricks;
pub mod common;
pub mod estimator;
pub mod options;
pub mod staging;
pub mod transform;
pub mod volume;

pub use common::{
    RealignError,
    Result,
};

pub use options::{
    OutputTarget,
    RealignOptions,
    RealignOptionsBuilder,
    RealignOutputs,
    ResolvedOutputs,
};

pub use volume::{
    NiftiVolumeIo,
    VolumeReader,
    VolumeSeries,
    VolumeWriter,
};

pub use estimator::{
    EstimatorConfig,
    RealignEstimator,
    RigidEstimator,
};

pub use artifacts::{
    MatrixStack,
    MotionEstimate,
};

pub use bricks::{
    RealignBrick,
    RealignRun,
};
