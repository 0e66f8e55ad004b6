use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use crate::realign_pipeline::{
    artifacts::MotionEstimate,
    common::error::Result,
    estimator::{EstimatorConfig, RealignEstimator, RigidEstimator},
    options::{RealignOptions, RealignOptionsBuilder, RealignOutputs, ResolvedOutputs, validate_input},
    staging::StagedVolume,
    volume::{NiftiVolumeIo, VolumeReader, VolumeWriter},
};

/// What a realignment run was asked to do, after defaulting, and what it produced.
#[derive(Debug, Clone, Serialize)]
pub struct RealignRun {
    pub input: PathBuf,
    pub outputs: ResolvedOutputs,
    pub options: RealignOptions,
    /// `None` for a dry run
    #[serde(skip)]
    pub estimate: Option<MotionEstimate>,
}

/// Rigid-body realignment of a 4D series.
pub struct RealignBrick<R: VolumeReader, W: VolumeWriter, E: RealignEstimator> {
    reader: R,
    writer: W,
    estimator: E,
    staging_dir: Option<PathBuf>,
}

impl RealignBrick<NiftiVolumeIo, NiftiVolumeIo, RigidEstimator> {
    pub fn new() -> Self {
        Self {
            reader: NiftiVolumeIo,
            writer: NiftiVolumeIo,
            estimator: RigidEstimator,
            staging_dir: None,
        }
    }
}

impl Default for RealignBrick<NiftiVolumeIo, NiftiVolumeIo, RigidEstimator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: VolumeReader, W: VolumeWriter, E: RealignEstimator> RealignBrick<R, W, E> {
    pub fn with_custom(reader: R, writer: W, estimator: E) -> Self {
        Self {
            reader,
            writer,
            estimator,
            staging_dir: None,
        }
    }

    /// Stages the input under `dir` instead of the system temp directory.
    pub fn staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = Some(dir);
        self
    }

    /// Realigns every volume of `input` and writes the requested artifacts.
    ///
    /// `options` holds the caller's fields only; anything unset takes its
    /// default. With `test` set the defaulted arguments are returned without
    /// touching the filesystem.
    #[instrument(skip_all, fields(input = %input.as_ref().display()))]
    pub fn run<P: AsRef<Path>>(
        &self,
        input: P,
        outputs: &RealignOutputs,
        options: RealignOptionsBuilder,
    ) -> Result<RealignRun> {
        let input = input.as_ref();

        let (outputs, options) = {
            let _span = tracing::info_span!("resolve_arguments").entered();
            validate_input(input)?;
            let options = options.build();
            options.validate()?;
            (outputs.resolve(input), options)
        };

        let mut run = RealignRun {
            input: input.to_path_buf(),
            outputs,
            options,
            estimate: None,
        };

        if run.options.test {
            info!("Test mode, skipping realignment");
            return Ok(run);
        }

        let staged = {
            let _span = tracing::info_span!("stage_input").entered();
            let series = self.reader.read_volume(input)?;
            info!(
                dims = ?series.dims(),
                timepoints = series.len(),
                "Read input series"
            );
            StagedVolume::stage(&series, &self.writer, self.staging_dir.as_deref())?
        };

        // `staged` removes its file when dropped, so every `?` below cleans up.
        let estimate = self.estimate(&staged, &run.options)?;

        {
            let _span = tracing::info_span!("write_outputs").entered();
            estimate.write(&run.outputs)?;
        }

        staged.close()?;

        info!(timepoints = estimate.len(), "Realignment complete");
        run.estimate = Some(estimate);
        Ok(run)
    }

    fn estimate(&self, staged: &StagedVolume, options: &RealignOptions) -> Result<MotionEstimate> {
        let series = {
            let _span = tracing::info_span!("open_staged").entered();
            staged.open(&self.reader)?
        };

        let estimated = {
            let _span = tracing::info_span!("estimate", timepoints = series.len()).entered();
            self.estimator
                .estimate(&series, &EstimatorConfig::from(options))?
        };

        let _span = tracing::info_span!("derive_transforms").entered();
        MotionEstimate::derive(series.affines(), estimated)
    }
}
