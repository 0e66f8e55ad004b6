//! Temporary staging of the input series.
//!
//! The estimator works on a private copy of the input written to a uniquely
//! named temporary file. The file lives exactly as long as the [`StagedVolume`]
//! value: dropping it removes the file on every exit path, including errors
//! returned by the estimator and panics unwinding through the caller.

use std::path::Path;

use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

use crate::realign_pipeline::common::error::{RealignError, Result};
use crate::realign_pipeline::volume::{VolumeReader, VolumeSeries, VolumeWriter};

const STAGING_PREFIX: &str = "realign_";
const STAGING_SUFFIX: &str = ".nii";

pub struct StagedVolume {
    path: TempPath,
}

impl StagedVolume {
    /// Writes `series` to a fresh temporary file in `dir`, or in the system
    /// temp directory when `dir` is `None`.
    pub fn stage<W: VolumeWriter + ?Sized>(
        series: &VolumeSeries,
        writer: &W,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(STAGING_PREFIX).suffix(STAGING_SUFFIX);

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| RealignError::Staging(e.to_string()))?;

        // Only the path is needed from here on; the handle is closed so the
        // writer can recreate the file.
        let path = file.into_temp_path();
        debug!("Staging volume series at {}", path.display());

        writer.write_volume(series, &path)?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the staged copy back as a series handle.
    pub fn open<R: VolumeReader + ?Sized>(&self, reader: &R) -> Result<VolumeSeries> {
        reader.read_volume(&self.path)
    }

    /// Removes the staged file, reporting a failure instead of ignoring it.
    pub fn close(self) -> Result<()> {
        let staged_path = self.path.display().to_string();
        self.path.close().map_err(|e| {
            warn!("Failed to remove staged volume {}: {}", staged_path, e);
            RealignError::Staging(format!("{}: {}", staged_path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realign_pipeline::volume::NiftiVolumeIo;
    use nalgebra::Matrix4;
    use ndarray::Array4;

    struct FailingWriter;

    impl VolumeWriter for FailingWriter {
        fn write_volume(&self, _series: &VolumeSeries, path: &Path) -> Result<()> {
            Err(RealignError::VolumeWrite {
                path: path.to_path_buf(),
                message: "disk full".to_string(),
            })
        }
    }

    fn series() -> VolumeSeries {
        VolumeSeries::new(Array4::from_elem((3, 3, 3, 2), 1.0), Matrix4::identity()).unwrap()
    }

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_staged_file_exists_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedVolume::stage(&series(), &NiftiVolumeIo, Some(dir.path())).unwrap();
        let path = staged.path().to_path_buf();

        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with(STAGING_PREFIX));
        assert_eq!(staged.open(&NiftiVolumeIo).unwrap().len(), 2);

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_close_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedVolume::stage(&series(), &NiftiVolumeIo, Some(dir.path())).unwrap();

        staged.close().unwrap();
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn test_write_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = StagedVolume::stage(&series(), &FailingWriter, Some(dir.path()));

        assert!(matches!(result, Err(RealignError::VolumeWrite { .. })));
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn test_staging_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedVolume::stage(&series(), &NiftiVolumeIo, Some(dir.path())).unwrap();
        let b = StagedVolume::stage(&series(), &NiftiVolumeIo, Some(dir.path())).unwrap();

        assert_ne!(a.path(), b.path());
    }
}
