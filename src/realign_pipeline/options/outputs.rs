use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::realign_pipeline::common::error::{RealignError, Result};

/// Text token that disables an output when given where a path is expected.
pub const SKIP_TOKEN: &str = "skip";

const PARAMS_SUFFIX: &str = "_rp.txt";
const WORLD_TO_WORLD_SUFFIX: &str = "_w2w.json";
const VOXEL_TO_WORLD_SUFFIX: &str = "_v2w.json";

/// Where one output artifact goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    /// Derive the path from the input file name
    #[default]
    Default,
    /// Write to this path
    Path(PathBuf),
    /// Do not write this artifact
    Skip,
}

impl OutputTarget {
    fn resolve(&self, input: &Path, suffix: &str) -> Option<PathBuf> {
        match self {
            OutputTarget::Default => Some(default_output_path(input, suffix)),
            OutputTarget::Path(path) => Some(path.clone()),
            OutputTarget::Skip => None,
        }
    }
}

impl FromStr for OutputTarget {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.is_empty() {
            OutputTarget::Default
        } else if s.eq_ignore_ascii_case(SKIP_TOKEN) {
            OutputTarget::Skip
        } else {
            OutputTarget::Path(PathBuf::from(s))
        })
    }
}

/// The three output artifacts of a realignment run, as requested by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealignOutputs {
    /// Motion parameters text file
    pub params: OutputTarget,
    /// World-to-world matrix stack
    pub world_to_world: OutputTarget,
    /// Voxel-to-world matrix stack
    pub voxel_to_world: OutputTarget,
}

impl RealignOutputs {
    pub fn params(mut self, target: OutputTarget) -> Self {
        self.params = target;
        self
    }

    pub fn world_to_world(mut self, target: OutputTarget) -> Self {
        self.world_to_world = target;
        self
    }

    pub fn voxel_to_world(mut self, target: OutputTarget) -> Self {
        self.voxel_to_world = target;
        self
    }

    pub fn resolve(&self, input: &Path) -> ResolvedOutputs {
        ResolvedOutputs {
            params: self.params.resolve(input, PARAMS_SUFFIX),
            world_to_world: self.world_to_world.resolve(input, WORLD_TO_WORLD_SUFFIX),
            voxel_to_world: self.voxel_to_world.resolve(input, VOXEL_TO_WORLD_SUFFIX),
        }
    }
}

/// Output paths after defaulting; `None` means the artifact is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOutputs {
    pub params: Option<PathBuf>,
    pub world_to_world: Option<PathBuf>,
    pub voxel_to_world: Option<PathBuf>,
}

/// Checks that `input` names a file. Does not touch the filesystem.
pub fn validate_input(input: &Path) -> Result<()> {
    if input.as_os_str().is_empty() {
        return Err(RealignError::InvalidArgument(
            "input path is empty".to_string(),
        ));
    }

    let text = input.to_string_lossy();
    if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        return Err(RealignError::InvalidArgument(format!(
            "input path {} names a directory, expected a volume file",
            input.display()
        )));
    }

    if input.file_name().is_none() {
        return Err(RealignError::InvalidArgument(format!(
            "input path {} has no file name",
            input.display()
        )));
    }

    Ok(())
}

fn volume_stem(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for ext in [".nii.gz", ".nii"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }

    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let file_name = format!("{}{}", volume_stem(input), suffix);
    match input.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}
