use std::path::Path;

use crate::realign_pipeline::common::error::Result;
use crate::realign_pipeline::volume::types::VolumeSeries;

pub trait VolumeReader {
    fn read_volume(&self, path: &Path) -> Result<VolumeSeries>;
}
