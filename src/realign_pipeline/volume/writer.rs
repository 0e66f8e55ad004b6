use std::path::Path;

use crate::realign_pipeline::common::error::Result;
use crate::realign_pipeline::volume::types::VolumeSeries;

pub trait VolumeWriter {
    fn write_volume(&self, series: &VolumeSeries, path: &Path) -> Result<()>;
}
