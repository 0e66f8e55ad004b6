//! Volume I/O module
//!
//! This module provides reading and writing of 4D volume series with their
//! voxel-to-world affines.

mod reader;
mod writer;
mod nifti_io;
pub mod types;

pub use reader::VolumeReader;
pub use writer::VolumeWriter;
pub use nifti_io::NiftiVolumeIo;
pub use types::VolumeSeries;
