//! Realignment artifacts
//!
//! Derivation of the per-timepoint transforms and motion parameters from the
//! estimator output, and their persistence to the three output files.

mod matrix_stack;
mod motion;
mod params_file;

pub use matrix_stack::MatrixStack;
pub use motion::MotionEstimate;
pub use params_file::{read_parameters, write_parameters};

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::realign_pipeline::common::error::{RealignError, Result};

fn output_error(path: &Path, message: impl ToString) -> RealignError {
    RealignError::OutputWrite {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| output_error(path, e))
}
