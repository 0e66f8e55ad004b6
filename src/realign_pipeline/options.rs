//! Option and output-path defaulting
//!
//! User-supplied option fields are merged over documented defaults, and output
//! paths are derived from the input file name unless given explicitly or skipped.

mod outputs;
pub mod types;

pub use outputs::{OutputTarget, RealignOutputs, ResolvedOutputs, validate_input};
pub use types::{RealignOptions, RealignOptionsBuilder};
