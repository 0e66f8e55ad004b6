//! Pipeline bricks
//!
//! A brick is one self-contained unit task of a processing pipeline: it
//! defaults its arguments, does its work and leaves its artifacts on disk.

mod realign;


pub use realign::{RealignBrick, RealignRun};
