//! Common utilities module
//!
//! This module contains shared utilities used across the realignment pipeline.

pub mod error;

pub use error::{RealignError, Result};
