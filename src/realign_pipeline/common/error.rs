use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealignError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("Failed to read volume {}: {message}", path.display())]
    VolumeRead { path: PathBuf, message: String },

    #[error("Failed to write volume {}: {message}", path.display())]
    VolumeWrite { path: PathBuf, message: String },

    #[error("Failed to stage temporary volume: {0}")]
    Staging(String),

    #[error("Realignment estimation failed: {0}")]
    Estimator(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Failed to write output file {}: {message}", path.display())]
    OutputWrite { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealignError {
    pub(crate) fn invalid_option(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RealignError>;
