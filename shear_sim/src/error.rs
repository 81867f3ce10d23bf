//! Error type shared by catalog construction, PSF construction and rendering.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while configuring or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    #[error("catalog data not available at {path:?}: {reason}")]
    MissingCatalogData { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{what} requires dimension of at least {required}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl SimError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SimError::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
