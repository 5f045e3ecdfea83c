use std::path::PathBuf;

use thiserror::Error;

use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum ScaffoldError {
    // Acquisition errors
    #[error("Could not acquire template package {locator}: {reason}")]
    Acquisition { locator: String, reason: String },

    #[error("Embedded resource not found: {name}")]
    ResourceNotFound { name: String },

    #[error("Unsupported locator scheme \"{scheme}\" in {locator}")]
    UnsupportedScheme { scheme: String, locator: String },

    #[error("Checksum mismatch for {locator}")]
    ChecksumMismatch { locator: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Path traversal detected in archive: {entry}")]
    PathTraversal { entry: String },

    // Validation errors
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Target file {} already exists. Not overwriting.", path.display())]
    Conflict { path: PathBuf },

    #[error("Name \"{name}\" computed for {} is not a valid file name", source_path.display())]
    InvalidTargetName { source_path: PathBuf, name: String },

    // Template errors
    #[error("Template processing failed for {}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScaffoldError {
    /// Wrap an error raised while opening or reading a locator
    pub(crate) fn acquisition(locator: &str, reason: impl std::fmt::Display) -> Self {
        ScaffoldError::Acquisition {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScaffoldError>;
