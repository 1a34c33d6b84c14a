use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for fallible crate-level operations.
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Startup and I/O failures.
///
/// Per-step execution failures never surface as `AtlasError`; they are
/// captured in lineage as [`crate::query::StepError`].
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A logical source name is not part of the dataset family.
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    /// The source map is empty.
    #[error("no source location mapping configured")]
    NoSourcesConfigured,
    /// Every configured source pointed at a missing file.
    #[error("none of the configured sources resolve to an existing file (checked: {})", display_paths(.checked))]
    NoSourcesResolved {
        /// Paths that were tried.
        checked: Vec<PathBuf>,
    },
    /// Invalid caller-supplied argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
