//! Typed errors for loading configuration and catalog documents.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading configuration. All of them are
/// fatal at startup, before any record is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config is missing required key 'transformations'")]
    MissingTransformations,
}
