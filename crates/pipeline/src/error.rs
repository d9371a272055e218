//! Error types for the context pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole request before any pipeline runs.
///
/// Everything that goes wrong inside a single pipeline is reported as
/// [`SourceResult::Error`](crate::SourceResult::Error) instead.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("invalid area of interest: {0}")]
    InvalidGeometry(#[from] geocontext_core::Error),

    #[error("cannot build catalog request for {source_key}: {reason}")]
    InvalidQuery { source_key: String, reason: String },
}

/// Failures loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for request-level operations
pub type Result<T> = std::result::Result<T, RequestError>;
