//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or saving the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Failed to access configuration file {path}: {source}")]
    Io {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not match the expected shape
    #[error("Failed to parse configuration: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// The configuration could not be rendered as YAML
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),
}
