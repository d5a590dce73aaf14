//! Error types shared across the renderer crates.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for configuration and other process-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be read from disk
    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid TOML for [`crate::RendererConfig`]
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but violates a constraint
    #[error("Config error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the renderer's Error type.
pub type Result<T> = std::result::Result<T, Error>;
