//! Error types for the logdedup crate

use thiserror::Error;

/// Errors raised while loading settings or starting the pruner.
///
/// The decision path never fails; these only surface at construction time.
#[derive(Debug, Error)]
pub enum DedupError {
    /// I/O error while reading a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON configuration could not be parsed
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file extension is not recognised
    #[error("Unsupported config file extension: {ext}")]
    UnsupportedFormat {
        /// Extension of the rejected file.
        ext: String,
    },

    /// A configuration value could not be bound
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidSetting {
        /// Fully qualified configuration key.
        key: String,
        /// Raw value as read from the source.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Background pruning worker could not be started
    #[error("Failed to start pruner: {reason}")]
    PrunerSpawn {
        /// Underlying cause.
        reason: String,
    },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, DedupError>;
