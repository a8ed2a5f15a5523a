//! Error types raised while loading and validating container maps.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Invalid configuration value for '{field}': {message}")]
    Configuration { field: String, message: String },

    #[error("Circular reference in 'extends' involving configuration '{0}'")]
    ExtendsCycle(String),

    #[error("Container configuration '{config}' not found on map '{map}'")]
    UnknownConfiguration { map: String, config: String },

    #[error("Map integrity check failed: {0}")]
    Integrity(String),
}

impl MapError {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        MapError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for map operations.
pub type MapResult<T> = Result<T, MapError>;
