//! Client-level errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("Timed out waiting for container '{0}'")]
    WaitTimeout(String),

    #[error("Unknown client '{0}'")]
    UnknownClient(String),

    #[error("Client '{client}' does not support {feature}")]
    UnsupportedFeature { client: String, feature: String },

    #[error("Image '{0}' not found after pull")]
    ImageNotFound(String),

    #[error("Invalid client configuration: {0}")]
    Configuration(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
