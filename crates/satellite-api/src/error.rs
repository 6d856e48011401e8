//! Error types for satellite-api

use cvmanager_core::CvmError;
use thiserror::Error;

/// Errors raised while building or using the HTTP client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Base URL could not be parsed
    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// reqwest client construction failed
    #[error("Failed to create HTTP client: {0}")]
    Build(String),

    /// Request could not be sent or the body could not be read
    #[error("HTTP request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Server answered with a non-success status
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// Response body is not JSON
    #[error("Invalid JSON from {url}: {reason}")]
    InvalidJson { url: String, reason: String },
}

impl From<ClientError> for CvmError {
    fn from(err: ClientError) -> Self {
        CvmError::Transport(err.to_string())
    }
}
