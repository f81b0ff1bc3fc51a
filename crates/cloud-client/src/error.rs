//! Cloud client errors

use thiserror::Error;

/// Errors that can occur when interacting with the cloud provider API
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error
    #[error("Cloud API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider already holds the requested resource
    ///
    /// Address reservations hit this when another caller grabbed the same
    /// offset between our list and our reserve. Callers scanning a range
    /// should treat it as "taken, keep scanning".
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
