//! Error types for the SSE client.

use thiserror::Error;

/// Errors that can occur while talking to an HTTP/SSE endpoint.
#[derive(Debug, Error)]
pub enum SseError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Failed to parse a response body
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The byte stream failed mid-way
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Base URL or path could not be joined into a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<serde_json::Error> for SseError {
    fn from(err: serde_json::Error) -> Self {
        SseError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for SseError {
    fn from(err: url::ParseError) -> Self {
        SseError::InvalidUrl(err.to_string())
    }
}
