//! Error type shared by the facade and its transport layer.

use reqwest::StatusCode;
use thiserror::Error;

/// Everything a facade call can fail with.
///
/// `Config` and `InvalidArgument` are raised before any request is
/// dispatched. The remaining variants come out of a dispatched request and
/// are reported to the failure callback, except [`HttpError::Cancelled`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// The facade could not be constructed from its configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request descriptor is malformed.
    #[error("invalid request: {0}")]
    InvalidArgument(String),

    /// Network failure, timeout, or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The token provider failed to produce a token.
    #[error("token retrieval failed: {0}")]
    Token(#[source] anyhow::Error),

    /// The response payload is not the JSON the caller expected.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller cancelled the request before it completed.
    #[error("request cancelled")]
    Cancelled,
}

impl HttpError {
    /// Returns `true` for caller-initiated cancellations.
    pub fn is_cancel(&self) -> bool {
        matches!(self, HttpError::Cancelled)
    }

    /// Returns the HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            HttpError::Transport(e) => e.status(),
            _ => None,
        }
    }
}
