//! Error types for the lookup and sync layers.
//!
//! None of these abort a run: callers degrade to "0 listeners" or
//! "skip this push" and log the error.

use thiserror::Error;

/// Failure of one HTTP JSON exchange (after or before retries).
#[derive(Error, Debug)]
pub enum HttpError {
    /// Connection, DNS, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body was not valid JSON
    #[error("Invalid JSON response: {0}")]
    Decode(String),

    /// Target endpoint is not configured; no request was attempted
    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

/// Failure of a media-center call.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// JSON-RPC error object in an otherwise valid response
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response without a `result` member or with an unexpected shape
    #[error("Unexpected response shape: {0}")]
    Malformed(String),
}
