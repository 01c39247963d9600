//! Error taxonomy for everything between a consumer and the remote service.
//!
//! Four user-relevant classes plus one internal gate:
//!
//! - [`ApiError::Validation`]: client-side, pre-network; returned
//!   synchronously at zero network cost.
//! - [`ApiError::Network`] / [`ApiError::Server`]: recoverable; surfaced as
//!   a message and retryable via `refetch()` / `load_more()`.
//! - [`ApiError::AuthExpired`]: the server rejected a previously valid
//!   token; handled by the session manager as a silent transition to
//!   anonymous, never surfaced as an exception.
//! - [`ApiError::Busy`]: a second mutating session operation while one is
//!   already in flight.
//! - [`ApiError::Storage`]: local persistence failed.
//!
//! Stale responses are *not* an error value: the sync layer
//! discards them under its generation-token ordering rule before any state
//! is touched.

use thiserror::Error;

/// Errors produced by the API client, session manager, and sync layer.
///
/// `Clone` so query snapshots can carry the last error alongside fallback
/// data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Input rejected before any network call was made.
    #[error("{0}")]
    Validation(String),

    /// The request could not be completed (transport failure, timeout,
    /// unparseable response body).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// A previously valid credential was rejected.
    #[error("session expired")]
    AuthExpired,

    /// Another mutating session operation is already in flight.
    #[error("another session operation is in flight")]
    Busy,

    /// Local persistent storage could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Transport failures and 5xx/429 responses are retryable; validation
    /// errors, auth rejection, and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Server { status, .. } => *status == 429 || *status >= 500,
            ApiError::Validation(_)
            | ApiError::AuthExpired
            | ApiError::Busy
            | ApiError::Storage(_) => false,
        }
    }

    /// Whether this error means the current credential is no longer valid.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}
