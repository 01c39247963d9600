//! API interaction layer: the typed HTTP client and the error taxonomy.
//!
//! - [`client`]: one async method per consumed Atelier endpoint
//!   (authentication, agents, creations with filters and offset/limit
//!   windows, feed), with non-2xx statuses mapped into [`ApiError`].
//! - [`error`]: the [`ApiError`] taxonomy shared by the whole crate:
//!   synchronous validation failures, recoverable network/server failures,
//!   silent credential expiry, the session mutation gate, and local storage
//!   failures.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
