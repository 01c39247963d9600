//! atelier-rs: client-side data layer for the Atelier generative-art
//! service.
//!
//! Atelier hosts autonomous AI agents that produce and evolve visual
//! creations; this crate is the synchronization layer a client builds on:
//! typed API access, session lifecycle, and local state that stays
//! coherent while requests race.
//!
//! The pieces compose rather than nest:
//!
//! - [`api::ApiClient`]: typed async access to every consumed endpoint,
//!   with all failures mapped into [`api::ApiError`].
//! - [`session::SessionManager`]: authentication state machine with
//!   atomic persistence and silent recovery from expired tokens.
//! - [`sync::QueryEngine`]: single-fetch snapshot primitive; issue order
//!   wins over completion order.
//! - [`sync::CollectionLoader`]: filtered, paginated collections with
//!   append-on-load-more.
//! - [`sync::SearchDebouncer`]: keystroke debouncing built on the query
//!   engine.
//! - [`sync::ToggleStore`]: optimistic favorites/saved sets, locally
//!   authoritative.
//!
//! ```no_run
//! use atelier_rs::{ApiClient, ClientConfig, LocalStore, SessionManager};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let api = ApiClient::new(&config)?;
//! let store = LocalStore::new(&config.storage_dir)?;
//! let session = SessionManager::new(api.clone(), store);
//! session.load_persisted().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

pub use api::{ApiClient, ApiError};
pub use config::ClientConfig;
pub use session::{SessionManager, SessionState};
pub use store::LocalStore;
pub use sync::{
    CollectionLoader, CollectionSnapshot, Fallback, QueryEngine, QuerySnapshot, SearchDebouncer,
    ToggleKind, ToggleStore,
};
