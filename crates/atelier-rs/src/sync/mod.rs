//! Data synchronization between the remote Atelier service and local state.
//!
//! Four primitives, all obeying the same rules: snapshots always carry
//! data (never null), loading and error live beside the data, and stale
//! async completions are discarded by generation token rather than being
//! raced against.
//!
//! - [`query`]: single fetch behind a `{data, loading, error}` snapshot.
//! - [`pagination`]: filtered, append-on-load-more collection loading.
//! - [`search`]: debounced query built on the query engine.
//! - [`toggles`]: optimistic local membership sets with best-effort
//!   server reconciliation.

pub mod pagination;
pub mod query;
pub mod search;
pub mod toggles;

pub use pagination::{CollectionLoader, CollectionSnapshot};
pub use query::{Fallback, QueryEngine, QuerySnapshot, WeakQueryEngine};
pub use search::SearchDebouncer;
pub use toggles::{ToggleKind, ToggleStore};
