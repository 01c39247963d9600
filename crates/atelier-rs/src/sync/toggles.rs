//! Locally-authoritative membership sets (favorites, saved) with
//! best-effort server reconciliation.
//!
//! `toggle()` flips local membership and persists it immediately, then
//! notifies the server in a detached task. Local membership is
//! authoritative: a failed notification is logged and dropped, never
//! rolled back, and never retried or queued.
//!
//! Each set is one versioned record (`{version, ids}`) under its own
//! storage key, written atomically and loaded at construction, before any
//! network call.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::store::LocalStore;

/// Current on-disk record version. Bump when the schema changes; records
/// with an unknown version load as the empty set instead of corrupting.
const TOGGLE_RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug)]
struct ToggleRecord {
    version: u32,
    ids: Vec<String>,
}

/// Which membership set a store manages. Determines the storage key and
/// the reconciliation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Favorites,
    Saved,
}

impl ToggleKind {
    /// Namespaced storage key for this set.
    pub fn storage_key(self) -> &'static str {
        match self {
            ToggleKind::Favorites => "favorites",
            ToggleKind::Saved => "saved",
        }
    }
}

/// Server notification issued after a local flip: `(id, now_member)`.
pub type ToggleNotifier =
    Arc<dyn Fn(String, bool) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync>;

struct ToggleInner {
    store: LocalStore,
    kind: ToggleKind,
    ids: Mutex<HashSet<String>>,
    notifier: Option<ToggleNotifier>,
}

impl ToggleInner {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Optimistic membership set over creation ids.
///
/// Cheap to clone; clones share the set.
#[derive(Clone)]
pub struct ToggleStore {
    inner: Arc<ToggleInner>,
}

impl ToggleStore {
    /// Load (or initialize) the persisted set for `kind`, without a server
    /// notifier. Flips are purely local.
    pub fn new(store: LocalStore, kind: ToggleKind) -> Self {
        Self::build(store, kind, None)
    }

    /// Load the persisted set and reconcile flips with the server through
    /// `notify`. Notification failures are logged, never rolled back.
    pub fn with_notifier<F, Fut>(store: LocalStore, kind: ToggleKind, notify: F) -> Self
    where
        F: Fn(String, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        Self::build(
            store,
            kind,
            Some(Arc::new(move |id, member| {
                Box::pin(notify(id, member)) as BoxFuture<'static, Result<(), ApiError>>
            })),
        )
    }

    fn build(store: LocalStore, kind: ToggleKind, notifier: Option<ToggleNotifier>) -> Self {
        let ids = match store.get::<ToggleRecord>(kind.storage_key()) {
            Some(record) if record.version == TOGGLE_RECORD_VERSION => {
                record.ids.into_iter().collect()
            }
            Some(record) => {
                warn!(
                    "ignoring {} record with unknown version {}",
                    kind.storage_key(),
                    record.version
                );
                HashSet::new()
            }
            None => HashSet::new(),
        };
        Self {
            inner: Arc::new(ToggleInner {
                store,
                kind,
                ids: Mutex::new(ids),
                notifier,
            }),
        }
    }

    /// Constant-time membership check.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains(id)
    }

    /// Number of ids in the set.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// All ids currently in the set, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Flip membership for `id`: the local set and its persisted record
    /// change immediately; the server is notified best-effort afterwards.
    /// Returns the new membership state.
    pub fn toggle(&self, id: &str) -> Result<bool, ApiError> {
        let now_member = {
            let mut ids = self.inner.lock();
            if ids.remove(id) {
                false
            } else {
                ids.insert(id.to_string());
                true
            }
        };
        self.persist()?;
        debug!(
            "{}: {} is now {}",
            self.inner.kind.storage_key(),
            id,
            if now_member { "set" } else { "unset" }
        );

        if let Some(notifier) = &self.inner.notifier {
            let notify = Arc::clone(notifier);
            let kind = self.inner.kind;
            let id = id.to_string();
            tokio::spawn(async move {
                if let Err(e) = notify(id.clone(), now_member).await {
                    warn!(
                        "{} reconciliation for {id} failed (keeping local state): {e}",
                        kind.storage_key()
                    );
                }
            });
        }
        Ok(now_member)
    }

    fn persist(&self) -> Result<(), ApiError> {
        let record = ToggleRecord {
            version: TOGGLE_RECORD_VERSION,
            ids: self.ids(),
        };
        self.inner.store.put(self.inner.kind.storage_key(), &record)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
