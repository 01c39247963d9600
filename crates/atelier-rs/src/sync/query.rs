//! Generic fetch/cache engine: one async read of server state behind a
//! live snapshot.
//!
//! Consumers get `{data, loading, error}` and a `refetch()`; they never
//! manage fetch timing or merge logic. Two rules hold regardless of how
//! fast inputs change:
//!
//! 1. **Issue order wins.** Every issued fetch carries a monotonically
//!    increasing generation token. A completion is applied only if its
//!    token is still the most recent one issued; anything older is
//!    discarded silently. Applied state transitions therefore follow issue
//!    order, not completion order.
//! 2. **Data is never absent.** The snapshot starts at [`Fallback`] and is
//!    reset to it on error, so rendering code needs no null handling.
//!
//! Cancellation is advisory: in-flight requests are not aborted at the
//! transport level, but superseded completions never mutate state, and
//! completions that land after the engine is dropped upgrade a dead `Weak`
//! and vanish.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

use crate::api::error::ApiError;
use crate::types::Page;

// ── Fallback ───────────────────────────────────────────────────────

/// Safe type-appropriate default used in place of absent data: the empty
/// sequence for collections, a documented empty record for aggregates.
pub trait Fallback {
    fn fallback() -> Self;
}

impl<T> Fallback for Vec<T> {
    fn fallback() -> Self {
        Vec::new()
    }
}

impl<T> Fallback for Option<T> {
    fn fallback() -> Self {
        None
    }
}

/// The empty window: no items, zero total.
impl<T> Fallback for Page<T> {
    fn fallback() -> Self {
        Page {
            items: Vec::new(),
            offset: 0,
            limit: 0,
            total: 0,
        }
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Point-in-time view of one query. `data` is always present.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<ApiError>,
}

// ── Engine ─────────────────────────────────────────────────────────

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

struct EngineInner<T> {
    state: Mutex<QuerySnapshot<T>>,
    generation: AtomicU64,
}

impl<T> EngineInner<T> {
    fn lock(&self) -> MutexGuard<'_, QuerySnapshot<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Generic fetch/cache/error primitive wrapping one async read of server
/// state. Cheap to clone; clones share state and the generation counter.
pub struct QueryEngine<T> {
    inner: Arc<EngineInner<T>>,
    fetcher: Option<Fetcher<T>>,
}

impl<T> Clone for QueryEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<T> QueryEngine<T>
where
    T: Fallback + Clone + Send + 'static,
{
    /// Engine with its own fetcher; [`refetch`](Self::refetch) re-issues it.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::build(Some(Arc::new(move || {
            Box::pin(fetch()) as BoxFuture<'static, Result<T, ApiError>>
        })))
    }

    /// Engine without a fetcher of its own. Building block for composed
    /// loaders (debounced search) that issue fetches through
    /// [`begin`](Self::begin) / [`WeakQueryEngine::try_apply`].
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(fetcher: Option<Fetcher<T>>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(QuerySnapshot {
                    data: T::fallback(),
                    loading: false,
                    error: None,
                }),
                generation: AtomicU64::new(0),
            }),
            fetcher,
        }
    }

    /// Current snapshot. `data` is always present.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.inner.lock().clone()
    }

    /// Issue a new request: bump the generation token and mark loading.
    /// Returns the token the eventual completion must present.
    pub fn begin(&self) -> u64 {
        let token = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.lock().loading = true;
        token
    }

    /// Whether `token` is still the most recently issued generation.
    pub fn is_current(&self, token: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == token
    }

    /// Apply a completion if its token is still current. Returns whether
    /// the result was applied; stale completions are discarded untouched.
    pub fn try_apply(&self, token: u64, result: Result<T, ApiError>) -> bool {
        if !self.is_current(token) {
            trace!("discarding stale completion (generation {token})");
            return false;
        }
        let mut state = self.inner.lock();
        match result {
            Ok(data) => {
                state.data = data;
                state.error = None;
            }
            Err(e) => {
                state.data = T::fallback();
                state.error = Some(e);
            }
        }
        state.loading = false;
        true
    }

    /// Re-issue the fetch with a fresh generation token. Concurrent calls
    /// collapse: only the latest issue's completion is applied.
    ///
    /// Returns `None` for a [`detached`](Self::detached) engine; otherwise
    /// the spawned task's handle, so callers may await settlement.
    pub fn refetch(&self) -> Option<tokio::task::JoinHandle<()>> {
        let fetcher = Arc::clone(self.fetcher.as_ref()?);
        let token = self.begin();
        let weak = self.downgrade();
        Some(tokio::spawn(async move {
            let result = fetcher().await;
            weak.try_apply(token, result);
        }))
    }

    /// Weak handle for completions. Lets in-flight work outlive the engine
    /// without keeping its state alive or mutating it after teardown.
    pub fn downgrade(&self) -> WeakQueryEngine<T> {
        WeakQueryEngine(Arc::downgrade(&self.inner))
    }
}

// ── Weak handle ────────────────────────────────────────────────────

/// Non-owning handle to an engine, held by in-flight completions.
pub struct WeakQueryEngine<T>(Weak<EngineInner<T>>);

impl<T> Clone for WeakQueryEngine<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> WeakQueryEngine<T>
where
    T: Fallback + Clone + Send + 'static,
{
    /// Whether the engine is still alive and `token` is still current.
    pub fn is_current(&self, token: u64) -> bool {
        self.0
            .upgrade()
            .is_some_and(|inner| inner.generation.load(Ordering::SeqCst) == token)
    }

    /// Apply a completion if the engine is still alive and the token is
    /// still current. A torn-down engine discards everything.
    pub fn try_apply(&self, token: u64, result: Result<T, ApiError>) -> bool {
        match self.0.upgrade() {
            Some(inner) => QueryEngine {
                inner,
                fetcher: None,
            }
            .try_apply(token, result),
            None => {
                trace!("discarding completion after engine teardown");
                false
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn refetch_applies_success() {
        let engine = QueryEngine::new(|| async { Ok(vec![1u32, 2, 3]) });
        let handle = engine.refetch().unwrap();
        assert!(engine.snapshot().loading);

        handle.await.unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.data, vec![1, 2, 3]);
        assert!(!snap.loading);
        assert!(snap.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn error_falls_back_to_empty_data() {
        let engine: QueryEngine<Vec<u32>> =
            QueryEngine::new(|| async { Err(ApiError::Network("connection reset".into())) });
        engine.refetch().unwrap().await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.data, Vec::<u32>::new());
        assert_eq!(snap.error, Some(ApiError::Network("connection reset".into())));
        assert!(!snap.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn later_issue_wins_over_earlier_completion() {
        // First call is slow, second call is fast: the slow first response
        // lands last but must be discarded.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = QueryEngine::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(vec!["first".to_string()])
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(vec!["second".to_string()])
                }
            }
        });

        let h1 = engine.refetch().unwrap();
        let h2 = engine.refetch().unwrap();
        h2.await.unwrap();
        h1.await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.data, vec!["second".to_string()]);
        assert!(!snap.loading);
        assert!(snap.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_error_does_not_clobber_fresh_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = QueryEngine::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(ApiError::Network("slow failure".into()))
                } else {
                    Ok(vec![7u32])
                }
            }
        });

        let h1 = engine.refetch().unwrap();
        let h2 = engine.refetch().unwrap();
        h2.await.unwrap();
        h1.await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.data, vec![7]);
        assert!(snap.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_discards_in_flight_completion() {
        let engine: QueryEngine<Vec<u32>> = QueryEngine::new(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(vec![1])
        });
        let weak = engine.downgrade();
        let handle = engine.refetch().unwrap();

        drop(engine);
        handle.await.unwrap();

        // The engine is gone; nothing was there to mutate.
        assert!(!weak.is_current(1));
        assert!(!weak.try_apply(1, Ok(vec![9])));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_engine_has_no_refetch() {
        let engine: QueryEngine<Vec<u32>> = QueryEngine::detached();
        assert!(engine.refetch().is_none());

        // But the begin/try_apply seam works for composed loaders.
        let token = engine.begin();
        assert!(engine.snapshot().loading);
        assert!(engine.try_apply(token, Ok(vec![4])));
        assert_eq!(engine.snapshot().data, vec![4]);
    }

    #[tokio::test(start_paused = true)]
    async fn try_apply_rejects_old_token() {
        let engine: QueryEngine<Vec<u32>> = QueryEngine::detached();
        let old = engine.begin();
        let newer = engine.begin();
        assert!(!engine.try_apply(old, Ok(vec![1])));
        assert!(engine.try_apply(newer, Ok(vec![2])));
        assert_eq!(engine.snapshot().data, vec![2]);
    }
}
