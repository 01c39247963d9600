//! Debounced search: input-rate throttling in front of a query.
//!
//! Every keystroke supersedes the pending delayed fetch rather than
//! cancelling a timer primitive: each [`set_query`](SearchDebouncer::set_query)
//! bumps the shared generation token, and the previously scheduled task
//! notices its stale token after its sleep and exits without fetching.
//! Completions that do fetch pass through the same token check as
//! [`QueryEngine`](super::query::QueryEngine), so a fast-typed later
//! query's result can never be overwritten by a slower earlier query's
//! late response.
//!
//! Empty and whitespace-only queries resolve immediately to the empty
//! result set without contacting the network.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::api::error::ApiError;
use crate::config::DEFAULT_DEBOUNCE_WINDOW;
use crate::sync::query::{Fallback, QueryEngine, QuerySnapshot};

type SearchFetcher<T> =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Debounced query over a search string.
///
/// Cheap to clone; clones share the snapshot and generation counter.
pub struct SearchDebouncer<T> {
    engine: QueryEngine<T>,
    fetcher: SearchFetcher<T>,
    window: Duration,
}

impl<T> Clone for SearchDebouncer<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            fetcher: Arc::clone(&self.fetcher),
            window: self.window,
        }
    }
}

impl<T> SearchDebouncer<T>
where
    T: Fallback + Clone + Send + 'static,
{
    /// Debouncer with the default 300 ms window.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::with_window(DEFAULT_DEBOUNCE_WINDOW, fetch)
    }

    /// Debouncer with an explicit debounce window.
    pub fn with_window<F, Fut>(window: Duration, fetch: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            engine: QueryEngine::detached(),
            fetcher: Arc::new(move |q| {
                Box::pin(fetch(q)) as BoxFuture<'static, Result<T, ApiError>>
            }),
            window,
        }
    }

    /// Current snapshot. `data` is always present.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.engine.snapshot()
    }

    /// Feed a raw query string, restarting the debounce window.
    ///
    /// Whitespace-only input resolves synchronously to the empty result
    /// set (returns `None`: nothing was scheduled). Otherwise returns the
    /// delayed task's handle; the task fetches only if no newer query has
    /// arrived by the time its window elapses.
    pub fn set_query(&self, raw: &str) -> Option<tokio::task::JoinHandle<()>> {
        // Bumping the token here is what "cancels" any pending timer.
        let token = self.engine.begin();
        let query = raw.trim().to_string();

        if query.is_empty() {
            self.engine.try_apply(token, Ok(T::fallback()));
            return None;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let weak = self.engine.downgrade();
        let window = self.window;
        Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if !weak.is_current(token) {
                trace!("debounced: query superseded before window elapsed");
                return;
            }
            let result = fetcher(query).await;
            weak.try_apply(token, result);
        }))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_debouncer(
        calls: Arc<AtomicUsize>,
    ) -> SearchDebouncer<Vec<String>> {
        SearchDebouncer::new(move |q: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![format!("result for {q}")])
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn typing_fast_issues_exactly_one_query() {
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = counting_debouncer(Arc::clone(&calls));

        // Type "nebula" character by character, well inside the window.
        let mut handles = Vec::new();
        for prefix in ["n", "ne", "neb", "nebu", "nebul", "nebula"] {
            if let Some(h) = debouncer.set_query(prefix) {
                handles.push(h);
            }
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "one query after the last keystroke");
        let snap = debouncer.snapshot();
        assert_eq!(snap.data, vec!["result for nebula".to_string()]);
        assert!(!snap.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_query_resolves_immediately_without_network() {
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = counting_debouncer(Arc::clone(&calls));

        assert!(debouncer.set_query("   ").is_none());
        let snap = debouncer.snapshot();
        assert!(snap.data.is_empty());
        assert!(!snap.loading);
        assert!(snap.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_query_supersedes_pending_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let debouncer = counting_debouncer(Arc::clone(&calls));

        let pending = debouncer.set_query("nebula").unwrap();
        // Cleared before the window elapsed: nothing should fire.
        assert!(debouncer.set_query("").is_none());
        pending.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(debouncer.snapshot().data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_earlier_response_cannot_overwrite_later_query() {
        let debouncer = SearchDebouncer::new(|q: String| async move {
            // The earlier, shorter query is the slow one.
            let delay = if q == "neb" { 200 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(vec![q])
        });

        let h1 = debouncer.set_query("neb").unwrap();
        // Next keystroke arrives after the first window elapsed (the first
        // fetch is already in flight) but before its slow response lands.
        tokio::time::sleep(Duration::from_millis(350)).await;
        let h2 = debouncer.set_query("nebula").unwrap();

        h2.await.unwrap();
        h1.await.unwrap();

        assert_eq!(debouncer.snapshot().data, vec!["nebula".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn search_failure_falls_back_to_empty() {
        let debouncer: SearchDebouncer<Vec<String>> = SearchDebouncer::new(|_q: String| async {
            Err(ApiError::Server {
                status: 500,
                message: "boom".into(),
            })
        });

        debouncer.set_query("nebula").unwrap().await.unwrap();
        let snap = debouncer.snapshot();
        assert!(snap.data.is_empty());
        assert!(snap.error.is_some());
        assert!(!snap.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_window_is_respected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let debouncer = SearchDebouncer::with_window(
            Duration::from_millis(50),
            move |q: String| {
                let calls = Arc::clone(&counter);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![q])
                }
            },
        );

        let h1 = debouncer.set_query("a").unwrap();
        // 60 ms gap exceeds the 50 ms window: both queries fire.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let h2 = debouncer.set_query("ab").unwrap();
        h1.await.unwrap();
        h2.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.snapshot().data, vec!["ab".to_string()]);
    }
}
