//! Offset/limit windowing with incremental "load more" merge.
//!
//! Built on the same generation-token discipline as
//! [`query`](super::query): filter changes bump the generation and
//! **replace** the dataset with the new first page; `load_more()` appends
//! to it without bumping, so any filter change in flight invalidates the
//! pending append.
//!
//! Known limitation: the loader derives the next
//! offset purely from its own prior response. Concurrent server-side
//! inserts or deletes by other sessions can shift the underlying windows,
//! producing client-visible skips or duplicates across pages. Compensating
//! would require cursor/ID-based pagination, a server contract change.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};

use crate::api::error::ApiError;
use crate::types::{Page, PageCursor};

type PageFetcher<F, T> =
    Arc<dyn Fn(F, u64, u64) -> BoxFuture<'static, Result<Page<T>, ApiError>> + Send + Sync>;

/// Point-in-time view of a loaded collection.
#[derive(Debug, Clone)]
pub struct CollectionSnapshot<T> {
    /// All pages loaded so far, in insertion order.
    pub items: Vec<T>,
    /// Cursor describing the most recently fetched window.
    pub cursor: PageCursor,
    /// A first-page (replace) fetch is in flight.
    pub loading: bool,
    /// A `load_more()` append is in flight.
    pub loading_more: bool,
    pub error: Option<ApiError>,
}

struct LoaderState<F, T> {
    filter: F,
    items: Vec<T>,
    cursor: PageCursor,
    /// Offset the next `load_more()` fetch will target.
    next_offset: u64,
    loading: bool,
    loading_more: bool,
    error: Option<ApiError>,
}

struct LoaderInner<F, T> {
    state: Mutex<LoaderState<F, T>>,
    generation: AtomicU64,
    fetcher: PageFetcher<F, T>,
    limit: u64,
}

impl<F, T> LoaderInner<F, T> {
    fn lock(&self) -> MutexGuard<'_, LoaderState<F, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Paginated collection loader over a filter and a page fetcher.
///
/// Cheap to clone; clones share state.
pub struct CollectionLoader<F, T> {
    inner: Arc<LoaderInner<F, T>>,
}

impl<F, T> Clone for CollectionLoader<F, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, T> CollectionLoader<F, T>
where
    F: Clone + PartialEq + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Loader with an initial filter and page size. No fetch is issued
    /// until [`refresh`](Self::refresh) or [`set_filter`](Self::set_filter).
    pub fn new<Fetch, Fut>(initial_filter: F, limit: u64, fetch: Fetch) -> Self
    where
        Fetch: Fn(F, u64, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(LoaderInner {
                state: Mutex::new(LoaderState {
                    filter: initial_filter,
                    items: Vec::new(),
                    cursor: PageCursor::empty(limit),
                    next_offset: 0,
                    loading: false,
                    loading_more: false,
                    error: None,
                }),
                generation: AtomicU64::new(0),
                fetcher: Arc::new(move |filter, offset, limit| {
                    Box::pin(fetch(filter, offset, limit))
                        as BoxFuture<'static, Result<Page<T>, ApiError>>
                }),
                limit,
            }),
        }
    }

    /// Current snapshot. `items` is always present (possibly empty).
    pub fn snapshot(&self) -> CollectionSnapshot<T> {
        let state = self.inner.lock();
        CollectionSnapshot {
            items: state.items.clone(),
            cursor: state.cursor,
            loading: state.loading,
            loading_more: state.loading_more,
            error: state.error.clone(),
        }
    }

    pub fn filter(&self) -> F {
        self.inner.lock().filter.clone()
    }

    /// Change the filter set. A no-op when nothing actually changed;
    /// otherwise resets the offset to 0 and replaces the whole dataset
    /// with the new first page when it arrives. Any in-flight fetch for
    /// the previous filter is superseded and its result discarded.
    pub fn set_filter(&self, filter: F) -> Option<tokio::task::JoinHandle<()>> {
        {
            let mut state = self.inner.lock();
            if state.filter == filter {
                return None;
            }
            state.filter = filter.clone();
            state.error = None;
        }
        Some(self.spawn_first_page(filter))
    }

    /// Fetch (or re-fetch) the first page for the current filter,
    /// replacing the dataset. This is the loader's `refetch()`.
    pub fn refresh(&self) -> tokio::task::JoinHandle<()> {
        let filter = self.inner.lock().filter.clone();
        self.spawn_first_page(filter)
    }

    fn spawn_first_page(&self, filter: F) -> tokio::task::JoinHandle<()> {
        let token = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.inner.lock();
            state.loading = true;
            // The bump above supersedes any in-flight load_more; its task
            // exits at the token check without touching state, so the flag
            // must be cleared here or it sticks forever.
            state.loading_more = false;
        }

        let fetcher = Arc::clone(&self.inner.fetcher);
        let limit = self.inner.limit;
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let result = fetcher(filter, 0, limit).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.load(Ordering::SeqCst) != token {
                trace!("discarding stale first page (generation {token})");
                return;
            }
            let mut state = inner.lock();
            match result {
                Ok(page) => {
                    debug!(
                        "first page: {} of {} item(s)",
                        page.items.len(),
                        page.total
                    );
                    state.cursor = PageCursor::from_page(&page);
                    state.next_offset = page.offset + page.limit;
                    state.items = page.items;
                    state.error = None;
                }
                Err(e) => {
                    state.items = Vec::new();
                    state.cursor = PageCursor::empty(limit);
                    state.next_offset = 0;
                    state.error = Some(e);
                }
            }
            state.loading = false;
        })
    }

    /// Fetch the next window and append it. A no-op (returns `None`)
    /// unless the cursor says more items exist and no fetch is already in
    /// flight; a second call while one is running is ignored, not queued,
    /// so two requests can never target the same offset.
    ///
    /// On failure, previously loaded pages are retained unchanged, the
    /// error is surfaced, and `has_more` is left as-is so the caller may
    /// retry.
    pub fn load_more(&self) -> Option<tokio::task::JoinHandle<()>> {
        let (filter, offset, token) = {
            let mut state = self.inner.lock();
            if state.loading || state.loading_more || !state.cursor.has_more {
                return None;
            }
            state.loading_more = true;
            // The token is read, not bumped: a filter change bumps the
            // generation and thereby invalidates this append.
            let token = self.inner.generation.load(Ordering::SeqCst);
            (state.filter.clone(), state.next_offset, token)
        };

        let fetcher = Arc::clone(&self.inner.fetcher);
        let limit = self.inner.limit;
        let weak: Weak<LoaderInner<F, T>> = Arc::downgrade(&self.inner);
        Some(tokio::spawn(async move {
            let result = fetcher(filter, offset, limit).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.load(Ordering::SeqCst) != token {
                trace!("discarding superseded load_more at offset {offset}");
                return;
            }
            let mut state = inner.lock();
            match result {
                Ok(page) => {
                    debug!(
                        "load_more: +{} item(s) at offset {}, total {}",
                        page.items.len(),
                        page.offset,
                        page.total
                    );
                    state.cursor = PageCursor::from_page(&page);
                    state.next_offset = page.offset + page.limit;
                    state.items.extend(page.items);
                    state.error = None;
                }
                Err(e) => {
                    // Retain loaded pages and has_more so retry works.
                    state.error = Some(e);
                }
            }
            state.loading_more = false;
        }))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Fake server over `total` numbered items, honoring offset/limit.
    fn numbered_fetch(
        total: u64,
    ) -> impl Fn(String, u64, u64) -> BoxFuture<'static, Result<Page<u64>, ApiError>> {
        move |_filter, offset, limit| {
            Box::pin(async move {
                let end = (offset + limit).min(total);
                Ok(Page {
                    items: (offset..end).collect(),
                    offset,
                    limit,
                    total,
                })
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_to_exhaustion_matches_total() {
        // total=45, limit=20: pages of 20, 20, 5.
        let loader = CollectionLoader::new("all".to_string(), 20, numbered_fetch(45));

        loader.refresh().await.unwrap();
        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 20);
        assert!(snap.cursor.has_more);

        loader.load_more().unwrap().await.unwrap();
        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 40);
        assert!(snap.cursor.has_more);

        loader.load_more().unwrap().await.unwrap();
        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 45);
        assert!(!snap.cursor.has_more);

        // Exhausted: further calls are no-ops.
        assert!(loader.load_more().is_none());

        // No duplicates, insertion order preserved.
        let expected: Vec<u64> = (0..45).collect();
        assert_eq!(snap.items, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn second_load_more_while_in_flight_is_ignored() {
        let loader = CollectionLoader::new(
            "all".to_string(),
            20,
            move |_f: String, offset, limit| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let total = 45;
                let end = (offset + limit).min(total);
                Ok(Page {
                    items: (offset..end).collect::<Vec<u64>>(),
                    offset,
                    limit,
                    total,
                })
            },
        );

        loader.refresh().await.unwrap();
        let first = loader.load_more().unwrap();
        // Second call while the first is in flight: ignored, not queued.
        assert!(loader.load_more().is_none());
        first.await.unwrap();

        assert_eq!(loader.snapshot().items.len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_replaces_dataset() {
        let loader = CollectionLoader::new(
            "cosmic".to_string(),
            10,
            |filter: String, offset, limit| async move {
                let items: Vec<String> =
                    (offset..offset + limit).map(|i| format!("{filter}-{i}")).collect();
                Ok(Page {
                    items,
                    offset,
                    limit,
                    total: 30,
                })
            },
        );

        loader.refresh().await.unwrap();
        loader.load_more().unwrap().await.unwrap();
        assert_eq!(loader.snapshot().items.len(), 20);

        loader
            .set_filter("organic".to_string())
            .unwrap()
            .await
            .unwrap();

        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 10, "replaced, not merged");
        assert!(snap.items.iter().all(|i| i.starts_with("organic-")));
        assert_eq!(snap.cursor.offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn setting_same_filter_is_noop() {
        let loader = CollectionLoader::new("x".to_string(), 10, numbered_fetch(5));
        assert!(loader.set_filter("x".to_string()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_filter_changes_keep_only_latest() {
        // Filter "a" responds slowly, filter "b" quickly: "a" lands after
        // "b" and must be discarded entirely.
        let loader = CollectionLoader::new(
            String::new(),
            10,
            |filter: String, offset, limit| async move {
                let delay = if filter == "a" { 80 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Page {
                    items: vec![filter],
                    offset,
                    limit,
                    total: 1,
                })
            },
        );

        let h_a = loader.set_filter("a".to_string()).unwrap();
        let h_b = loader.set_filter("b".to_string()).unwrap();
        h_b.await.unwrap();
        h_a.await.unwrap();

        let snap = loader.snapshot();
        assert_eq!(snap.items, vec!["b".to_string()], "no mixture of a and b");
        assert!(!snap.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_invalidates_in_flight_load_more() {
        let loader = CollectionLoader::new(
            "old".to_string(),
            10,
            |filter: String, offset, limit| async move {
                if offset > 0 {
                    // The append for the old filter is slow.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                let items: Vec<String> =
                    (offset..offset + limit).map(|i| format!("{filter}-{i}")).collect();
                Ok(Page {
                    items,
                    offset,
                    limit,
                    total: 40,
                })
            },
        );

        loader.refresh().await.unwrap();
        let more = loader.load_more().unwrap();
        let replaced = loader.set_filter("new".to_string()).unwrap();
        replaced.await.unwrap();
        more.await.unwrap();

        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 10);
        assert!(snap.items.iter().all(|i| i.starts_with("new-")));
        assert!(!snap.loading_more);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_load_more_keeps_loader_usable() {
        let loader = CollectionLoader::new(
            "all".to_string(),
            20,
            move |_f: String, offset, limit| async move {
                if offset > 0 {
                    // The append is the slow request here.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                let total = 45;
                let end = (offset + limit).min(total);
                Ok(Page {
                    items: (offset..end).collect::<Vec<u64>>(),
                    offset,
                    limit,
                    total,
                })
            },
        );

        loader.refresh().await.unwrap();
        let more = loader.load_more().unwrap();
        // Refresh supersedes the in-flight append.
        let refreshed = loader.refresh();
        refreshed.await.unwrap();
        more.await.unwrap();

        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 20, "append was discarded, not applied");
        assert!(!snap.loading_more, "no load_more is in flight anymore");
        assert!(snap.cursor.has_more);

        // Pagination still works after the superseded append.
        loader.load_more().unwrap().await.unwrap();
        assert_eq!(loader.snapshot().items.len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_failure_retains_pages_and_allows_retry() {
        let fail_once = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&fail_once);
        let loader = CollectionLoader::new(
            "all".to_string(),
            20,
            move |_f: String, offset, limit| {
                let flag = Arc::clone(&flag);
                async move {
                    if offset > 0 && flag.swap(false, Ordering::SeqCst) {
                        return Err(ApiError::Server {
                            status: 503,
                            message: "unavailable".into(),
                        });
                    }
                    let total = 45;
                    let end = (offset + limit).min(total);
                    Ok(Page {
                        items: (offset..end).collect::<Vec<u64>>(),
                        offset,
                        limit,
                        total,
                    })
                }
            },
        );

        loader.refresh().await.unwrap();
        loader.load_more().unwrap().await.unwrap();

        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 20, "loaded pages retained");
        assert!(snap.error.is_some());
        assert!(snap.cursor.has_more, "has_more untouched for retry");

        // Retry succeeds and appends where it left off.
        loader.load_more().unwrap().await.unwrap();
        let snap = loader.snapshot();
        assert_eq!(snap.items.len(), 40);
        assert!(snap.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn first_page_failure_yields_empty_items() {
        let loader = CollectionLoader::new("all".to_string(), 20, |_f: String, _o, _l| async {
            Err::<Page<u64>, _>(ApiError::Network("timed out".into()))
        });
        loader.refresh().await.unwrap();

        let snap = loader.snapshot();
        assert!(snap.items.is_empty(), "never absent, empty on error");
        assert!(snap.error.is_some());
        assert!(!snap.cursor.has_more);
    }
}
