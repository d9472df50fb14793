//! Time-bounded, fail-soft cache of the product catalog
//!
//! Provides a `CatalogCache` that serves the last fetched snapshot while it is
//! within its TTL, refetches when it goes stale, and falls back to the previous
//! snapshot (or an empty one) when a fetch fails. Concurrent callers share a
//! single in-flight fetch instead of each issuing their own request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::data::{normalize, FetchError, Product, ProductSource, Products};

/// Default time-to-live for a catalog snapshot (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// How long a snapshot is served without refetching
    pub ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Observable state of the cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing has been fetched successfully yet
    Empty,
    /// The snapshot is within its TTL
    Fresh,
    /// The snapshot is older than its TTL
    Stale,
}

/// What a refresh did to the cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetch succeeded and replaced the snapshot
    Updated,
    /// The fetch failed; the previous snapshot (or an empty one) was kept
    KeptPrevious,
}

/// Result of a refresh, as delivered to whoever asked for it
#[derive(Debug, Clone)]
pub struct Refreshed {
    /// The snapshot now being served
    pub products: Products,
    /// Whether the snapshot was replaced
    pub outcome: RefreshOutcome,
}

/// The cached snapshot; replaced wholesale, never merged
#[derive(Debug, Default)]
struct CacheEntry {
    data: Option<Products>,
    /// Monotonic fetch time, used for TTL checks
    fetched_at: Option<Instant>,
    /// Wall-clock fetch time, for display
    cached_at: Option<DateTime<Utc>>,
}

type PendingRefresh = Shared<BoxFuture<'static, Refreshed>>;

struct Inner {
    source: Box<dyn ProductSource>,
    ttl: Duration,
    entry: RwLock<CacheEntry>,
    in_flight: Mutex<Option<PendingRefresh>>,
}

/// Handle to the catalog cache
///
/// Cloning is cheap and every clone shares the same entry, so one handle can
/// go to the read path and another to the refresh task.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("ttl", &self.inner.ttl)
            .field("state", &self.state())
            .finish()
    }
}

impl CatalogCache {
    /// Creates an empty cache that fetches from `source`
    pub fn new<S: ProductSource>(source: S, config: CatalogConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Box::new(source),
                ttl: config.ttl,
                entry: RwLock::new(CacheEntry::default()),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Returns the current products, fetching first if the cache is empty or stale
    ///
    /// Never fails: a failed fetch yields the previous snapshot, or an empty
    /// list if nothing has been fetched yet.
    pub async fn get_products(&self) -> Products {
        if let Some(products) = self.fresh_snapshot() {
            debug!(count = products.len(), "catalog cache hit");
            return products;
        }

        let pending = {
            let mut in_flight = lock(&self.inner.in_flight);
            // A fetch may have finished since the check above
            if in_flight.is_none() {
                if let Some(products) = self.fresh_snapshot() {
                    return products;
                }
            }
            self.join_or_start(&mut in_flight)
        };
        pending.await.products
    }

    /// Fetches regardless of freshness
    ///
    /// Joins the in-flight fetch if there is one.
    pub async fn refresh(&self) -> Refreshed {
        let pending = self.join_or_start(&mut lock(&self.inner.in_flight));
        pending.await
    }

    /// The snapshot currently held, without any I/O
    pub fn snapshot(&self) -> Products {
        self.inner.current()
    }

    /// When the current snapshot was fetched, if any
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        read(&self.inner.entry).cached_at
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Current cache state
    pub fn state(&self) -> CacheState {
        let entry = read(&self.inner.entry);
        match entry.fetched_at {
            None => CacheState::Empty,
            Some(at) if at.elapsed() < self.inner.ttl => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    /// Whether the snapshot is within its TTL
    pub fn is_fresh(&self) -> bool {
        self.state() == CacheState::Fresh
    }

    fn fresh_snapshot(&self) -> Option<Products> {
        let entry = read(&self.inner.entry);
        match (&entry.data, entry.fetched_at) {
            (Some(data), Some(at)) if at.elapsed() < self.inner.ttl => Some(Arc::clone(data)),
            _ => None,
        }
    }

    /// Returns the in-flight fetch, starting one if none is pending
    ///
    /// Takes the locked in-flight slot. The fetch runs as its own task and
    /// completes even if every caller stops waiting.
    fn join_or_start(&self, in_flight: &mut Option<PendingRefresh>) -> PendingRefresh {
        if let Some(pending) = in_flight.as_ref() {
            debug!("joining in-flight catalog fetch");
            return pending.clone();
        }

        // The task clears the slot under the same lock, so it cannot run
        // before the slot below is filled.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let refreshed = inner.fetch_and_store().await;
            *lock(&inner.in_flight) = None;
            refreshed
        });

        let fallback = Arc::clone(&self.inner);
        let pending = async move {
            match task.await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    *lock(&fallback.in_flight) = None;
                    let products = fallback.current();
                    warn!(
                        error = %e,
                        serving = products.len(),
                        "catalog fetch task failed, keeping previous snapshot"
                    );
                    Refreshed {
                        products,
                        outcome: RefreshOutcome::KeptPrevious,
                    }
                }
            }
        }
        .boxed()
        .shared();

        *in_flight = Some(pending.clone());
        pending
    }
}

impl Inner {
    fn current(&self) -> Products {
        read(&self.entry).data.clone().unwrap_or_default()
    }

    async fn fetch_products(&self) -> Result<Vec<Product>, FetchError> {
        let body = self.source.fetch_body().await?;
        Ok(normalize(&body)?)
    }

    async fn fetch_and_store(&self) -> Refreshed {
        match self.fetch_products().await {
            Ok(products) => {
                let products: Products = Arc::new(products);
                *write(&self.entry) = CacheEntry {
                    data: Some(Arc::clone(&products)),
                    fetched_at: Some(Instant::now()),
                    cached_at: Some(Utc::now()),
                };
                info!(count = products.len(), "catalog snapshot replaced");
                Refreshed {
                    products,
                    outcome: RefreshOutcome::Updated,
                }
            }
            Err(err) => {
                let products = self.current();
                warn!(
                    error = %err,
                    serving = products.len(),
                    "catalog fetch failed, keeping previous snapshot"
                );
                Refreshed {
                    products,
                    outcome: RefreshOutcome::KeptPrevious,
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Category;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that replays canned responses and counts fetches
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<String, FetchError>>>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl ProductSource for ScriptedSource {
        fn fetch_body(&self) -> BoxFuture<'_, Result<String, FetchError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                lock(&self.responses)
                    .pop_front()
                    .unwrap_or(Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)))
            }
            .boxed()
        }
    }

    fn sheet_body(ids: &[&str]) -> String {
        let rows: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"{{"c":[{{"v":"{id}"}},{{"v":"Item {id}"}},{{"v":"Balloons"}},null,{{"v":2.5}}]}}"#
                )
            })
            .collect();
        format!(
            "/*O_o*/\ngoogle.visualization.Query.setResponse({{\"table\":{{\"rows\":[{}]}}}});",
            rows.join(",")
        )
    }

    fn cache_with(
        responses: Vec<Result<String, FetchError>>,
        delay: Duration,
    ) -> (CatalogCache, Arc<AtomicUsize>) {
        cache_with_ttl(responses, delay, DEFAULT_TTL)
    }

    fn cache_with_ttl(
        responses: Vec<Result<String, FetchError>>,
        delay: Duration,
        ttl: Duration,
    ) -> (CatalogCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            responses: Mutex::new(responses.into()),
            calls: Arc::clone(&calls),
            delay,
        };
        (CatalogCache::new(source, CatalogConfig { ttl }), calls)
    }

    fn ids(products: &Products) -> Vec<&str> {
        products.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_fetches_and_normalizes() {
        let (cache, calls) = cache_with(vec![Ok(sheet_body(&["a", "b"]))], Duration::ZERO);
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(cache.fetched_at().is_none());

        let products = cache.get_products().await;

        assert_eq!(ids(&products), vec!["a", "b"]);
        assert_eq!(products[0].category, Category::Balloons);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), CacheState::Fresh);
        assert!(cache.fetched_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cache_serves_identical_snapshot() {
        let (cache, calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b"]))],
            Duration::ZERO,
        );

        let first = cache.get_products().await;
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = cache.get_products().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cache_refetches() {
        let (cache, calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b", "c"]))],
            Duration::ZERO,
        );

        cache.get_products().await;
        tokio::time::advance(DEFAULT_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.state(), CacheState::Stale);

        let products = cache.get_products().await;

        assert_eq!(ids(&products), vec!["b", "c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.state(), CacheState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let (cache, _calls) = cache_with(
            vec![
                Ok(sheet_body(&["d1"])),
                Err(FetchError::Status(StatusCode::BAD_GATEWAY)),
            ],
            Duration::ZERO,
        );

        let warm = cache.get_products().await;
        tokio::time::advance(DEFAULT_TTL).await;

        let refreshed = cache.refresh().await;
        assert_eq!(refreshed.outcome, RefreshOutcome::KeptPrevious);
        assert!(Arc::ptr_eq(&refreshed.products, &warm));

        let after = cache.get_products().await;
        assert!(Arc::ptr_eq(&after, &warm));
        assert_eq!(cache.state(), CacheState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_with_empty_cache_returns_empty() {
        let (cache, calls) = cache_with(vec![], Duration::ZERO);

        let products = cache.get_products().await;

        assert!(products.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), CacheState::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_envelope_is_swallowed() {
        let (cache, _calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok("{}".to_string())],
            Duration::ZERO,
        );

        let warm = cache.get_products().await;
        let refreshed = cache.refresh().await;

        assert_eq!(refreshed.outcome, RefreshOutcome::KeptPrevious);
        assert!(Arc::ptr_eq(&cache.snapshot(), &warm));
        assert_eq!(ids(&cache.snapshot()), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let (cache, calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b"]))],
            Duration::from_secs(2),
        );

        let (one, two, three) = futures::join!(
            cache.get_products(),
            cache.get_products(),
            cache.refresh()
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&one, &two));
        assert!(Arc::ptr_eq(&one, &three.products));
        assert_eq!(three.outcome, RefreshOutcome::Updated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_after_in_flight_completes_is_new() {
        let (cache, calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b"]))],
            Duration::ZERO,
        );

        cache.refresh().await;
        let second = cache.refresh().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ids(&second.products), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ignores_freshness() {
        let (cache, calls) = cache_with(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b"]))],
            Duration::ZERO,
        );

        cache.get_products().await;
        assert!(cache.is_fresh());
        let refreshed = cache.refresh().await;

        assert_eq!(refreshed.outcome, RefreshOutcome::Updated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ids(&cache.get_products().await), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_does_no_io() {
        let (cache, calls) = cache_with(vec![Ok(sheet_body(&["a"]))], Duration::ZERO);

        assert!(cache.snapshot().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_completes_after_callers_give_up() {
        let (cache, calls) = cache_with(vec![Ok(sheet_body(&["a"]))], Duration::from_secs(2));

        let waited = tokio::time::timeout(Duration::from_secs(1), cache.get_products()).await;
        assert!(waited.is_err(), "caller should time out before the fetch finishes");

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), CacheState::Fresh);
        assert_eq!(ids(&cache.snapshot()), vec!["a"]);

        // The finished fetch cleared the in-flight slot and is served from cache
        let products = cache.get_products().await;
        assert_eq!(ids(&products), vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stale_readers_across_threads_fetch_once() {
        let (cache, calls) = cache_with_ttl(
            vec![Ok(sheet_body(&["a"])), Ok(sheet_body(&["b"]))],
            Duration::ZERO,
            Duration::from_secs(1),
        );

        cache.get_products().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.state(), CacheState::Stale);

        let readers: Vec<_> = (0..64)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_products().await })
            })
            .collect();
        for reader in readers {
            let products = reader.await.expect("reader task panicked");
            assert_eq!(ids(&products), vec!["b"]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_catalog_config_default() {
        let config = CatalogConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
    }
}
