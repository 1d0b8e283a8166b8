// src/client/cache.rs
//
// Response cache keyed by (resource, query string). Fresh entries are served
// as is; stale ones are served while a single background refetch runs, and
// concurrent misses for the same key share one request. Entries nobody has
// read for `gc_after` are swept whenever a new result is stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::Mutex;

use super::ClientError;

/// Time source; swapped for a manual clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource: String,
    pub query: String,
}

impl CacheKey {
    pub fn new(resource: impl Into<String>, query: impl Into<String>) -> Self {
        Self { resource: resource.into(), query: query.into() }
    }
}

type FetchResult = Result<Value, ClientError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Unread entries older than this are dropped.
pub const DEFAULT_GC_AFTER: Duration = Duration::from_secs(10 * 60);

struct Entry {
    value: Value,
    fetched_at: Instant,
    last_read: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, SharedFetch>,
}

struct Inner {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    gc_after: Duration,
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_gc(clock, DEFAULT_GC_AFTER)
    }

    pub fn with_gc(clock: Arc<dyn Clock>, gc_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner { state: Mutex::new(State::default()), clock, gc_after }),
        }
    }

    /// Cached value for `key`.
    ///
    /// - fresh (younger than `stale_after`): returned without fetching;
    /// - stale: returned immediately, and one background refetch is started;
    /// - missing: fetched, joining a fetch already in flight for the key.
    ///
    /// Failed fetches are never cached.
    pub async fn get<F, Fut>(&self, key: CacheKey, stale_after: Duration, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let mut state = self.inner.state.lock().await;
        let now = self.inner.clock.now();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.last_read = now;
            let age = now.saturating_duration_since(entry.fetched_at);
            let value = entry.value.clone();
            if age < stale_after {
                return Ok(value);
            }
            if !state.in_flight.contains_key(&key) {
                let revalidate = self.start(&mut state, key, fetch());
                tokio::spawn(async move {
                    if let Err(e) = revalidate.await {
                        tracing::warn!(error = %e, "background refresh failed");
                    }
                });
            }
            return Ok(value);
        }

        let pending = match state.in_flight.get(&key) {
            Some(f) => f.clone(),
            None => self.start(&mut state, key, fetch()),
        };
        drop(state);
        pending.await
    }

    /// Fetch regardless of freshness, joining a fetch already in flight.
    pub async fn refresh<F, Fut>(&self, key: CacheKey, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let mut state = self.inner.state.lock().await;
        let pending = match state.in_flight.get(&key) {
            Some(f) => f.clone(),
            None => self.start(&mut state, key, fetch()),
        };
        drop(state);
        pending.await
    }

    /// Register a fetch for `key`; its result lands in the cache when done.
    fn start<Fut>(&self, state: &mut State, key: CacheKey, fut: Fut) -> SharedFetch
    where
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let k = key.clone();
        let shared = async move {
            let result = fut.await;
            let mut state = inner.state.lock().await;
            state.in_flight.remove(&k);
            if let Ok(value) = &result {
                let now = inner.clock.now();
                let gc_after = inner.gc_after;
                state
                    .entries
                    .retain(|_, e| now.saturating_duration_since(e.last_read) < gc_after);
                state.entries.insert(k, Entry { value: value.clone(), fetched_at: now, last_read: now });
            }
            result
        }
        .boxed()
        .shared();
        state.in_flight.insert(key, shared.clone());
        shared
    }

    /// Drop every entry of a resource, whatever its query.
    pub async fn invalidate(&self, resource: &str) {
        let mut state = self.inner.state.lock().await;
        state.entries.retain(|k, _| k.resource != resource);
    }

    pub async fn clear(&self) {
        self.inner.state.lock().await.entries.clear();
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().await.entries.contains_key(key)
    }
}
