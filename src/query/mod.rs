//! Keyed, reference-counted query cache with deduplication, stale-while-
//! revalidate reads, retry with backoff and cancellation of unobserved
//! requests.
//!
//! Every key has at most one request in flight. Subscribers observe the
//! key's [`QueryState`] through a `watch` channel; dropping the last
//! [`QuerySubscription`] cancels the pending request and starts the
//! eviction clock for the entry.

mod retry;
mod state;

pub use retry::{ExponentialBackoff, RetryPolicy};
pub use state::{QueryKey, QueryKind, QueryState, QueryStatus};

use dashmap::{mapref::entry::Entry as MapEntry, DashMap};
use futures::{future::BoxFuture, FutureExt};
use itertools::Itertools;
use log::{debug, info, warn};
use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::metrics;

/// The request behind a key. Receives the token that aborts it.
pub type QueryFn<V> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<V, ApiError>> + Send + Sync>;

/// Wraps an async closure into a [`QueryFn`].
pub fn query_fn<V, F, Fut>(f: F) -> QueryFn<V>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
{
    Arc::new(move |cancel| f(cancel).boxed())
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Age after which a value is refetched on the next subscription.
    pub stale_time: Duration,
    /// How long an unobserved entry survives before `sweep` drops it.
    pub gc_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for QueryOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            stale_time: config.refresh_interval,
            gc_time: config.gc_interval(),
        }
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

struct CacheEntry<V> {
    state: watch::Sender<QueryState<V>>,
    fetcher: QueryFn<V>,
    subscribers: usize,
    in_flight: Option<InFlight>,
    next_generation: u64,
    unobserved_since: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(fetcher: QueryFn<V>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            state,
            fetcher,
            subscribers: 0,
            in_flight: None,
            next_generation: 0,
            unobserved_since: None,
        }
    }
}

struct Inner<V> {
    entries: DashMap<QueryKey, CacheEntry<V>>,
    policy: Arc<dyn RetryPolicy>,
    options: QueryOptions,
}

pub struct QueryClient<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryClient<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> QueryClient<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(options: QueryOptions, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                policy,
                options,
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            QueryOptions::from(config),
            Arc::new(ExponentialBackoff::from_config(config)),
        )
    }

    pub fn options(&self) -> &QueryOptions {
        &self.inner.options
    }

    /// Observes `key`, creating its entry on first use.
    ///
    /// A request starts when the entry has no fresh value and none is
    /// already in flight, so any number of subscribers in the same tick
    /// share one request. `fetcher` is ignored when the entry exists.
    pub fn subscribe(&self, key: QueryKey, fetcher: QueryFn<V>) -> QuerySubscription<V> {
        let mut inserted = false;
        let mut entry = match self.inner.entries.entry(key.clone()) {
            MapEntry::Occupied(occupied) => {
                metrics::record_cache_lookup(key.kind.as_str(), true);
                occupied.into_ref()
            }
            MapEntry::Vacant(vacant) => {
                metrics::record_cache_lookup(key.kind.as_str(), false);
                inserted = true;
                vacant.insert(CacheEntry::new(fetcher))
            }
        };

        entry.subscribers += 1;
        entry.unobserved_since = None;
        let receiver = entry.state.subscribe();

        let stale = entry
            .state
            .borrow()
            .is_stale(self.inner.options.stale_time, Instant::now());
        if stale {
            self.inner.start_fetch(&key, &mut entry);
        }
        drop(entry);

        // Counting walks every shard, so the entry guard must be gone.
        if inserted {
            metrics::record_cache_entries(key.kind.as_str(), self.len_of(key.kind));
        }

        QuerySubscription {
            key,
            receiver,
            client: self.clone(),
        }
    }

    /// Fetches `key` again regardless of freshness. No-op while a request
    /// is already in flight or when nobody observes the key.
    pub fn refetch(&self, key: &QueryKey) {
        if let Some(mut entry) = self.inner.entries.get_mut(key) {
            if entry.subscribers > 0 {
                self.inner.start_fetch(key, &mut entry);
            }
        }
    }

    /// Current state of `key` without subscribing to it.
    pub fn peek(&self, key: &QueryKey) -> Option<QueryState<V>> {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.state.borrow().clone())
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of cached entries of `kind`.
    pub fn len_of(&self, kind: QueryKind) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .count()
    }

    /// Drops entries nobody has observed for longer than `gc_time`.
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let gc_time = self.inner.options.gc_time;
        let mut evicted = Vec::new();

        self.inner.entries.retain(|key, entry| {
            let expired = entry.subscribers == 0
                && entry
                    .unobserved_since
                    .map_or(false, |since| now.duration_since(since) > gc_time);
            if expired {
                evicted.push(key.kind);
            }
            !expired
        });

        let remaining = self.inner.entries.len();
        for (kind, count) in evicted.iter().counts() {
            metrics::record_evictions(kind.as_str(), count);
            metrics::record_cache_entries(kind.as_str(), self.len_of(*kind));
        }
        if !evicted.is_empty() {
            debug!(
                "Evicted {} unobserved queries, {} remain",
                evicted.len(),
                remaining
            );
        }
        evicted.len()
    }

    /// Runs [`sweep`](Self::sweep) every `period` until the client is dropped.
    pub fn spawn_gc(&self, period: Duration) -> JoinHandle<()> {
        let inner: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = inner.upgrade() else { break };
                QueryClient { inner }.sweep();
            }
        })
    }

    /// Refetches `key` every `period` until the client is dropped. Ticks
    /// while nobody observes the key are skipped.
    pub fn spawn_refetch_interval(&self, key: QueryKey, period: Duration) -> JoinHandle<()> {
        let inner: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = inner.upgrade() else { break };
                debug!("Refreshing {}", key);
                QueryClient { inner }.refetch(&key);
            }
        })
    }

    fn unsubscribe(&self, key: &QueryKey) {
        let Some(mut entry) = self.inner.entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers > 0 {
            return;
        }

        entry.unobserved_since = Some(Instant::now());
        if let Some(in_flight) = entry.in_flight.take() {
            in_flight.cancel.cancel();
            entry.state.send_modify(|state| state.is_fetching = false);
            debug!("Cancelled unobserved query {}", key);
        }
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn start_fetch(self: &Arc<Self>, key: &QueryKey, entry: &mut CacheEntry<V>) {
        if entry.in_flight.is_some() {
            return;
        }

        let generation = entry.next_generation;
        entry.next_generation += 1;
        let cancel = CancellationToken::new();
        entry.in_flight = Some(InFlight {
            generation,
            cancel: cancel.clone(),
        });
        entry.state.send_modify(|state| {
            state.is_fetching = true;
            state.failure_count = 0;
            if state.updated_at.is_none() {
                state.status = QueryStatus::Pending;
                state.error = None;
            }
        });

        debug!("Fetching {}", key);
        tokio::spawn(Arc::clone(self).run(
            key.clone(),
            generation,
            cancel,
            Arc::clone(&entry.fetcher),
        ));
    }

    async fn run(
        self: Arc<Self>,
        key: QueryKey,
        generation: u64,
        cancel: CancellationToken,
        fetcher: QueryFn<V>,
    ) {
        let mut failure_count = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = fetcher(cancel.clone()) => result,
            };

            let error = match result {
                Ok(value) => {
                    self.finish(&key, generation, Ok(value));
                    return;
                }
                Err(_) if cancel.is_cancelled() => return,
                Err(error) => error,
            };

            failure_count += 1;
            if !self.policy.should_retry(&error, failure_count) {
                warn!("Query {} failed: {}", key, error);
                self.finish(&key, generation, Err((error, failure_count)));
                return;
            }

            let delay = self.policy.delay_for_attempt(failure_count);
            info!(
                "Query {} failed ({}), retry {} in {:?}",
                key, error, failure_count, delay
            );
            metrics::record_retry(key.kind.as_str());
            if !self.update_if_current(&key, generation, |state| {
                state.failure_count = failure_count;
            }) {
                return;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Applies `update` only while `generation` is still the key's request.
    fn update_if_current(
        &self,
        key: &QueryKey,
        generation: u64,
        update: impl FnOnce(&mut QueryState<V>),
    ) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        let current = entry
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| in_flight.generation == generation);
        if current {
            entry.state.send_modify(update);
        }
        current
    }

    fn finish(&self, key: &QueryKey, generation: u64, result: Result<V, (ApiError, u32)>) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };
        let current = entry
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| in_flight.generation == generation);
        if !current {
            return;
        }
        entry.in_flight = None;

        entry.state.send_modify(|state| {
            state.is_fetching = false;
            match result {
                Ok(value) => {
                    state.status = QueryStatus::Success;
                    state.data = Some(value);
                    state.error = None;
                    state.failure_count = 0;
                    state.updated_at = Some(Instant::now());
                }
                Err((error, failure_count)) => {
                    state.status = QueryStatus::Error;
                    state.error = Some(error);
                    state.failure_count = failure_count;
                }
            }
        });
    }
}

/// A live observation of one key. Dropping it unsubscribes.
pub struct QuerySubscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    key: QueryKey,
    receiver: watch::Receiver<QueryState<V>>,
    client: QueryClient<V>,
}

impl<V> QuerySubscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<V> {
        self.receiver.borrow().clone()
    }

    pub fn value(&self) -> Option<V> {
        self.receiver.borrow().data.clone()
    }

    pub fn error(&self) -> Option<ApiError> {
        self.receiver.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.borrow().is_loading()
    }

    pub fn is_fetching(&self) -> bool {
        self.receiver.borrow().is_fetching
    }

    pub fn refetch(&self) {
        self.client.refetch(&self.key);
    }

    /// Waits for the next state change of this key.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Waits until no request is in flight and returns that state.
    pub async fn settled(&mut self) -> QueryState<V> {
        loop {
            {
                let state = self.receiver.borrow_and_update();
                if !state.is_fetching {
                    return state.clone();
                }
            }
            if self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }
}

impl<V> Drop for QuerySubscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.client.unsubscribe(&self.key);
    }
}
