//! Cache gateway in front of the upstream fetcher.
//!
//! Serves the stored upstream document while it is younger than the TTL and
//! refreshes it otherwise. A refresh runs as its own tracked task: concurrent
//! callers share it, it keeps running if the caller goes away, and the store
//! write happens in a second tracked task so no request waits on it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use shared::types::Dataset;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use crate::cache::{CacheEntry, CacheStore};
use crate::config::StalePolicy;
use crate::upstream::document::parse_dataset;
use crate::upstream::{FetchError, Upstream};

#[derive(Error, Debug, Clone)]
pub enum Unavailable {
    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("refresh task failed: {0}")]
    Task(String),
}

/// How a dataset was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Expired copy served because the refresh failed
    Stale,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: Arc<Dataset>,
    pub status: CacheStatus,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<Dataset>, Unavailable>>>;

#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    current: Option<RefreshFuture>,
}

struct GatewayInner {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    ttl: Duration,
    stale_policy: StalePolicy,
    tasks: TaskTracker,
    refresh: Mutex<RefreshSlot>,
    /// Last decoded body, keyed by digest
    decoded: Mutex<Option<(String, Arc<Dataset>)>>,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Gateway {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn Upstream>,
        ttl: Duration,
        stale_policy: StalePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                store,
                upstream,
                ttl,
                stale_policy,
                tasks: TaskTracker::new(),
                refresh: Mutex::new(RefreshSlot::default()),
                decoded: Mutex::new(None),
            }),
        }
    }

    /// Cache key: the canonical upstream URL
    pub fn source_url(&self) -> &str {
        self.inner.upstream.source_url()
    }

    pub async fn dataset(&self) -> Result<Snapshot, Unavailable> {
        let key = self.source_url();

        let cached = match self.inner.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cache read failed for {}, treating as miss: {:#}", key, e);
                None
            }
        };

        if let Some(entry) = &cached {
            if entry.is_fresh(Utc::now()) {
                tracing::debug!("Cache hit for {} (age {:?})", key, entry.age(Utc::now()));
                return Ok(Snapshot {
                    dataset: self.decode(entry),
                    status: CacheStatus::Hit,
                });
            }
            tracing::info!("Cached copy of {} expired, refreshing", key);
        }

        let err = match self.refresh().await {
            Ok(dataset) => {
                return Ok(Snapshot {
                    dataset,
                    status: CacheStatus::Miss,
                })
            }
            Err(e) => e,
        };

        match (cached, self.inner.stale_policy) {
            (Some(entry), StalePolicy::ServeStale) => {
                tracing::warn!(
                    "Refresh of {} failed, serving copy aged {:?}: {}",
                    key,
                    entry.age(Utc::now()),
                    err
                );
                Ok(Snapshot {
                    dataset: self.decode(&entry),
                    status: CacheStatus::Stale,
                })
            }
            (Some(_), StalePolicy::Strict) => {
                tracing::error!("Refresh of {} failed, expired copy withheld: {}", key, err);
                Err(err)
            }
            (None, _) => {
                tracing::error!("Refresh of {} failed with nothing cached: {}", key, err);
                Err(err)
            }
        }
    }

    /// Wait for every refresh and cache write spawned so far
    pub async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Join the in-flight refresh or start one
    fn refresh(&self) -> RefreshFuture {
        let mut slot = lock(&self.inner.refresh);
        if let Some(current) = &slot.current {
            tracing::debug!("Joining in-flight refresh of {}", self.source_url());
            return current.clone();
        }

        slot.generation += 1;
        let generation = slot.generation;
        let gateway = self.clone();
        let handle = self
            .inner
            .tasks
            .spawn(async move { gateway.run_refresh(generation).await });

        let future = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Unavailable::Task(e.to_string())))
        }
        .boxed()
        .shared();

        slot.current = Some(future.clone());
        future
    }

    async fn run_refresh(self, generation: u64) -> Result<Arc<Dataset>, Unavailable> {
        let key = self.source_url().to_string();

        let document = match self.inner.upstream.fetch().await {
            Ok(document) => document,
            Err(e) => {
                self.clear_refresh(generation);
                return Err(e.into());
            }
        };

        let entry = CacheEntry::new(document.body, self.inner.ttl);
        let dataset = Arc::new(document.dataset);
        tracing::info!(
            "Refreshed {}: {} IPv4 and {} IPv6 prefixes, createDate {:?}, syncToken {:?}",
            key,
            dataset.ipv4.len(),
            dataset.ipv6.len(),
            dataset.generated_at,
            dataset.sync_token
        );
        self.remember(&entry.digest, dataset.clone());

        // Joiners keep getting this result until the entry is readable from the store
        let gateway = self.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = gateway.inner.store.put(&key, entry).await {
                tracing::error!("Failed to store cache entry for {}: {:#}", key, e);
            }
            gateway.clear_refresh(generation);
        });

        Ok(dataset)
    }

    fn clear_refresh(&self, generation: u64) {
        let mut slot = lock(&self.inner.refresh);
        if slot.generation == generation {
            slot.current = None;
        }
    }

    fn decode(&self, entry: &CacheEntry) -> Arc<Dataset> {
        if let Some((digest, dataset)) = lock(&self.inner.decoded).as_ref() {
            if *digest == entry.digest {
                return dataset.clone();
            }
        }

        let dataset = Arc::new(parse_dataset(&entry.body));
        self.remember(&entry.digest, dataset.clone());
        dataset
    }

    fn remember(&self, digest: &str, dataset: Arc<Dataset>) {
        let mut decoded = lock(&self.inner.decoded);
        match decoded.as_ref() {
            Some((previous, _)) if previous == digest => {
                tracing::debug!("Upstream document unchanged ({})", digest);
            }
            Some((previous, _)) => {
                tracing::info!("Upstream document changed: {} -> {}", previous, digest);
            }
            None => {}
        }
        *decoded = Some((digest.to_string(), dataset));
    }
}
