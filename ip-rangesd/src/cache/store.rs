use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use crate::cache::digest::compute_digest;

/// A cached upstream document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Raw upstream body
    pub body: Bytes,

    pub stored_at: DateTime<Utc>,

    /// TTL declared when the entry was stored
    pub ttl: Duration,

    pub digest: String,
}

impl CacheEntry {
    pub fn new(body: Bytes, ttl: Duration) -> Self {
        Self::with_stored_at(body, ttl, Utc::now())
    }

    pub fn with_stored_at(body: Bytes, ttl: Duration, stored_at: DateTime<Utc>) -> Self {
        let digest = compute_digest(&body);
        Self {
            body,
            stored_at,
            ttl,
            digest,
        }
    }

    /// Time since the entry was stored; clock skew into the future counts as zero
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }
}

/// Shared cache keyed by upstream URL.
///
/// Stores never evict on their own: an expired entry stays readable until a
/// `put` replaces it, so freshness is decided by the caller.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;
}

/// Process-local store
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}
