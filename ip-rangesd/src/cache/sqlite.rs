use std::thread;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use crate::cache::db::CacheDb;
use crate::cache::store::{CacheEntry, CacheStore};

/// Commands sent to the cache thread
enum CacheCommand {
    Get(String, oneshot::Sender<Result<Option<CacheEntry>>>),
    Put(String, CacheEntry, oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Persistent store. The SQLite connection lives on a dedicated thread and
/// is driven through a command channel, so the async side never blocks on disk.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<CacheCommand>,
}

impl SqliteStore {
    /// Spawn a new cache thread with the given database
    pub fn spawn(db: CacheDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<CacheCommand>(64);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    CacheCommand::Get(key, reply) => {
                        let _ = reply.send(db.get_entry(&key));
                    }
                    CacheCommand::Put(key, entry, reply) => {
                        let result = db.put_entry(&key, &entry);
                        if result.is_ok() {
                            tracing::debug!("Persisted cache entry for {} ({})", key, entry.digest);
                        }
                        let _ = reply.send(result);
                    }
                    CacheCommand::Shutdown => {
                        tracing::info!("Cache thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Shutdown the cache thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(CacheCommand::Shutdown).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CacheCommand::Get(key.to_string(), reply)).await?;
        rx.await?
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CacheCommand::Put(key.to_string(), entry, reply)).await?;
        rx.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_round_trip_through_thread() {
        let store = SqliteStore::spawn(CacheDb::open(":memory:").unwrap());
        let entry = CacheEntry::new(Bytes::from_static(b"{}"), Duration::from_secs(60));

        assert!(store.get("k").await.unwrap().is_none());
        store.put("k", entry.clone()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let store = SqliteStore::spawn(CacheDb::open(":memory:").unwrap());
        store.shutdown().await.unwrap();

        // The thread drops its receiver once it exits the loop
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("k").await.is_err());
    }
}
