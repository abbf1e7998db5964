//! Record storage abstraction.
//!
//! The pipeline only ever reads members, by exact id or by a fuzzy name
//! fragment. [`RecordStore`] is the async seam the executor talks to.
//!
//! Synchronous backends implement [`BlockingRecordStore`] instead and are
//! wrapped in a [`WorkerPoolStore`], which runs every call on tokio's
//! blocking pool behind a semaphore. The semaphore is sized from
//! `store.worker_threads`, independently of how many chat requests are in
//! flight, so a slow store can never stall request intake.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::db;
use crate::models::Member;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Async, read-only access to member records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_id`](RecordStore::find_by_id) | Exact match on member id |
/// | [`find_by_name`](RecordStore::find_by_name) | Case-insensitive partial match on first or last name |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>>;

    /// Every member whose first or last name contains `fragment`.
    async fn find_by_name(&self, fragment: &str) -> Result<Vec<Member>>;
}

/// A synchronous store client. Never called directly from async code.
pub trait BlockingRecordStore: Send + Sync + 'static {
    fn find_by_id(&self, id: i64) -> Result<Option<Member>>;
    fn find_by_name(&self, fragment: &str) -> Result<Vec<Member>>;
}

/// Runs a [`BlockingRecordStore`] on a bounded set of blocking workers.
pub struct WorkerPoolStore<S> {
    inner: Arc<S>,
    permits: Arc<Semaphore>,
}

impl<S: BlockingRecordStore> WorkerPoolStore<S> {
    pub fn new(inner: S, workers: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        // Held until the blocking call returns, even if the caller gives up.
        let permit = self.permits.clone().acquire_owned().await?;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&inner)
        })
        .await?
    }
}

#[async_trait]
impl<S: BlockingRecordStore> RecordStore for WorkerPoolStore<S> {
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>> {
        self.run(move |s| s.find_by_id(id)).await
    }

    async fn find_by_name(&self, fragment: &str) -> Result<Vec<Member>> {
        let fragment = fragment.to_string();
        self.run(move |s| s.find_by_name(&fragment)).await
    }
}

/// Open the record store selected by `store.backend`.
pub async fn open(config: &Config) -> Result<Arc<dyn RecordStore>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let pool = db::connect(config).await?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        "memory" => {
            let path = config
                .store
                .fixture
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.fixture is required for the memory backend"))?;
            let store = InMemoryStore::from_fixture(path)?;
            tracing::info!(members = store.len(), fixture = %path.display(), "loaded in-memory store");
            Ok(Arc::new(WorkerPoolStore::new(
                store,
                config.store.worker_threads,
            )))
        }
        other => anyhow::bail!("Unknown store backend: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps on every call and records the peak number of concurrent calls.
    struct SlowStore {
        current: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    impl BlockingRecordStore for SlowStore {
        fn find_by_id(&self, id: i64) -> Result<Option<Member>> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(Member {
                member_id: id,
                first_name: None,
                last_name: None,
                email: None,
                detail: None,
            }))
        }

        fn find_by_name(&self, _fragment: &str) -> Result<Vec<Member>> {
            Ok(vec![])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_bounds_concurrency() {
        let peak = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(WorkerPoolStore::new(
            SlowStore {
                current: AtomicUsize::new(0),
                peak: peak.clone(),
            },
            2,
        ));

        let mut handles = Vec::new();
        for id in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.find_by_id(id).await }));
        }
        for (id, h) in handles.into_iter().enumerate() {
            let member = h.await.unwrap().unwrap().unwrap();
            assert_eq!(member.member_id, id as i64);
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "pool exceeded its bound");
    }
}
