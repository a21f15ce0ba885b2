//! Instrumented adapter for store tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tabius_storage::{AdapterKind, InMemoryAdapter, StorageAdapter, StorageError, StorageResult};
use tabius_types::{KeyValue, Value};
use tokio::sync::Notify;

/// Wraps [`InMemoryAdapter`], counting calls and injecting delays and
/// failures.
#[derive(Default)]
pub(crate) struct RecordingAdapter {
    inner: InMemoryAdapter,
    pub(crate) gets: AtomicUsize,
    pub(crate) sets: AtomicUsize,
    pub(crate) set_alls: AtomicUsize,
    /// When set, `init` blocks until notified.
    pub(crate) init_release: Option<Arc<Notify>>,
    pub(crate) fail_init: bool,
    pub(crate) fail_sets: AtomicBool,
    pub(crate) set_delay: Option<Duration>,
    /// Applied after the read, so the result may be stale on return.
    pub(crate) get_delay: Option<Duration>,
}

impl RecordingAdapter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gated(release: Arc<Notify>) -> Self {
        Self {
            init_release: Some(release),
            ..Self::default()
        }
    }

    pub(crate) fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_set_delay(delay: Duration) -> Self {
        Self {
            set_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn with_get_delay(delay: Duration) -> Self {
        Self {
            get_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageAdapter for RecordingAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn init(&self, schema_version: u32) -> StorageResult<()> {
        if let Some(release) = &self.init_release {
            release.notified().await;
        }
        if self.fail_init {
            return Err(StorageError::Unavailable("backend offline".into()));
        }
        self.inner.init(schema_version).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let value = self.inner.get(key).await?;
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Option<Value>) -> StorageResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.set_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write rejected".into()));
        }
        self.inner.set(key, value).await
    }

    async fn set_all(&self, entries: Vec<KeyValue>) -> StorageResult<()> {
        self.set_alls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_all(entries).await
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<KeyValue>> {
        self.inner.list(prefix).await
    }

    fn snapshot(&self) -> Vec<KeyValue> {
        self.inner.snapshot()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }
}
