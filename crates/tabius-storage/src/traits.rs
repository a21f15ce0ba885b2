use async_trait::async_trait;
use tabius_types::{KeyValue, Value};

use crate::config::AdapterKind;
use crate::error::StorageResult;

/// Durable key-value backend consumed by the store core.
///
/// All implementations must satisfy these invariants:
/// - Nothing is read or written before [`init`](Self::init) resolves.
/// - `set(key, None)` removes the key; a later `get` returns `Ok(None)`.
/// - `get_all` returns exactly one slot per requested key, in input order.
/// - `list` is complete for the prefix; its order is unspecified.
/// - All I/O errors are propagated, never silently ignored.
///
/// Methods run on the caller's task. The file-backed adapters do their I/O
/// synchronously inside them, including `fsync` when configured, so a slow
/// disk stalls the calling runtime worker for the duration of the write.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Which backend this is. Used for logging only.
    fn kind(&self) -> AdapterKind;

    /// Prepare the backend. Data persisted under a different schema version
    /// is discarded.
    async fn init(&self, schema_version: u32) -> StorageResult<()>;

    /// Read a single value. Returns `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Read several values, one slot per key in input order.
    ///
    /// Default implementation calls `get()` for each key.
    async fn get_all(&self, keys: &[String]) -> StorageResult<Vec<Option<Value>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Write a value; `None` deletes the key.
    async fn set(&self, key: &str, value: Option<Value>) -> StorageResult<()>;

    /// Write several entries.
    ///
    /// Default implementation calls `set()` for each entry. Backends with
    /// transactions override this to apply the batch atomically.
    async fn set_all(&self, entries: Vec<KeyValue>) -> StorageResult<()> {
        for KeyValue { key, value } in entries {
            self.set(&key, Some(value)).await?;
        }
        Ok(())
    }

    /// List every entry whose key starts with `prefix` (all entries for `None`).
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<KeyValue>>;

    /// Full synchronous dump, used only for server-state export.
    fn snapshot(&self) -> Vec<KeyValue>;

    /// Remove all entries.
    async fn clear(&self) -> StorageResult<()>;
}

pub(crate) fn matches_prefix(key: &str, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |p| key.starts_with(p))
}
