//! Single-document storage backend.
//!
//! The whole namespace is kept as one JSON document on disk:
//!
//! ```text
//! { "schemaVersion": 3, "entries": { "<key>": <value>, ... } }
//! ```
//!
//! Every write re-serializes the document and atomically replaces the file
//! (temp file + rename). A byte quota caps the serialized size; a write that
//! would exceed it is rejected and leaves both the file and the in-memory view
//! untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabius_types::{KeyValue, Value};
use tracing::{debug, warn};

use crate::config::AdapterKind;
use crate::error::{StorageError, StorageResult};
use crate::traits::{matches_prefix, StorageAdapter};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    schema_version: u32,
    entries: BTreeMap<String, Value>,
}

/// Quota-limited single JSON document per namespace.
///
/// Every write rewrites and syncs the whole document on the calling thread.
pub struct DocumentFileAdapter {
    path: PathBuf,
    namespace: String,
    quota_bytes: usize,
    /// `None` until `init` has loaded (or created) the document.
    document: Mutex<Option<Document>>,
}

impl DocumentFileAdapter {
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>, quota_bytes: usize) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
            quota_bytes,
            document: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the document, persist it, then commit the
    /// copy as the new in-memory view.
    fn update<F>(&self, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut Document),
    {
        let mut guard = self.document.lock().expect("document mutex poisoned");
        let current = guard.as_ref().ok_or_else(|| StorageError::NotInitialized {
            namespace: self.namespace.clone(),
        })?;
        let mut next = current.clone();
        mutate(&mut next);
        self.persist(&next)?;
        *guard = Some(next);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> StorageResult<T> {
        let guard = self.document.lock().expect("document mutex poisoned");
        guard.as_ref().map(f).ok_or_else(|| StorageError::NotInitialized {
            namespace: self.namespace.clone(),
        })
    }

    fn persist(&self, document: &Document) -> StorageResult<()> {
        let bytes = serde_json::to_vec(document)?;
        if bytes.len() > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                namespace: self.namespace.clone(),
                limit: self.quota_bytes,
                attempted: bytes.len(),
            });
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "document persisted");
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Document>> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Document>(&bytes) {
                Ok(doc) => Ok(Some(doc)),
                Err(e) => {
                    // A corrupt settings document is recoverable: start over.
                    warn!(path = %self.path.display(), error = %e, "discarding unreadable document");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageAdapter for DocumentFileAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::DocumentFile
    }

    async fn init(&self, schema_version: u32) -> StorageResult<()> {
        let document = match self.load()? {
            Some(doc) if doc.schema_version == schema_version => doc,
            stale => {
                if let Some(doc) = stale {
                    debug!(
                        namespace = %self.namespace,
                        stored = doc.schema_version,
                        expected = schema_version,
                        "schema version changed; wiping document"
                    );
                }
                let fresh = Document {
                    schema_version,
                    ..Document::default()
                };
                self.persist(&fresh)?;
                fresh
            }
        };
        *self.document.lock().expect("document mutex poisoned") = Some(document);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.read(|doc| doc.entries.get(key).cloned())
    }

    async fn get_all(&self, keys: &[String]) -> StorageResult<Vec<Option<Value>>> {
        self.read(|doc| keys.iter().map(|k| doc.entries.get(k).cloned()).collect())
    }

    async fn set(&self, key: &str, value: Option<Value>) -> StorageResult<()> {
        self.update(|doc| match value {
            Some(value) => {
                doc.entries.insert(key.to_string(), value);
            }
            None => {
                doc.entries.remove(key);
            }
        })
    }

    async fn set_all(&self, entries: Vec<KeyValue>) -> StorageResult<()> {
        self.update(|doc| {
            doc.entries
                .extend(entries.into_iter().map(|kv| (kv.key, kv.value)));
        })
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<KeyValue>> {
        self.read(|doc| {
            doc.entries
                .iter()
                .filter(|(k, _)| matches_prefix(k, prefix))
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                .collect()
        })
    }

    fn snapshot(&self) -> Vec<KeyValue> {
        self.read(|doc| {
            doc.entries
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.update(|doc| doc.entries.clear())
    }
}

impl std::fmt::Debug for DocumentFileAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFileAdapter")
            .field("path", &self.path)
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter_in(dir: &Path, quota: usize) -> DocumentFileAdapter {
        DocumentFileAdapter::new(dir.join("user.json"), "user", quota)
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), 1024);
        adapter.init(3).await.unwrap();
        adapter.set("settings", Some(json!({"fontSize": 14}))).await.unwrap();
        drop(adapter);

        let reopened = adapter_in(dir.path(), 1024);
        reopened.init(3).await.unwrap();
        assert_eq!(
            reopened.get("settings").await.unwrap(),
            Some(json!({"fontSize": 14}))
        );
    }

    #[tokio::test]
    async fn schema_mismatch_wipes_document() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), 1024);
        adapter.init(1).await.unwrap();
        adapter.set("k", Some(json!(1))).await.unwrap();
        drop(adapter);

        let reopened = adapter_in(dir.path(), 1024);
        reopened.init(2).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn quota_rejects_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), 64);
        adapter.init(1).await.unwrap();
        adapter.set("small", Some(json!("ok"))).await.unwrap();

        let big = json!("x".repeat(128));
        let err = adapter.set("big", Some(big)).await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 64, .. }));

        assert_eq!(adapter.get("big").await.unwrap(), None);
        assert_eq!(adapter.get("small").await.unwrap(), Some(json!("ok")));
    }

    #[tokio::test]
    async fn corrupt_document_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("user.json"), b"{not json").unwrap();
        let adapter = adapter_in(dir.path(), 1024);
        adapter.init(1).await.unwrap();
        assert!(adapter.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uninitialized_access_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), 1024);
        assert!(matches!(
            adapter.set("k", Some(json!(1))).await,
            Err(StorageError::NotInitialized { .. })
        ));
        assert!(adapter.snapshot().is_empty());
    }

    #[tokio::test]
    async fn bulk_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), 4096);
        adapter.init(1).await.unwrap();
        adapter
            .set_all(vec![
                KeyValue::new("pl-1", json!([1, 2])),
                KeyValue::new("pl-2", json!([3])),
                KeyValue::new("other", json!(null)),
            ])
            .await
            .unwrap();

        assert_eq!(adapter.list(Some("pl-")).await.unwrap().len(), 2);
        assert_eq!(adapter.snapshot().len(), 3);

        adapter.clear().await.unwrap();
        assert!(adapter.snapshot().is_empty());
    }
}
