//! In-memory storage backend for server rendering and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tabius_types::{KeyValue, Value};

use crate::config::AdapterKind;
use crate::error::{StorageError, StorageResult};
use crate::traits::{matches_prefix, StorageAdapter};

/// In-memory, HashMap-based storage backend.
///
/// Nothing is durable: data lives as long as the adapter. On the server this
/// is the backend whose snapshot is exported to the client.
pub struct InMemoryAdapter {
    entries: RwLock<HashMap<String, Value>>,
    schema_version: RwLock<Option<u32>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            schema_version: RwLock::new(None),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.schema_version.read().expect("lock poisoned").is_none() {
            return Err(StorageError::NotInitialized {
                namespace: "memory".into(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn init(&self, schema_version: u32) -> StorageResult<()> {
        let mut current = self.schema_version.write().expect("lock poisoned");
        if current.is_some_and(|v| v != schema_version) {
            self.entries.write().expect("lock poisoned").clear();
        }
        *current = Some(schema_version);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_initialized()?;
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Option<Value>) -> StorageResult<()> {
        self.ensure_initialized()?;
        let mut map = self.entries.write().expect("lock poisoned");
        match value {
            Some(value) => {
                map.insert(key.to_string(), value);
            }
            None => {
                map.remove(key);
            }
        }
        Ok(())
    }

    async fn set_all(&self, entries: Vec<KeyValue>) -> StorageResult<()> {
        self.ensure_initialized()?;
        let mut map = self.entries.write().expect("lock poisoned");
        map.extend(entries.into_iter().map(|kv| (kv.key, kv.value)));
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<KeyValue>> {
        self.ensure_initialized()?;
        let map = self.entries.read().expect("lock poisoned");
        Ok(map
            .iter()
            .filter(|(k, _)| matches_prefix(k, prefix))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect())
    }

    fn snapshot(&self) -> Vec<KeyValue> {
        let map = self.entries.read().expect("lock poisoned");
        map.iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.ensure_initialized()?;
        self.entries.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAdapter")
            .field("entry_count", &self.len())
            .finish()
    }
}
