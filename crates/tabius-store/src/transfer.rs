//! Server-to-client transfer document.
//!
//! On the server, stores register a callback per transfer key; rendering the
//! document runs every callback. On the client, the document is parsed once
//! and each store reads its own key.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tabius_types::Value;

use crate::error::{StoreError, StoreResult};

type SerializeCallback = Box<dyn Fn() -> Value + Send + Sync>;

#[derive(Default)]
pub struct TransferState {
    values: Mutex<BTreeMap<String, Value>>,
    callbacks: Mutex<Vec<(String, SerializeCallback)>>,
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a rendered document. The top level must be a JSON object.
    pub fn from_json(document: &str) -> StoreResult<Self> {
        let parsed: Value =
            serde_json::from_str(document).map_err(|e| StoreError::Transfer(e.to_string()))?;
        let Value::Object(map) = parsed else {
            return Err(StoreError::Transfer(
                "transfer document must be a JSON object".into(),
            ));
        };
        Ok(Self {
            values: Mutex::new(map.into_iter().collect()),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .expect("transfer lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values
            .lock()
            .expect("transfer lock poisoned")
            .insert(key.into(), value);
    }

    /// Compute `key` lazily, each time the document is rendered.
    pub fn on_serialize<F>(&self, key: impl Into<String>, callback: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .expect("transfer lock poisoned")
            .push((key.into(), Box::new(callback)));
    }

    /// Render the document. Callback results override static values.
    pub fn to_value(&self) -> Value {
        let mut values = self.values.lock().expect("transfer lock poisoned").clone();
        for (key, callback) in self.callbacks.lock().expect("transfer lock poisoned").iter() {
            values.insert(key.clone(), callback());
        }
        Value::Object(values.into_iter().collect())
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

impl std::fmt::Debug for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .values
            .lock()
            .expect("transfer lock poisoned")
            .keys()
            .cloned()
            .collect();
        let callbacks = self.callbacks.lock().expect("transfer lock poisoned").len();
        f.debug_struct("TransferState")
            .field("keys", &keys)
            .field("callbacks", &callbacks)
            .finish()
    }
}
