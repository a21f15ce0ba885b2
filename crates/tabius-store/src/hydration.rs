//! Server-state export and one-time client import.

use serde::Serialize;
use tabius_storage::StorageAdapter;
use tabius_types::{KeyValue, StateStamp, Value, SERVER_STATE_TIMESTAMP_KEY};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Result of importing a server-state payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HydrationOutcome {
    /// The payload was written; `keys` includes the stamp entry.
    Applied { keys: usize },
    /// The adapter already holds this payload's stamp.
    AlreadyApplied,
}

/// The adapter's full contents plus a fresh stamp, as one JSON object.
pub(crate) fn export_payload(adapter: &dyn StorageAdapter) -> Value {
    let mut payload = serde_json::Map::new();
    for KeyValue { key, value } in adapter.snapshot() {
        payload.insert(key, value);
    }
    payload.insert(
        SERVER_STATE_TIMESTAMP_KEY.to_string(),
        Value::String(StateStamp::generate().to_string()),
    );
    Value::Object(payload)
}

/// Write `payload` into the adapter unless its stamp was already imported.
///
/// Returns the written entries so the caller can seed streams for them, or
/// `None` when the payload was already applied.
pub(crate) async fn import_payload(
    adapter: &dyn StorageAdapter,
    payload: &Value,
) -> StoreResult<Option<Vec<KeyValue>>> {
    let Value::Object(map) = payload else {
        return Err(StoreError::Transfer(
            "server-state payload must be a JSON object".into(),
        ));
    };
    let incoming = map.get(SERVER_STATE_TIMESTAMP_KEY);
    let applied = adapter.get(SERVER_STATE_TIMESTAMP_KEY).await?;
    if incoming == applied.as_ref() {
        debug!(stamp = ?incoming, "server state already applied");
        return Ok(None);
    }
    let entries: Vec<KeyValue> = map
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
        .collect();
    adapter.set_all(entries.clone()).await?;
    Ok(Some(entries))
}
