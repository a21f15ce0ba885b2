use serde::{Deserialize, Serialize};

/// A stored payload. Absence is modelled as `Option<Value>::None`, never as
/// `Value::Null`.
pub type Value = serde_json::Value;

/// A single entry as returned by listing and snapshot operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl From<(String, Value)> for KeyValue {
    fn from((key, value): (String, Value)) -> Self {
        Self { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_key_value_object() {
        let kv = KeyValue::new("song-1", json!({"title": "Intro"}));
        let encoded = serde_json::to_value(&kv).unwrap();
        assert_eq!(encoded, json!({"key": "song-1", "value": {"title": "Intro"}}));
    }

    #[test]
    fn from_tuple() {
        let kv: KeyValue = ("k".to_string(), json!(1)).into();
        assert_eq!(kv.key, "k");
        assert_eq!(kv.value, json!(1));
    }
}
