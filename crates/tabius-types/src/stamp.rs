use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Reserved key holding the stamp of the server state a payload was exported
/// from.
pub const SERVER_STATE_TIMESTAMP_KEY: &str = "server-state-timestamp";

/// Opaque marker identifying one server-state export.
///
/// Stamps are generated from time-ordered UUIDs, but consumers only ever
/// compare them for equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStamp(String);

impl StateStamp {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.trim().is_empty() {
            return Err(TypeError::InvalidStamp("stamp is empty".into()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
