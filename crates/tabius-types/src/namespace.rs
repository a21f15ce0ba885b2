use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// An isolated key-value namespace.
///
/// Each store owns exactly one namespace. The name doubles as a file stem for
/// on-disk backends and as the suffix of the server-state transfer key, so it
/// is restricted to ASCII alphanumerics plus `-`, `_` and `.`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    name: String,
    schema_version: u32,
}

impl Namespace {
    /// User settings and playlists.
    pub const USER: &'static str = "user";
    /// Artist and song catalog.
    pub const ARTISTS: &'static str = "artists";
    /// Technical application data that must survive between sessions.
    pub const APP: &'static str = "tabius";

    pub const USER_SCHEMA_VERSION: u32 = 3;
    pub const ARTISTS_SCHEMA_VERSION: u32 = 1;
    pub const APP_SCHEMA_VERSION: u32 = 1;

    /// Create a namespace after validating its name.
    pub fn new(name: impl Into<String>, schema_version: u32) -> Result<Self, TypeError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            schema_version,
        })
    }

    pub fn user() -> Self {
        Self::builtin(Self::USER, Self::USER_SCHEMA_VERSION)
    }

    pub fn artists() -> Self {
        Self::builtin(Self::ARTISTS, Self::ARTISTS_SCHEMA_VERSION)
    }

    pub fn app() -> Self {
        Self::builtin(Self::APP, Self::APP_SCHEMA_VERSION)
    }

    fn builtin(name: &str, schema_version: u32) -> Self {
        Self {
            name: name.to_string(),
            schema_version,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Key under which the server exports this namespace's snapshot.
    pub fn transfer_key(&self) -> String {
        format!("db-{}", self.name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.schema_version)
    }
}

fn validate_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidNamespace {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name starts with '.'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("unsupported character {c:?}")));
    }
    Ok(())
}
