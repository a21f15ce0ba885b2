use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabius_storage::{open_adapter, AdapterKind, StorageAdapter, StorageConfig};
use tabius_types::Namespace;

/// Which side of a server-rendered session a store runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Server-side rendering: state is exported to the client.
    Server,
    /// Client boot: exported state is imported once.
    Client,
}

/// Configuration for a single store instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub namespace: Namespace,
    pub platform: Platform,
    /// Use the single-document backend on the client even when the journal
    /// backend is available.
    #[serde(default)]
    pub force_document_file: bool,
}

impl StoreConfig {
    pub fn new(namespace: Namespace, platform: Platform) -> Self {
        Self {
            namespace,
            platform,
            force_document_file: false,
        }
    }

    /// Store for user settings and playlists.
    pub fn user(platform: Platform) -> Self {
        Self::new(Namespace::user(), platform)
    }

    /// Store for artists and songs.
    pub fn artists(platform: Platform) -> Self {
        Self::new(Namespace::artists(), platform)
    }

    /// Technical application data; always kept in the single-document backend.
    pub fn app(platform: Platform) -> Self {
        Self {
            force_document_file: true,
            ..Self::new(Namespace::app(), platform)
        }
    }
}

/// Builds the storage adapter for a store. Invoked once, at construction.
pub type AdapterFactory = Arc<dyn Fn(&StoreConfig) -> Arc<dyn StorageAdapter> + Send + Sync>;

/// Backend selection used by [`default_adapter_factory`].
///
/// The server never persists: its state lives for one request and is handed
/// to the client through the transfer document.
pub fn select_adapter_kind(config: &StoreConfig) -> AdapterKind {
    match config.platform {
        Platform::Server => AdapterKind::Memory,
        Platform::Client if config.force_document_file => AdapterKind::DocumentFile,
        Platform::Client => AdapterKind::Journal,
    }
}

pub fn default_adapter_factory(storage: StorageConfig) -> AdapterFactory {
    Arc::new(move |config: &StoreConfig| {
        open_adapter(select_adapter_kind(config), &config.namespace, &storage)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let user = StoreConfig::user(Platform::Client);
        assert_eq!(user.namespace.name(), "user");
        assert!(!user.force_document_file);
        assert!(StoreConfig::app(Platform::Client).force_document_file);
    }

    #[test]
    fn backend_selection() {
        assert_eq!(
            select_adapter_kind(&StoreConfig::app(Platform::Server)),
            AdapterKind::Memory
        );
        assert_eq!(
            select_adapter_kind(&StoreConfig::app(Platform::Client)),
            AdapterKind::DocumentFile
        );
        assert_eq!(
            select_adapter_kind(&StoreConfig::artists(Platform::Client)),
            AdapterKind::Journal
        );
    }

    #[test]
    fn default_factory_builds_selected_kind() {
        let factory = default_adapter_factory(StorageConfig::default());
        let adapter = factory(&StoreConfig::user(Platform::Server));
        assert_eq!(adapter.kind(), AdapterKind::Memory);
    }

    #[test]
    fn config_deserializes_without_force_flag() {
        let json = r#"{"namespace": {"name": "user", "schema_version": 3}, "platform": "client"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, StoreConfig::user(Platform::Client));
    }
}
