use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which concrete backend a store is opened with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    /// Process-local `HashMap`; nothing survives the process.
    Memory,
    /// Single JSON document per namespace, quota-limited.
    DocumentFile,
    /// Append-only record journal with atomic batches.
    Journal,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Memory => "memory",
            Self::DocumentFile => "document-file",
            Self::Journal => "journal",
        };
        f.write_str(s)
    }
}

/// Flush strategy for the journal backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalSync {
    /// `fsync` after every record (safest, highest latency).
    EveryWrite,
    /// Flush to the OS page cache only.
    OsDefault,
}

impl Default for JournalSync {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Configuration shared by the on-disk backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one file per namespace.
    pub data_dir: PathBuf,
    /// Maximum serialized size of a document-file namespace (default: 5 MiB).
    pub document_quota_bytes: usize,
    /// Journal flush strategy.
    pub journal_sync: JournalSync,
    /// Compact the journal once it holds this many records per live key.
    pub compact_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tabius"),
            document_quota_bytes: 5 * 1024 * 1024, // 5 MiB
            journal_sync: JournalSync::default(),
            compact_threshold: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.document_quota_bytes, 5 * 1024 * 1024);
        assert_eq!(c.journal_sync, JournalSync::OsDefault);
        assert_eq!(c.compact_threshold, 4);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let c: StorageConfig = serde_json::from_str(r#"{"data_dir": "/var/tabius"}"#).unwrap();
        assert_eq!(c.data_dir, PathBuf::from("/var/tabius"));
        assert_eq!(c.compact_threshold, 4);
    }

    #[test]
    fn adapter_kind_names() {
        assert_eq!(AdapterKind::DocumentFile.to_string(), "document-file");
        let kind: AdapterKind = serde_json::from_str("\"journal\"").unwrap();
        assert_eq!(kind, AdapterKind::Journal);
    }
}
