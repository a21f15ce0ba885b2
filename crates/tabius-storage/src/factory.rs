use std::sync::Arc;

use tabius_types::Namespace;

use crate::config::{AdapterKind, StorageConfig};
use crate::document::DocumentFileAdapter;
use crate::journal::JournalAdapter;
use crate::memory::InMemoryAdapter;
use crate::traits::StorageAdapter;

/// Construct a backend of the given kind for a namespace.
///
/// Construction never touches the disk; files are opened by `init`.
pub fn open_adapter(
    kind: AdapterKind,
    namespace: &Namespace,
    config: &StorageConfig,
) -> Arc<dyn StorageAdapter> {
    match kind {
        AdapterKind::Memory => Arc::new(InMemoryAdapter::new()),
        AdapterKind::DocumentFile => Arc::new(DocumentFileAdapter::new(
            config.data_dir.join(format!("{}.json", namespace.name())),
            namespace.name(),
            config.document_quota_bytes,
        )),
        AdapterKind::Journal => Arc::new(JournalAdapter::new(
            config.data_dir.join(format!("{}.journal", namespace.name())),
            config.journal_sync,
            config.compact_threshold,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_requested_kind() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let ns = Namespace::user();
        for kind in [AdapterKind::Memory, AdapterKind::DocumentFile, AdapterKind::Journal] {
            assert_eq!(open_adapter(kind, &ns, &config).kind(), kind);
        }
        // Construction alone creates no files.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
