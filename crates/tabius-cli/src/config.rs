use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tabius_storage::{AdapterKind, StorageConfig};

use crate::cli::Cli;

/// Contents of `--config <file>`.
///
/// ```toml
/// backend = "journal"
///
/// [storage]
/// data_dir = "/var/lib/tabius"
/// journal_sync = "every-write"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: Option<AdapterKind>,
    pub storage: StorageConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// The config file (if any) with command-line flags applied on top.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = &cli.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(backend) = cli.backend {
            config.backend = Some(backend.into());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;
    use tabius_storage::JournalSync;

    #[test]
    fn parses_toml() {
        let config: CliConfig = toml::from_str(
            r#"
            backend = "document-file"

            [storage]
            data_dir = "/srv/tabius"
            journal_sync = "every-write"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Some(AdapterKind::DocumentFile));
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/tabius"));
        assert_eq!(config.storage.journal_sync, JournalSync::EveryWrite);
        assert_eq!(config.storage.compact_threshold, 4);
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"journal\"\n[storage]\ndata_dir = \"from-file\"").unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from(["tabius", "--config", path, "--backend", "memory", "list"]).unwrap();
        let config = CliConfig::resolve(&cli).unwrap();
        assert_eq!(config.backend, Some(AdapterKind::Memory));
        assert_eq!(config.storage.data_dir, PathBuf::from("from-file"));

        let cli = Cli::try_parse_from(["tabius", "--config", path, "--data-dir", "elsewhere", "list"]).unwrap();
        let config = CliConfig::resolve(&cli).unwrap();
        assert_eq!(config.backend, Some(AdapterKind::Journal));
        assert_eq!(config.storage.data_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(CliConfig::load(Path::new("/nonexistent/tabius.toml")).is_err());
    }
}
