use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use tabius_storage::open_adapter;
use tabius_store::{select_adapter_kind, HydrationOutcome, Platform, Store, StoreConfig, TransferState};
use tabius_types::{KeyValue, Namespace, RefreshMode, UpdateCheck, Value};
use tracing::debug;

use crate::cli::*;
use crate::config::CliConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(&cli)?;
    let namespace = resolve_namespace(&cli.namespace, cli.schema)?;
    let format = cli.format.clone();
    match cli.command {
        Command::Get(args) => cmd_get(&open(&config, &namespace, Platform::Client), args, &format).await,
        Command::Set(args) => cmd_set(&open(&config, &namespace, Platform::Client), args).await,
        Command::Remove(args) => cmd_remove(&open(&config, &namespace, Platform::Client), args).await,
        Command::List(args) => cmd_list(&open(&config, &namespace, Platform::Client), args, &format).await,
        Command::Clear(args) => cmd_clear(&open(&config, &namespace, Platform::Client), args).await,
        Command::Export(args) => cmd_export(&config, &namespace, args).await,
        Command::Import(args) => cmd_import(&open(&config, &namespace, Platform::Client), args, &format).await,
    }
}

/// Built-in namespaces keep their schema version unless `--schema` is given.
fn resolve_namespace(name: &str, schema: Option<u32>) -> anyhow::Result<Namespace> {
    let builtin = [Namespace::user(), Namespace::artists(), Namespace::app()]
        .into_iter()
        .find(|ns| ns.name() == name);
    let version = schema
        .or(builtin.map(|ns| ns.schema_version()))
        .unwrap_or(1);
    Ok(Namespace::new(name, version)?)
}

fn store_config(namespace: &Namespace, platform: Platform) -> StoreConfig {
    let base = if namespace.name() == Namespace::APP {
        StoreConfig::app(platform)
    } else {
        StoreConfig::new(namespace.clone(), platform)
    };
    StoreConfig {
        namespace: namespace.clone(),
        ..base
    }
}

/// Open the namespace on disk. The backend is the configured one, or the one
/// a client would use for this namespace.
fn open_with(
    config: &CliConfig,
    namespace: &Namespace,
    platform: Platform,
    transfer: Option<Arc<TransferState>>,
) -> Store {
    let client = store_config(namespace, Platform::Client);
    let kind = config.backend.unwrap_or_else(|| select_adapter_kind(&client));
    debug!(namespace = %namespace, backend = %kind, data_dir = %config.storage.data_dir.display(), "opening store");
    let adapter = open_adapter(kind, namespace, &config.storage);
    Store::with_adapter(store_config(namespace, platform), adapter, transfer)
}

fn open(config: &CliConfig, namespace: &Namespace, platform: Platform) -> Store {
    open_with(config, namespace, platform, None)
}

async fn cmd_get(store: &Store, args: GetArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let value = store
        .get(&args.key, None, RefreshMode::DoNotRefresh, UpdateCheck::ByValue)
        .await?
        .first()
        .await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Text => match value {
            Some(value) => println!("{}", render(&value)),
            None => println!("{} {}", args.key.bold(), "(absent)".dimmed()),
        },
    }
    Ok(())
}

async fn cmd_set(store: &Store, args: SetArgs) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(&args.value)
        .with_context(|| format!("value for {:?} is not valid JSON", args.key))?;
    let check = if args.always { UpdateCheck::Always } else { UpdateCheck::ByValue };
    store.set(&args.key, Some(value), check).await?;
    println!("{} Set {} in {}", "✓".green().bold(), args.key.bold(), store.namespace().to_string().cyan());
    Ok(())
}

async fn cmd_remove(store: &Store, args: RemoveArgs) -> anyhow::Result<()> {
    store.remove(&args.key).await?;
    println!("{} Removed {}", "✓".green().bold(), args.key.bold());
    Ok(())
}

async fn cmd_list(store: &Store, args: ListArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut entries = store.list(args.prefix.as_deref()).await?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No entries.");
            }
            for KeyValue { key, value } in &entries {
                println!("{}  {}", key.yellow(), render(value));
            }
        }
    }
    Ok(())
}

async fn cmd_clear(store: &Store, args: ClearArgs) -> anyhow::Result<()> {
    if !args.yes && !confirm(&format!("Remove every entry in {}?", store.namespace()))? {
        println!("Aborted.");
        return Ok(());
    }
    store.clear().await?;
    println!("{} Cleared {}", "✓".green().bold(), store.namespace().to_string().cyan());
    Ok(())
}

async fn cmd_export(config: &CliConfig, namespace: &Namespace, args: ExportArgs) -> anyhow::Result<()> {
    let transfer = Arc::new(TransferState::new());
    let store = open_with(config, namespace, Platform::Server, Some(Arc::clone(&transfer)));
    store.initialized().await?;
    let document = serde_json::to_string_pretty(&transfer.to_value())?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} Exported {} to {}", "✓".green().bold(), namespace.to_string().cyan(), path.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}

async fn cmd_import(store: &Store, args: ImportArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let transfer = TransferState::from_json(&text)?;
    let key = store.namespace().transfer_key();
    let Some(payload) = transfer.get(&key) else {
        bail!("{} holds no state for {key}", args.file.display());
    };
    let outcome = store.import_server_state(&payload).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&outcome)?),
        OutputFormat::Text => match outcome {
            HydrationOutcome::Applied { keys } => {
                println!("{} Imported {} entries into {}", "✓".green().bold(), keys, store.namespace().to_string().cyan())
            }
            HydrationOutcome::AlreadyApplied => println!("Already up to date."),
        },
    }
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabius_storage::{AdapterKind, StorageConfig};

    fn on_disk(dir: &std::path::Path) -> CliConfig {
        CliConfig {
            backend: None,
            storage: StorageConfig {
                data_dir: dir.to_path_buf(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn builtin_schema_versions() {
        assert_eq!(resolve_namespace("user", None).unwrap().schema_version(), 3);
        assert_eq!(resolve_namespace("user", Some(9)).unwrap().schema_version(), 9);
        assert_eq!(resolve_namespace("custom", None).unwrap().schema_version(), 1);
        assert!(resolve_namespace("../etc", None).is_err());
    }

    #[test]
    fn app_namespace_uses_document_file() {
        let config = store_config(&Namespace::app(), Platform::Client);
        assert!(config.force_document_file);
        assert_eq!(select_adapter_kind(&config), AdapterKind::DocumentFile);
        assert!(!store_config(&Namespace::user(), Platform::Client).force_document_file);
    }

    #[tokio::test]
    async fn export_then_import_into_fresh_directory() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let namespace = Namespace::user();

        let store = open(&on_disk(source.path()), &namespace, Platform::Client);
        store.set("theme", Some(json!("dark")), UpdateCheck::ByValue).await.unwrap();
        drop(store);

        let document = source.path().join("state.json");
        cmd_export(&on_disk(source.path()), &namespace, ExportArgs { output: Some(document.clone()) })
            .await
            .unwrap();

        let target_config = on_disk(target.path());
        let store = open(&target_config, &namespace, Platform::Client);
        cmd_import(&store, ImportArgs { file: document.clone() }, &OutputFormat::Text)
            .await
            .unwrap();
        let value = store
            .get("theme", None, RefreshMode::DoNotRefresh, UpdateCheck::ByValue)
            .await
            .unwrap()
            .first()
            .await;
        assert_eq!(value, Some(json!("dark")));

        let text = std::fs::read_to_string(&document).unwrap();
        let payload = TransferState::from_json(&text).unwrap().get("db-user").unwrap();
        assert_eq!(
            store.import_server_state(&payload).await.unwrap(),
            HydrationOutcome::AlreadyApplied
        );
    }
}
