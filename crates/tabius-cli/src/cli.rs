use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tabius_storage::AdapterKind;

#[derive(Parser)]
#[command(
    name = "tabius",
    about = "Tabius store: inspect, seed and transfer namespaced key-value caches",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Directory holding the namespace files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend (default: chosen per namespace)
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// Namespace to operate on
    #[arg(short, long, global = true, default_value = "user")]
    pub namespace: String,

    /// Schema version (default: the built-in namespace's, else 1)
    #[arg(long, global = true)]
    pub schema: Option<u32>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Memory,
    Document,
    Journal,
}

impl From<Backend> for AdapterKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => AdapterKind::Memory,
            Backend::Document => AdapterKind::DocumentFile,
            Backend::Journal => AdapterKind::Journal,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the value stored under a key
    Get(GetArgs),
    /// Store a JSON value under a key
    Set(SetArgs),
    /// Remove a key
    Remove(RemoveArgs),
    /// List entries, optionally filtered by key prefix
    List(ListArgs),
    /// Remove every entry in the namespace
    Clear(ClearArgs),
    /// Print the server-state transfer document for the namespace
    Export(ExportArgs),
    /// Import a server-state transfer document into the namespace
    Import(ImportArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub key: String,
    /// Value as JSON (`"text"`, `42`, `{"a": 1}`)
    pub value: String,
    /// Write even if the stored value is identical
    #[arg(long)]
    pub always: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub key: String,
}

#[derive(Args)]
pub struct ListArgs {
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Write the document to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Transfer document produced by `export`
    pub file: PathBuf,
}
