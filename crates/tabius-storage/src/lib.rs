//! Durable key-value backends for the Tabius reactive store.
//!
//! The store core never inspects which backend it holds: everything goes
//! through the [`StorageAdapter`] trait. Three interchangeable backends are
//! provided:
//!
//! - [`InMemoryAdapter`]: process-local, no durability (server rendering, tests)
//! - [`DocumentFileAdapter`]: the whole namespace as one JSON document with a
//!   byte quota (small, synchronous-ish settings storage)
//! - [`JournalAdapter`]: append-only, CRC-framed record journal with atomic
//!   batches and compaction (larger capacity, schema-versioned)
//!
//! # Adapter Rules
//!
//! 1. No read or write may be served before `init` has completed.
//! 2. `init` wipes data persisted under a different schema version.
//! 3. Writing `None` deletes the key.
//! 4. `snapshot` is synchronous and only used for server-state export.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod document;
pub mod error;
pub mod factory;
pub mod journal;
pub mod memory;
pub mod traits;

pub use config::{AdapterKind, JournalSync, StorageConfig};
pub use document::DocumentFileAdapter;
pub use error::{StorageError, StorageResult};
pub use factory::open_adapter;
pub use journal::JournalAdapter;
pub use memory::InMemoryAdapter;
pub use traits::StorageAdapter;
