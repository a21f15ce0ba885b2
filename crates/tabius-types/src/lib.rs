//! Foundation types for the Tabius reactive key-value store.
//!
//! Every other Tabius crate depends on `tabius-types`. The types here carry no
//! I/O and no async machinery; they describe *what* is cached and *how* a
//! caller wants it refreshed.
//!
//! # Key Types
//!
//! - [`KeyValue`]: a single `(key, value)` entry as listed or snapshotted
//! - [`Namespace`]: an isolated store name plus its schema version
//! - [`RefreshMode`]: background refresh policy after a cache hit
//! - [`UpdateCheck`]: predicate deciding whether a write changes anything
//! - [`StateStamp`]: opaque marker identifying one server-state export

pub mod entry;
pub mod error;
pub mod namespace;
pub mod refresh;
pub mod stamp;
pub mod update;

pub use entry::{KeyValue, Value};
pub use error::TypeError;
pub use namespace::Namespace;
pub use refresh::RefreshMode;
pub use stamp::{StateStamp, SERVER_STATE_TIMESTAMP_KEY};
pub use update::{UpdateCheck, UpdatePredicate};
