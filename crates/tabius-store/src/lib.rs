//! Reactive key-value cache core for Tabius.
//!
//! A [`Store`] presents every key of a namespace as a multicast stream that
//! replays its latest value. Each key is loaded from durable storage once,
//! optionally refreshed from a remote source under a [`RefreshMode`], and
//! written through a per-key queue so writes apply in call order.
//!
//! ```text
//! get(key) ─► init gate ─► slot exists? ──yes──► refresh policy (detached) ─► subscribe
//!                               │
//!                               no
//!                               ▼
//!                 adapter.get ─► hit: push, refresh policy
//!                               miss: fetch (deduplicated) ─► set ─► push
//! ```
//!
//! On the server a store registers its snapshot in a [`TransferState`]; on
//! the client the same document is imported once per stamp, seeding streams
//! so nothing already rendered is fetched again.
//!
//! [`RefreshMode`]: tabius_types::RefreshMode

pub mod config;
pub mod error;
pub mod fetch;
mod gate;
pub mod hydration;
pub mod policy;
pub mod store;
pub mod stream;
pub mod transfer;
mod writes;

#[cfg(test)]
mod testing;

pub use config::{default_adapter_factory, select_adapter_kind, AdapterFactory, Platform, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use fetch::{FetchError, FetchResult, Fetcher};
pub use hydration::HydrationOutcome;
pub use policy::should_refresh;
pub use store::Store;
pub use stream::{Emission, Subscription, ValueStream};
pub use transfer::TransferState;
