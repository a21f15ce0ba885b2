//! The reactive store: per-key streams over a storage adapter.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use tabius_storage::{AdapterKind, StorageAdapter};
use tabius_types::{KeyValue, Namespace, RefreshMode, UpdateCheck, Value};
use tracing::{debug, error, info, warn};

use crate::config::{AdapterFactory, Platform, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::fetch::{FetchDeduplicator, Fetcher};
use crate::gate::InitGate;
use crate::hydration::{export_payload, import_payload, HydrationOutcome};
use crate::policy::should_refresh;
use crate::stream::{Subscription, ValueStream};
use crate::transfer::TransferState;
use crate::writes::{Turn, WriteSerializer, WriteTicket};

/// Outcome of a key's one-time initialization, shared by every concurrent
/// first `get`. The work itself runs on its own task.
type InitOp = Shared<BoxFuture<'static, Result<(), String>>>;

enum Phase {
    Initializing(InitOp),
    Ready,
}

struct KeySlot {
    stream: ValueStream,
    phase: Phase,
}

struct StoreInner {
    config: StoreConfig,
    adapter: Arc<dyn StorageAdapter>,
    gate: InitGate,
    slots: Mutex<HashMap<String, KeySlot>>,
    /// Keys that completed a fetch or an accepted write this session.
    refreshed: Mutex<HashSet<String>>,
    fetches: FetchDeduplicator,
    writes: Arc<WriteSerializer>,
}

/// A namespaced, reactive key-value cache.
///
/// Every key is exposed as a [`Subscription`] that replays the latest value
/// and follows every accepted write. Reads are served from the storage
/// adapter once per key; misses and refreshes go through an optional
/// [`Fetcher`]. Writes to one key apply strictly in call order.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Build the adapter through `factory` and start initialization.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: StoreConfig,
        factory: &AdapterFactory,
        transfer: Option<Arc<TransferState>>,
    ) -> Self {
        let adapter = factory(&config);
        Self::with_adapter(config, adapter, transfer)
    }

    /// Start a store over an already constructed adapter.
    pub fn with_adapter(
        config: StoreConfig,
        adapter: Arc<dyn StorageAdapter>,
        transfer: Option<Arc<TransferState>>,
    ) -> Self {
        let inner = Arc::new(StoreInner {
            gate: InitGate::new(config.namespace.name()),
            config,
            adapter,
            slots: Mutex::new(HashMap::new()),
            refreshed: Mutex::new(HashSet::new()),
            fetches: FetchDeduplicator::new(),
            writes: Arc::new(WriteSerializer::new()),
        });
        tokio::spawn(Arc::clone(&inner).initialize(transfer));
        Self { inner }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.config.namespace
    }

    pub fn platform(&self) -> Platform {
        self.inner.config.platform
    }

    pub fn backend(&self) -> AdapterKind {
        self.inner.adapter.kind()
    }

    /// Wait until the adapter is ready. Fails permanently if its
    /// initialization failed.
    pub async fn initialized(&self) -> StoreResult<()> {
        self.inner.gate.wait().await
    }

    /// Whether `key` completed a fetch or an accepted write this session.
    pub fn is_refreshed(&self, key: &str) -> bool {
        self.inner.is_refreshed(key)
    }

    /// Subscribe to `key`.
    ///
    /// The first call for a key loads it from storage, or from `fetcher` on a
    /// miss, before returning; concurrent first calls share that work. Later
    /// calls return at once and may start a background refresh according to
    /// `mode`. An empty key yields a single "absent".
    pub async fn get(
        &self,
        key: &str,
        fetcher: Option<Fetcher>,
        mode: RefreshMode,
        check: UpdateCheck,
    ) -> StoreResult<Subscription> {
        if key.is_empty() {
            return Ok(Subscription::absent());
        }
        self.inner.gate.wait().await?;

        let (stream, init, existed) = self.inner.slot_for(key, fetcher.clone(), mode, check.clone());
        if let Some(init) = init {
            init.await.map_err(|reason| StoreError::KeyInit {
                key: key.to_string(),
                reason,
            })?;
        }
        if existed {
            self.inner.spawn_refresh(key, fetcher, mode, check);
        }
        Ok(stream.subscribe())
    }

    /// Write `value` (`None` removes) behind any writes already queued for
    /// `key`.
    ///
    /// The write is queued when this is called, not when the returned future
    /// is first polled, and it completes even if that future is dropped. An
    /// empty key is ignored.
    pub fn set(
        &self,
        key: &str,
        value: Option<Value>,
        check: UpdateCheck,
    ) -> BoxFuture<'static, StoreResult<()>> {
        if key.is_empty() {
            return future::ready(Ok(())).boxed();
        }
        self.inner.enqueue_write(key, value, check).boxed()
    }

    /// Unconditionally remove `key`.
    pub fn remove(&self, key: &str) -> BoxFuture<'static, StoreResult<()>> {
        self.set(key, None, UpdateCheck::Always)
    }

    /// Entries whose key starts with `prefix`, or all entries.
    pub async fn list(&self, prefix: Option<&str>) -> StoreResult<Vec<KeyValue>> {
        self.inner.gate.wait().await?;
        Ok(self.inner.adapter.list(prefix).await?)
    }

    /// Remove everything and emit "absent" on every stream that still holds a
    /// value.
    pub async fn clear(&self) -> StoreResult<()> {
        self.inner.gate.wait().await?;
        self.inner.adapter.clear().await?;
        let streams: Vec<ValueStream> = self
            .inner
            .slots
            .lock()
            .expect("slot lock poisoned")
            .values()
            .map(|slot| slot.stream.clone())
            .collect();
        for stream in streams {
            stream.push_if_changed(None);
        }
        info!(namespace = %self.inner.config.namespace, "store cleared");
        Ok(())
    }

    /// Import a server-state payload, unless its stamp was already applied.
    pub async fn import_server_state(&self, payload: &Value) -> StoreResult<HydrationOutcome> {
        self.inner.gate.wait().await?;
        self.inner.hydrate(payload).await
    }

    /// The adapter's contents plus a fresh server-state stamp.
    pub async fn export_server_state(&self) -> StoreResult<Value> {
        self.inner.gate.wait().await?;
        Ok(export_payload(self.inner.adapter.as_ref()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.inner.slots.lock().expect("slot lock poisoned").len();
        f.debug_struct("Store")
            .field("namespace", &self.inner.config.namespace)
            .field("platform", &self.inner.config.platform)
            .field("backend", &self.inner.adapter.kind())
            .field("keys", &keys)
            .finish()
    }
}

impl StoreInner {
    async fn initialize(self: Arc<Self>, transfer: Option<Arc<TransferState>>) {
        let started = Instant::now();
        match self.prepare(transfer).await {
            Ok(()) => {
                debug!(
                    namespace = %self.config.namespace,
                    backend = %self.adapter.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "store initialized"
                );
                self.gate.open();
            }
            Err(e) => {
                error!(namespace = %self.config.namespace, error = %e, "store initialization failed");
                self.gate.fail(e.to_string());
            }
        }
    }

    async fn prepare(&self, transfer: Option<Arc<TransferState>>) -> StoreResult<()> {
        self.adapter
            .init(self.config.namespace.schema_version())
            .await?;
        let Some(transfer) = transfer else {
            return Ok(());
        };
        let transfer_key = self.config.namespace.transfer_key();
        match self.config.platform {
            Platform::Server => {
                let adapter = Arc::clone(&self.adapter);
                transfer.on_serialize(transfer_key, move || export_payload(adapter.as_ref()));
            }
            Platform::Client => match transfer.get(&transfer_key) {
                Some(payload) => {
                    self.hydrate(&payload).await?;
                }
                None => debug!(key = %transfer_key, "no server state to import"),
            },
        }
        Ok(())
    }

    /// Import `payload` and seed a settled stream for every key it carries.
    async fn hydrate(&self, payload: &Value) -> StoreResult<HydrationOutcome> {
        let Some(entries) = import_payload(self.adapter.as_ref(), payload).await? else {
            return Ok(HydrationOutcome::AlreadyApplied);
        };
        let keys = entries.len();
        {
            let mut slots = self.slots.lock().expect("slot lock poisoned");
            let mut refreshed = self.refreshed.lock().expect("refreshed lock poisoned");
            for KeyValue { key, value } in entries {
                match slots.get_mut(&key) {
                    Some(slot) => {
                        slot.stream.push_if_changed(Some(value));
                        slot.phase = Phase::Ready;
                    }
                    None => {
                        let slot = KeySlot {
                            stream: ValueStream::seeded(Some(value)),
                            phase: Phase::Ready,
                        };
                        slots.insert(key.clone(), slot);
                    }
                }
                refreshed.insert(key);
            }
        }
        info!(namespace = %self.config.namespace, keys, "server state imported");
        Ok(HydrationOutcome::Applied { keys })
    }

    /// The key's stream, plus its pending initialization if there is one.
    /// The flag reports whether the slot already existed.
    fn slot_for(
        self: &Arc<Self>,
        key: &str,
        fetcher: Option<Fetcher>,
        mode: RefreshMode,
        check: UpdateCheck,
    ) -> (ValueStream, Option<InitOp>, bool) {
        let mut slots = self.slots.lock().expect("slot lock poisoned");
        if let Some(slot) = slots.get(key) {
            let init = match &slot.phase {
                Phase::Initializing(op) => Some(op.clone()),
                Phase::Ready => None,
            };
            return (slot.stream.clone(), init, true);
        }

        let stream = ValueStream::new();
        let task = tokio::spawn(Arc::clone(self).initialize_key(
            key.to_string(),
            stream.clone(),
            fetcher,
            mode,
            check,
        ));
        // Holds only the join handle, never the store itself.
        let op = async move { task.await.map_err(|e| e.to_string())? }
            .boxed()
            .shared();
        slots.insert(
            key.to_string(),
            KeySlot {
                stream: stream.clone(),
                phase: Phase::Initializing(op.clone()),
            },
        );
        (stream, Some(op), false)
    }

    async fn initialize_key(
        self: Arc<Self>,
        key: String,
        stream: ValueStream,
        fetcher: Option<Fetcher>,
        mode: RefreshMode,
        check: UpdateCheck,
    ) -> Result<(), String> {
        let result = self.load_key(&key, &stream, fetcher, mode, check).await;
        let mut slots = self.slots.lock().expect("slot lock poisoned");
        let initializing = slots
            .get(&key)
            .is_some_and(|slot| matches!(slot.phase, Phase::Initializing(_)));
        if !initializing {
            return result.map_err(|e| e.to_string());
        }
        match result {
            Ok(()) => {
                if let Some(slot) = slots.get_mut(&key) {
                    slot.phase = Phase::Ready;
                }
                Ok(())
            }
            Err(e) => {
                // Forget the slot so the next get starts over.
                slots.remove(&key);
                warn!(namespace = %self.config.namespace, key = %key, error = %e, "key initialization failed");
                Err(e.to_string())
            }
        }
    }

    async fn load_key(
        self: &Arc<Self>,
        key: &str,
        stream: &ValueStream,
        fetcher: Option<Fetcher>,
        mode: RefreshMode,
        check: UpdateCheck,
    ) -> StoreResult<()> {
        // A write accepted while the read was pending has already settled
        // the stream with a newer value.
        if let Some(value) = self.adapter.get(key).await? {
            stream.push_if_unsettled(Some(value));
            self.spawn_refresh(key, fetcher, mode, check);
            return Ok(());
        }
        let Some(fetcher) = fetcher else {
            stream.push_if_unsettled(None);
            return Ok(());
        };
        let fetched = self.fetch(key, &fetcher).await;
        self.enqueue_write(key, fetched.clone(), check).await?;
        // The write may have been skipped as redundant; settle the stream anyway.
        stream.push_if_unsettled(fetched);
        Ok(())
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        key: &str,
        fetcher: Option<Fetcher>,
        mode: RefreshMode,
        check: UpdateCheck,
    ) {
        let Some(fetcher) = fetcher else {
            return;
        };
        if !should_refresh(mode, true, self.is_refreshed(key)) {
            return;
        }
        let inner = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = inner.refresh(&key, &fetcher, mode, check).await {
                warn!(namespace = %inner.config.namespace, key = %key, error = %e, "background refresh failed");
            }
        });
    }

    async fn refresh(
        self: &Arc<Self>,
        key: &str,
        fetcher: &Fetcher,
        mode: RefreshMode,
        check: UpdateCheck,
    ) -> StoreResult<()> {
        // Another refresh may have completed since this one was scheduled.
        if !should_refresh(mode, true, self.is_refreshed(key)) {
            return Ok(());
        }
        let Some(value) = self.fetch(key, fetcher).await else {
            return Ok(());
        };
        self.enqueue_write(key, Some(value), check).await
    }

    async fn fetch(&self, key: &str, fetcher: &Fetcher) -> Option<Value> {
        let value = self.fetches.run(key, fetcher).await;
        if value.is_some() {
            self.mark_refreshed(key);
        }
        value
    }

    fn enqueue_write(
        self: &Arc<Self>,
        key: &str,
        value: Option<Value>,
        check: UpdateCheck,
    ) -> impl Future<Output = StoreResult<()>> + Send + 'static {
        let ticket = self.writes.enqueue(key, value, check);
        let handle = tokio::spawn(Arc::clone(self).apply_write(ticket));
        async move { handle.await.map_err(|e| StoreError::Task(e.to_string()))? }
    }

    async fn apply_write(self: Arc<Self>, mut ticket: WriteTicket) -> StoreResult<()> {
        let result = match ticket.wait_turn().await {
            Turn::Elide => {
                debug!(key = ticket.key(), "redundant write elided");
                Ok(())
            }
            Turn::Apply => {
                let key = ticket.key().to_string();
                let value = ticket.value().cloned();
                let check = ticket.check().clone();
                self.write_through(&key, value, &check).await
            }
        };
        ticket.finish(result.is_ok());
        result
    }

    async fn write_through(
        &self,
        key: &str,
        value: Option<Value>,
        check: &UpdateCheck,
    ) -> StoreResult<()> {
        self.gate.wait().await?;
        let first_update = !self.is_refreshed(key);
        if !check.is_always() {
            let current = self.adapter.get(key).await?;
            // An "absent" key is written once so it counts as observed.
            let forced = first_update && current.is_none() && value.is_none();
            if !forced && !check.needs_update(current.as_ref(), value.as_ref()) {
                debug!(key, "write skipped; stored value is current");
                return Ok(());
            }
        }
        self.mark_refreshed(key);
        self.adapter.set(key, value.clone()).await?;
        if let Some(stream) = self.stream_of(key) {
            stream.push(value);
        }
        Ok(())
    }

    fn stream_of(&self, key: &str) -> Option<ValueStream> {
        self.slots
            .lock()
            .expect("slot lock poisoned")
            .get(key)
            .map(|slot| slot.stream.clone())
    }

    fn is_refreshed(&self, key: &str) -> bool {
        self.refreshed
            .lock()
            .expect("refreshed lock poisoned")
            .contains(key)
    }

    fn mark_refreshed(&self, key: &str) {
        self.refreshed
            .lock()
            .expect("refreshed lock poisoned")
            .insert(key.to_string());
    }
}
