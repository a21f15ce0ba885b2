//! Remote fetch capability and per-key fetch deduplication.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tabius_types::Value;
use tracing::{debug, warn};

/// Error returned by a caller-supplied fetch function.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one fetch: a value, `None` for "source has nothing", or an
/// error (which the store maps to "absent").
pub type FetchResult = Result<Option<Value>, FetchError>;

/// Caller-supplied capability that loads a key's value from a remote source.
#[derive(Clone)]
pub struct Fetcher {
    call: Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>,
}

impl Fetcher {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        Self {
            call: Arc::new(move || f().boxed()),
        }
    }

    /// A fetcher that always yields `value`.
    pub fn constant(value: Option<Value>) -> Self {
        Self::new(move || {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    pub fn call(&self) -> BoxFuture<'static, FetchResult> {
        (self.call)()
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<Value>>>;

/// Keeps at most one outstanding fetch per key; late callers join it.
#[derive(Default)]
pub(crate) struct FetchDeduplicator {
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl FetchDeduplicator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `fetcher` for `key`, or join the fetch already in flight for it.
    ///
    /// Errors are logged and resolve to `None`. The registration is cleared
    /// once the shared result settles, so the next call starts afresh.
    pub(crate) async fn run(&self, key: &str, fetcher: &Fetcher) -> Option<Value> {
        let op = self.join_or_start(key, fetcher);
        let result = op.clone().await;
        self.settle(key, &op);
        result
    }

    fn join_or_start(&self, key: &str, fetcher: &Fetcher) -> SharedFetch {
        let mut in_flight = self.in_flight.lock().expect("fetch lock poisoned");
        if let Some(op) = in_flight.get(key) {
            debug!(key, "joining in-flight fetch");
            return op.clone();
        }
        let owned_key = key.to_string();
        let op = fetcher
            .call()
            .map(move |result| match result {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %owned_key, error = %e, "fetch failed; treating as absent");
                    None
                }
            })
            .boxed()
            .shared();
        in_flight.insert(key.to_string(), op.clone());
        op
    }

    fn settle(&self, key: &str, op: &SharedFetch) {
        let mut in_flight = self.in_flight.lock().expect("fetch lock poisoned");
        if in_flight.get(key).is_some_and(|current| current.ptr_eq(op)) {
            in_flight.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.lock().expect("fetch lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn counting(calls: Arc<AtomicUsize>, release: Arc<Notify>, value: Value) -> Fetcher {
        Fetcher::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let release = Arc::clone(&release);
            let value = value.clone();
            async move {
                release.notified().await;
                Ok::<_, FetchError>(Some(value))
            }
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let fetcher = counting(Arc::clone(&calls), Arc::clone(&release), json!("v"));
        let dedup = FetchDeduplicator::new();

        let a = dedup.run("k", &fetcher);
        let b = dedup.run("k", &fetcher);
        let releaser = async {
            tokio::task::yield_now().await;
            release.notify_one();
        };
        let (ra, rb, ()) = tokio::join!(a, b, releaser);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ra, Some(json!("v")));
        assert_eq!(rb, Some(json!("v")));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn settled_fetch_is_not_reused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetcher = Fetcher::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, FetchError>(Some(json!(n))) }
        });
        let dedup = FetchDeduplicator::new();

        assert_eq!(dedup.run("k", &fetcher).await, Some(json!(0)));
        assert_eq!(dedup.run("k", &fetcher).await, Some(json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_resolve_to_absent_and_do_not_poison() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetcher = Fetcher::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err::<Option<Value>, FetchError>("connection reset".into())
                } else {
                    Ok(Some(json!("recovered")))
                }
            }
        });
        let dedup = FetchDeduplicator::new();

        assert_eq!(dedup.run("k", &fetcher).await, None);
        assert_eq!(dedup.run("k", &fetcher).await, Some(json!("recovered")));
    }

    #[tokio::test]
    async fn different_keys_fetch_independently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let fetcher = counting(Arc::clone(&calls), Arc::clone(&release), json!(1));
        let dedup = FetchDeduplicator::new();

        let a = dedup.run("a", &fetcher);
        let b = dedup.run("b", &fetcher);
        let releaser = async {
            tokio::task::yield_now().await;
            release.notify_waiters();
        };
        tokio::join!(a, b, releaser);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
