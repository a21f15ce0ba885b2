//! Per-key multicast value streams.
//!
//! A [`ValueStream`] is an observer list over a last-value cell. Every
//! subscriber first receives the latest settled value (if any), then every
//! later push in order. Nothing is coalesced: a slow subscriber still sees
//! each emission.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use serde::de::DeserializeOwned;
use tabius_types::Value;
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// One emission: a value, or `None` for "absent".
pub type Emission = Option<Value>;

struct StreamState {
    /// `None` until the first push; afterwards the most recent emission.
    latest: Option<Emission>,
    observers: Vec<mpsc::UnboundedSender<Emission>>,
}

/// Multicast stream replaying its latest emission to new subscribers.
#[derive(Clone)]
pub struct ValueStream {
    state: Arc<Mutex<StreamState>>,
}

impl ValueStream {
    /// A stream with nothing settled yet.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState {
                latest: None,
                observers: Vec::new(),
            })),
        }
    }

    /// A stream already holding `value`.
    pub fn seeded(value: Emission) -> Self {
        let stream = Self::new();
        stream.push(value);
        stream
    }

    /// Record `value` as latest and deliver it to every live subscriber.
    /// Subscribers that have gone away are pruned.
    pub fn push(&self, value: Emission) {
        let mut state = self.state.lock().expect("stream lock poisoned");
        state
            .observers
            .retain(|tx| tx.send(value.clone()).is_ok());
        state.latest = Some(value);
    }

    /// Push only if nothing has been emitted yet. Returns whether it pushed.
    pub fn push_if_unsettled(&self, value: Emission) -> bool {
        let mut state = self.state.lock().expect("stream lock poisoned");
        if state.latest.is_some() {
            return false;
        }
        state
            .observers
            .retain(|tx| tx.send(value.clone()).is_ok());
        state.latest = Some(value);
        true
    }

    /// Push unless the latest emission already equals `value`.
    pub fn push_if_changed(&self, value: Emission) -> bool {
        let mut state = self.state.lock().expect("stream lock poisoned");
        if state.latest.as_ref() == Some(&value) {
            return false;
        }
        state
            .observers
            .retain(|tx| tx.send(value.clone()).is_ok());
        state.latest = Some(value);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().expect("stream lock poisoned").latest.is_some()
    }

    /// The latest emission, or `None` if nothing was emitted yet.
    pub fn latest(&self) -> Option<Emission> {
        self.state.lock().expect("stream lock poisoned").latest.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("stream lock poisoned");
        if let Some(latest) = &state.latest {
            // The receiver is alive, so this cannot fail.
            let _ = tx.send(latest.clone());
        }
        state.observers.push(tx);
        Subscription { rx }
    }

    /// Number of live subscribers as of the last push.
    pub fn observer_count(&self) -> usize {
        self.state.lock().expect("stream lock poisoned").observers.len()
    }
}

impl Default for ValueStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("stream lock poisoned");
        f.debug_struct("ValueStream")
            .field("latest", &state.latest)
            .field("observers", &state.observers.len())
            .finish()
    }
}

/// A subscriber's view of a [`ValueStream`].
///
/// Yields `Some(emission)` for every value pushed after (and the one latest
/// before) subscribing, and `None` once the stream can never emit again.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Emission>,
}

impl Subscription {
    /// A closed subscription that yields "absent" once.
    pub fn absent() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(None);
        Self { rx }
    }

    /// Wait for the next emission.
    pub async fn recv(&mut self) -> Option<Emission> {
        self.rx.recv().await
    }

    /// Next emission if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Emission> {
        self.rx.try_recv().ok()
    }

    /// The first emission, flattened: a closed stream reads as absent.
    pub async fn first(mut self) -> Option<Value> {
        self.rx.recv().await.flatten()
    }

    /// The first emission decoded as `T`.
    pub async fn first_as<T: DeserializeOwned>(self) -> StoreResult<Option<T>> {
        match self.first().await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl Stream for Subscription {
    type Item = Emission;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn replays_latest_to_late_subscriber() {
        let stream = ValueStream::new();
        stream.push(Some(json!(1)));
        stream.push(Some(json!(2)));

        let mut sub = stream.subscribe();
        assert_eq!(sub.recv().await, Some(Some(json!(2))));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn delivers_every_push_in_order() {
        let stream = ValueStream::new();
        let mut sub = stream.subscribe();
        stream.push(Some(json!("a")));
        stream.push(None);
        stream.push(Some(json!("b")));

        let got: Vec<Emission> = vec![
            sub.recv().await.unwrap(),
            sub.recv().await.unwrap(),
            sub.recv().await.unwrap(),
        ];
        assert_eq!(got, vec![Some(json!("a")), None, Some(json!("b"))]);
    }

    #[tokio::test]
    async fn unsettled_stream_has_nothing_to_replay() {
        let stream = ValueStream::new();
        let mut sub = stream.subscribe();
        assert!(!stream.is_settled());
        assert_eq!(sub.try_recv(), None);
        assert_eq!(stream.latest(), None);
    }

    #[test]
    fn push_if_unsettled_only_once() {
        let stream = ValueStream::new();
        assert!(stream.push_if_unsettled(None));
        assert!(!stream.push_if_unsettled(Some(json!(1))));
        assert_eq!(stream.latest(), Some(None));
    }

    #[test]
    fn push_if_changed_skips_duplicates() {
        let stream = ValueStream::seeded(None);
        assert!(!stream.push_if_changed(None));
        assert!(stream.push_if_changed(Some(json!(1))));
        assert!(!stream.push_if_changed(Some(json!(1))));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let stream = ValueStream::new();
        let keep = stream.subscribe();
        drop(stream.subscribe());
        assert_eq!(stream.observer_count(), 2);
        stream.push(Some(json!(0)));
        assert_eq!(stream.observer_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn absent_subscription_yields_once_then_closes() {
        let mut sub = Subscription::absent();
        assert_eq!(sub.recv().await, Some(None));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn works_as_futures_stream() {
        let stream = ValueStream::seeded(Some(json!({"id": 7})));
        let mut sub = stream.subscribe();
        assert_eq!(sub.next().await, Some(Some(json!({"id": 7}))));
    }

    #[tokio::test]
    async fn first_as_decodes() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Song {
            id: u32,
        }
        let stream = ValueStream::seeded(Some(json!({"id": 7})));
        let song: Option<Song> = stream.subscribe().first_as().await.unwrap();
        assert_eq!(song, Some(Song { id: 7 }));
    }
}
