//! Per-key write ordering.
//!
//! Every `set` becomes a [`WriteTicket`] enqueued synchronously at call time.
//! A ticket waits for the ticket before it to finish, so writes to one key
//! are applied one at a time in submission order. Writes to different keys
//! never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tabius_types::{UpdateCheck, Value};
use tokio::sync::watch;

/// A queued write: the payload plus a completion signal.
struct WriteIntent {
    value: Option<Value>,
    check: UpdateCheck,
    /// `None` while pending, then whether the write succeeded.
    outcome: watch::Sender<Option<bool>>,
}

/// What a ticket should do once its predecessor has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Turn {
    Apply,
    /// Equivalent to the write just before it; drop without touching storage.
    Elide,
}

#[derive(Default)]
pub(crate) struct WriteSerializer {
    queues: Mutex<HashMap<String, VecDeque<Arc<WriteIntent>>>>,
}

impl WriteSerializer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a write intent behind any already queued for `key`.
    pub(crate) fn enqueue(
        self: &Arc<Self>,
        key: &str,
        value: Option<Value>,
        check: UpdateCheck,
    ) -> WriteTicket {
        let (outcome, _) = watch::channel(None);
        let intent = Arc::new(WriteIntent {
            value,
            check,
            outcome,
        });
        let mut queues = self.queues.lock().expect("write queue lock poisoned");
        let queue = queues.entry(key.to_string()).or_default();
        let predecessor = queue.back().cloned();
        queue.push_back(Arc::clone(&intent));
        WriteTicket {
            key: key.to_string(),
            intent,
            predecessor,
            serializer: Arc::clone(self),
            finished: false,
        }
    }

    /// Number of writes queued or in flight for `key`.
    #[cfg(test)]
    pub(crate) fn pending(&self, key: &str) -> usize {
        self.queues
            .lock()
            .expect("write queue lock poisoned")
            .get(key)
            .map_or(0, VecDeque::len)
    }

    fn dequeue(&self, key: &str, intent: &Arc<WriteIntent>) {
        let mut queues = self.queues.lock().expect("write queue lock poisoned");
        if let Some(queue) = queues.get_mut(key) {
            queue.retain(|queued| !Arc::ptr_eq(queued, intent));
            if queue.is_empty() {
                queues.remove(key);
            }
        }
    }
}

/// A position in a key's write queue.
///
/// Dropping an unfinished ticket marks it failed, so its successors are never
/// left waiting.
pub(crate) struct WriteTicket {
    key: String,
    intent: Arc<WriteIntent>,
    predecessor: Option<Arc<WriteIntent>>,
    serializer: Arc<WriteSerializer>,
    finished: bool,
}

impl WriteTicket {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> Option<&Value> {
        self.intent.value.as_ref()
    }

    pub(crate) fn check(&self) -> &UpdateCheck {
        &self.intent.check
    }

    /// Wait until the previous write for this key has finished, then decide
    /// whether this one still needs to run.
    ///
    /// A write is elided only when its predecessor succeeded, both use the
    /// same update predicate, and the predicate (or plain equality) says the
    /// two values are equivalent.
    pub(crate) async fn wait_turn(&mut self) -> Turn {
        let Some(prev) = self.predecessor.take() else {
            return Turn::Apply;
        };
        let mut rx = prev.outcome.subscribe();
        let succeeded = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome == Some(true),
            Err(_) => false,
        };
        if !succeeded || !self.intent.check.same_predicate(&prev.check) {
            return Turn::Apply;
        }
        let (new, old) = (self.intent.value.as_ref(), prev.value.as_ref());
        // The queued value is compared as the stored one, the predecessor as
        // the incoming one.
        if new == old || !self.intent.check.needs_update(new, old) {
            Turn::Elide
        } else {
            Turn::Apply
        }
    }

    /// Signal completion to the next ticket and leave the queue.
    pub(crate) fn finish(mut self, succeeded: bool) {
        self.complete(succeeded);
    }

    fn complete(&mut self, succeeded: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.intent.outcome.send_replace(Some(succeeded));
        self.serializer.dequeue(&self.key, &self.intent);
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.complete(false);
    }
}
