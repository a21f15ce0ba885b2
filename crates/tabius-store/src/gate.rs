//! One-time initialization barrier for a store.

use tokio::sync::watch;

use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq, Eq)]
enum GateState {
    Pending,
    Ready,
    Failed(String),
}

/// Resolved exactly once, after the adapter is initialized (and server state
/// imported). Every adapter access waits on it.
pub(crate) struct InitGate {
    namespace: String,
    state: watch::Sender<GateState>,
}

impl InitGate {
    pub(crate) fn new(namespace: impl Into<String>) -> Self {
        let (state, _) = watch::channel(GateState::Pending);
        Self {
            namespace: namespace.into(),
            state,
        }
    }

    pub(crate) fn open(&self) {
        self.resolve(GateState::Ready);
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) {
        self.resolve(GateState::Failed(reason.into()));
    }

    fn resolve(&self, next: GateState) {
        self.state.send_if_modified(|state| {
            if *state != GateState::Pending {
                return false;
            }
            *state = next;
            true
        });
    }

    pub(crate) fn is_ready(&self) -> bool {
        *self.state.borrow() == GateState::Ready
    }

    pub(crate) async fn wait(&self) -> StoreResult<()> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != GateState::Pending)
            .await
            .map_err(|_| StoreError::Closed {
                namespace: self.namespace.clone(),
            })?;
        match &*state {
            GateState::Failed(reason) => Err(StoreError::InitFailed {
                namespace: self.namespace.clone(),
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}
