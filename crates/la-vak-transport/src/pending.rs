use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

/// The user's answer to an `IncomingRequest` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Holds the `oneshot::Sender` half for every incoming transfer that is
/// waiting on the application to call `respond_to_incoming`. The receiver
/// task blocks on the matching `Receiver` inside its
/// handshake state machine; `resolve` is how the engine's public API
/// wakes it back up.
pub struct PendingTable {
    inner: Mutex<HashMap<Uuid, oneshot::Sender<Decision>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a transfer as awaiting a decision and returns the
    /// receiving half to `.await` on.
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(id, tx);
        rx
    }

    /// Delivers `decision` to the waiting receiver task, if one is still
    /// registered. Returns `false` for an unknown id (already resolved,
    /// or the connection dropped before a decision arrived).
    pub fn resolve(&self, id: Uuid, decision: Decision) -> bool {
        match self.inner.lock().unwrap().remove(&id) {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Drops the pending entry without resolving it, e.g. when the
    /// connection closes before the user responds.
    pub fn cancel(&self, id: Uuid) {
        self.inner.lock().unwrap().remove(&id);
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_wakes_the_registered_receiver() {
        let table = PendingTable::new();
        let id = Uuid::new_v4();
        let rx = table.register(id);

        assert!(table.resolve(id, Decision::Accept));
        assert_eq!(rx.await.unwrap(), Decision::Accept);
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let table = PendingTable::new();
        assert!(!table.resolve(Uuid::new_v4(), Decision::Reject));
    }

    #[tokio::test]
    async fn cancel_drops_without_resolving() {
        let table = PendingTable::new();
        let id = Uuid::new_v4();
        let rx = table.register(id);
        table.cancel(id);
        assert!(rx.await.is_err());
    }
}
