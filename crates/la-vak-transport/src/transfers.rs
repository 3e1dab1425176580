use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use uuid::Uuid;

use la_vak_types::{EngineEvent, TransferRecord, TransferStatus};

/// Owns every `TransferRecord` for the life of the process and is the
/// only place that mutates one, so "exactly one terminal event per
/// transfer" holds by construction: the two terminal paths (`complete`,
/// `fail`) both go through [`finish`], which refuses to act twice on an
/// already-terminal record.
pub struct TransferTable {
    inner: Mutex<HashMap<Uuid, TransferRecord>>,
    events: broadcast::Sender<EngineEvent>,
}

impl TransferTable {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn insert(&self, record: TransferRecord) {
        self.inner.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<TransferRecord> {
        self.inner.lock().unwrap().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<TransferRecord> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// Advances `status` and `bytes_transferred` on a non-terminal record
    /// and emits `TransferProgress`. No-op once the transfer is terminal.
    pub fn progress(&self, id: Uuid, status: TransferStatus, bytes_transferred: u64) {
        let record = {
            let mut table = self.inner.lock().unwrap();
            let Some(record) = table.get_mut(&id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            record.status = status;
            record.bytes_transferred = bytes_transferred;
            record.clone()
        };
        let _ = self.events.send(EngineEvent::TransferProgress(record));
    }

    /// Marks a transfer `Completed` and emits `TransferComplete`, unless
    /// it has already reached a terminal state.
    pub fn complete(&self, id: Uuid) {
        self.finish(id, TransferStatus::Completed, None, true);
    }

    /// Marks a transfer `Error` with `message` and emits `TransferError`.
    pub fn fail(&self, id: Uuid, message: impl Into<String>) {
        self.finish(id, TransferStatus::Error, Some(message.into()), false);
    }

    /// Marks a transfer `Rejected` and emits `TransferError` — there is no
    /// dedicated "rejected" event on the bus, so a peer's rejection is
    /// reported through the same channel as any other non-completion.
    pub fn reject(&self, id: Uuid) {
        self.finish(
            id,
            TransferStatus::Rejected,
            Some("rejected by peer".to_string()),
            false,
        );
    }

    fn finish(&self, id: Uuid, status: TransferStatus, error: Option<String>, is_success: bool) {
        let record = {
            let mut table = self.inner.lock().unwrap();
            let Some(record) = table.get_mut(&id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            record.status = status;
            record.error = error;
            if record.status == TransferStatus::Completed {
                record.bytes_transferred = record.file_size;
            }
            record.clone()
        };
        if is_success {
            let _ = self.events.send(EngineEvent::TransferComplete(record));
        } else {
            let _ = self.events.send(EngineEvent::TransferError(record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn table() -> (TransferTable, broadcast::Receiver<EngineEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (TransferTable::new(tx), rx)
    }

    fn record() -> TransferRecord {
        TransferRecord::new(
            Uuid::new_v4(),
            la_vak_types::Direction::Send,
            "file.bin".to_string(),
            1024,
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2))),
        )
    }

    #[test]
    fn complete_emits_exactly_one_terminal_event() {
        let (table, mut rx) = table();
        let record = record();
        let id = record.id;
        table.insert(record);

        table.progress(id, TransferStatus::Transferring, 512);
        table.complete(id);
        table.complete(id); // second call must be a no-op
        table.fail(id, "too late"); // also a no-op

        let mut terminal_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::TransferComplete(_) | EngineEvent::TransferError(_)) {
                terminal_events += 1;
            }
        }
        assert_eq!(terminal_events, 1);
        assert_eq!(table.get(id).unwrap().status, TransferStatus::Completed);
    }

    #[test]
    fn fail_sets_error_message() {
        let (table, _rx) = table();
        let record = record();
        let id = record.id;
        table.insert(record);

        table.fail(id, "decryption failed — possible tampering");
        let stored = table.get(id).unwrap();
        assert_eq!(stored.status, TransferStatus::Error);
        assert_eq!(stored.error.as_deref(), Some("decryption failed — possible tampering"));
    }
}
