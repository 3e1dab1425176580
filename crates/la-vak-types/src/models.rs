use std::net::IpAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-lifetime identity, derived from hostname + pid at startup.
/// Never persisted across restarts — a new process is a new identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
    pub http_port: u16,
    pub transport_port: u16,
}

/// A reachable peer on the LAN, as last observed via its hello datagram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerRecord {
    pub peer_id: String,
    pub device_name: String,
    pub ip: IpAddr,
    pub http_port: u16,
    pub transport_port: u16,
    pub platform: String,
    pub last_seen: DateTime<Utc>,
}

/// Direction of a transfer relative to this process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

/// Lifecycle status of a transfer. Updated only by the transport state
/// machine — no other component may write to a `TransferRecord.status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Connecting,
    Handshake,
    /// Receive-only: `meta` has arrived, awaiting the external accept/reject.
    Pending,
    Transferring,
    Verifying,
    Completed,
    Rejected,
    Error,
}

impl TransferStatus {
    /// Whether this status is terminal — no further transitions occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Rejected | TransferStatus::Error
        )
    }
}

/// Snapshot of one transfer, sent and received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub direction: Direction,
    pub file_name: String,
    pub file_size: u64,
    pub bytes_transferred: u64,
    pub status: TransferStatus,
    pub peer_ip: Option<IpAddr>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub dest_path: Option<PathBuf>,
}

impl TransferRecord {
    pub fn new(
        id: Uuid,
        direction: Direction,
        file_name: String,
        file_size: u64,
        peer_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            id,
            direction,
            file_name,
            file_size,
            bytes_transferred: 0,
            status: TransferStatus::Connecting,
            peer_ip,
            error: None,
            start_time: Utc::now(),
            dest_path: None,
        }
    }
}
