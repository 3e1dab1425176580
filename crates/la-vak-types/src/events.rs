use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PeerRecord, TransferRecord};

/// Details of an inbound transfer offer, published once `meta` arrives and
/// before the receiver has decided whether to accept it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingRequest {
    pub transfer_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub peer_ip: IpAddr,
}

/// Every externally-observable event the engine glue can emit, across both
/// Discovery and Transport. Routing every terminal transition through one
/// enum (and, in `la-vak-engine`, one broadcast sender) is what makes
/// "exactly one terminal event per transfer" hold by construction rather
/// than by convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// A peer was newly observed (not previously in the table).
    PeerJoined(PeerRecord),
    /// A peer was evicted by the sweep after `PEER_TIMEOUT`.
    PeerLeft(PeerRecord),
    /// The full peer list changed; batches `PeerJoined`/`PeerLeft` at the
    /// sweep/broadcast tick rather than firing once per hello.
    PeersUpdated(Vec<PeerRecord>),
    /// A transfer's observable state changed, or a chunk was processed.
    TransferProgress(TransferRecord),
    /// Exactly one per transfer on success. Mutually exclusive with
    /// `TransferError`.
    TransferComplete(TransferRecord),
    /// Exactly one per transfer on any terminal failure (`error` or
    /// `rejected`). Mutually exclusive with `TransferComplete`.
    TransferError(TransferRecord),
    /// Exactly once per inbound transfer, when `meta` is received.
    IncomingRequest(IncomingRequest),
}
