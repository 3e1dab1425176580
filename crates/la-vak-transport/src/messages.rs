use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header shapes for each message type on the wire. The payload (only
/// `Data` carries one) travels alongside the header inside the same
/// frame, not embedded in this JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageHeader {
    /// sender -> receiver: opens the handshake.
    Hello {
        #[serde(rename = "publicKey")]
        public_key: String,
        #[serde(rename = "transferId")]
        transfer_id: Uuid,
    },
    /// receiver -> sender: the wrapped session key and base IV.
    Session {
        #[serde(rename = "encryptedKey")]
        encrypted_key: String,
        iv: String,
    },
    /// sender -> receiver: file metadata, sent once the session is known.
    Meta {
        name: String,
        size: u64,
        hash: String,
        #[serde(rename = "transferId")]
        transfer_id: Uuid,
    },
    /// receiver -> sender: the user accepted the incoming transfer.
    Accepted {
        #[serde(rename = "transferId")]
        transfer_id: Uuid,
    },
    /// receiver -> sender: the user rejected the incoming transfer.
    Rejected {
        #[serde(rename = "transferId")]
        transfer_id: Uuid,
    },
    /// sender -> receiver: one encrypted chunk. Ciphertext is the frame
    /// payload; this header carries only the chunk's out-of-band fields.
    Data {
        index: u32,
        #[serde(rename = "authTag")]
        auth_tag: String,
        #[serde(rename = "chunkSize")]
        chunk_size: u32,
    },
    /// sender -> receiver: no more `data` frames follow.
    Done,
}
