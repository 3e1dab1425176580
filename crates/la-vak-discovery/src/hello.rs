use std::net::IpAddr;

use chrono::Utc;
use la_vak_types::{DeviceIdentity, PeerRecord};
use serde::{Deserialize, Serialize};

/// The `type` value every hello datagram carries.
pub const HELLO_TYPE: &str = "LAVAK_HELLO";

/// Wire shape of the UDP multicast hello datagram. The sender's IP is
/// never trusted from the payload — it is always taken from the UDP
/// source address by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(rename = "httpPort")]
    pub http_port: u16,
    #[serde(rename = "transportPort")]
    pub transport_port: u16,
    pub platform: String,
}

impl HelloMessage {
    pub fn from_identity(identity: &DeviceIdentity) -> Self {
        Self {
            kind: HELLO_TYPE.to_string(),
            id: identity.device_id.clone(),
            device_name: identity.device_name.clone(),
            http_port: identity.http_port,
            transport_port: identity.transport_port,
            platform: identity.platform.clone(),
        }
    }

    pub fn into_peer_record(self, ip: IpAddr) -> PeerRecord {
        PeerRecord {
            peer_id: self.id,
            device_name: self.device_name,
            ip,
            http_port: self.http_port,
            transport_port: self.transport_port,
            platform: self.platform,
            last_seen: Utc::now(),
        }
    }
}
