/// La-Vak Discovery: UDP-multicast "hello" protocol.
///
/// Maintains a live peer set with no central registry. Three independent
/// tasks drive it — broadcaster, listener, sweep — communicating through a
/// shared peer table and a `tokio::sync::broadcast` event channel.
pub mod hello;
mod peers;
mod socket;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use la_vak_types::{DeviceIdentity, EngineEvent, PeerRecord};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

pub use hello::HelloMessage;
use peers::PeerTable;

/// Multicast group all La-Vak nodes join.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);
/// UDP port for the multicast group.
pub const MULTICAST_PORT: u16 = 41234;
/// How often this node announces itself.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(3);
/// A peer not heard from in longer than this is considered gone.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(10);
/// How often the stale-peer sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// IPv4 multicast TTL so hellos cross ordinary LAN switches/routers.
pub const MULTICAST_TTL: u32 = 128;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A single interface failing `join_multicast_v4` is never fatal — it
    /// is logged and the remaining candidates are still tried — but the
    /// typed variant exists so the failure carries structured fields
    /// through `tracing` instead of being stringified early.
    #[error("failed to join multicast group on interface {interface}: {source}")]
    Join {
        interface: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },
}

struct Tasks {
    broadcaster: JoinHandle<()>,
    listener: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

/// Owns the multicast socket and the peer map exclusively — no other
/// component may read or write either directly. External readers get
/// snapshots via `peers()`.
pub struct Discovery {
    identity: DeviceIdentity,
    table: Arc<PeerTable>,
    events: broadcast::Sender<EngineEvent>,
    tasks: Mutex<Option<Tasks>>,
}

impl Discovery {
    pub fn new(identity: DeviceIdentity) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            identity,
            table: Arc::new(PeerTable::new()),
            events,
            tasks: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Current peer snapshot. Never includes this process's own identity —
    /// self-suppression is enforced at ingest, not here.
    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.table.snapshot().await
    }

    /// Binds the multicast socket, joins the group, and starts the
    /// broadcaster, listener, and sweep tasks. A bind failure is fatal and
    /// propagated; a multicast-join failure on any one candidate interface
    /// is logged and skipped, since multi-homed hosts may have unjoinable
    /// interfaces.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, MULTICAST_PORT).into();
        let std_socket =
            socket::bind_multicast_socket(bind_addr).map_err(|source| DiscoveryError::Bind {
                addr: bind_addr,
                source,
            })?;
        let socket = Arc::new(
            UdpSocket::from_std(std_socket).map_err(|source| DiscoveryError::Bind {
                addr: bind_addr,
                source,
            })?,
        );

        for candidate in socket::candidate_interfaces() {
            match socket.join_multicast_v4(MULTICAST_GROUP, candidate) {
                Ok(()) => tracing::info!(interface = %candidate, "joined multicast group"),
                Err(source) => {
                    let error = DiscoveryError::Join { interface: candidate, source };
                    tracing::warn!(%error, "skipping interface");
                }
            }
        }

        let broadcaster = tokio::spawn(run_broadcaster(socket.clone(), self.identity.clone()));
        let listener = tokio::spawn(run_listener(
            socket.clone(),
            self.identity.device_id.clone(),
            self.table.clone(),
            self.events.clone(),
        ));
        let sweep = tokio::spawn(run_sweep(self.table.clone(), self.events.clone()));

        *self.tasks.lock().await = Some(Tasks {
            broadcaster,
            listener,
            sweep,
        });
        Ok(())
    }

    /// Clears timers, drops the socket, and clears the peer map. Errors
    /// dropping multicast membership are ignored — the socket is about to
    /// be closed outright.
    pub async fn stop(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.broadcaster.abort();
            tasks.listener.abort();
            tasks.sweep.abort();
        }
        self.table.clear().await;
    }
}

async fn run_broadcaster(socket: Arc<UdpSocket>, identity: DeviceIdentity) {
    let target: SocketAddr = (MULTICAST_GROUP, MULTICAST_PORT).into();
    let mut interval = tokio::time::interval(BROADCAST_INTERVAL);
    loop {
        interval.tick().await;
        let hello = HelloMessage::from_identity(&identity);
        match serde_json::to_vec(&hello) {
            Ok(datagram) => {
                // Send errors are per-datagram and never terminate the loop.
                if let Err(error) = socket.send_to(&datagram, target).await {
                    tracing::debug!(%error, "hello send failed");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to encode hello"),
        }
    }
}

async fn run_listener(
    socket: Arc<UdpSocket>,
    self_id: String,
    table: Arc<PeerTable>,
    events: broadcast::Sender<EngineEvent>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::debug!(%error, "discovery recv failed");
                continue;
            }
        };

        let hello: HelloMessage = match serde_json::from_slice(&buf[..len]) {
            Ok(h) => h,
            Err(_) => continue, // malformed datagrams are dropped silently
        };
        if hello.kind != hello::HELLO_TYPE {
            continue;
        }
        if hello.id == self_id {
            continue; // never record ourselves, regardless of our own hellos
        }

        let ip = strip_port(from);
        let record = hello.into_peer_record(ip);
        match table.upsert(record.clone()).await {
            peers::Upsert::New => {
                let _ = events.send(EngineEvent::PeerJoined(record));
                let _ = events.send(EngineEvent::PeersUpdated(table.snapshot().await));
            }
            peers::Upsert::Updated => {
                let _ = events.send(EngineEvent::PeersUpdated(table.snapshot().await));
            }
        }
    }
}

async fn run_sweep(table: Arc<PeerTable>, events: broadcast::Sender<EngineEvent>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let evicted = table.evict_stale(PEER_TIMEOUT).await;
        if !evicted.is_empty() {
            for peer in &evicted {
                let _ = events.send(EngineEvent::PeerLeft(peer.clone()));
            }
            let _ = events.send(EngineEvent::PeersUpdated(table.snapshot().await));
        }
    }
}

fn strip_port(addr: SocketAddr) -> IpAddr {
    addr.ip()
}
