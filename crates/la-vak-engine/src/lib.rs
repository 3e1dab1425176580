//! Wires Discovery and Transport together behind one control surface and
//! one merged event bus. `la-vak-node` is a thin binary shell around this
//! crate; this is where the two subsystems actually meet.

mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use la_vak_discovery::Discovery;
use la_vak_transport::Transport;
use la_vak_types::{DeviceIdentity, EngineEvent, PeerRecord, TransferRecord};

pub use error::EngineError;

/// Overrides the computed downloads directory; see
/// [`default_downloads_dir`].
pub const DOWNLOADS_DIR_ENV_VAR: &str = "LA_VAK_DOWNLOADS_DIR";

/// Overrides the device name otherwise derived from the hostname.
pub const DEVICE_NAME_ENV_VAR: &str = "LA_VAK_DEVICE_NAME";

/// Announced in `DeviceIdentity.http_port` for the out-of-scope HTTP
/// facade to bind to; Discovery only relays this value; it is never
/// consulted by this workspace.
pub const HTTP_PORT_ENV_VAR: &str = "LA_VAK_HTTP_PORT";

/// `$HOME/Downloads/la-vak`, unless [`DOWNLOADS_DIR_ENV_VAR`] is set.
pub fn default_downloads_dir() -> Result<PathBuf, EngineError> {
    if let Ok(dir) = std::env::var(DOWNLOADS_DIR_ENV_VAR) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(EngineError::NoHomeDir)?;
    Ok(home.join("Downloads").join("la-vak"))
}

struct Forwarders {
    discovery: JoinHandle<()>,
    transport: JoinHandle<()>,
}

/// The running node: a started [`Discovery`] instance, a started
/// [`Transport`] instance, and the merged event bus both forward into.
pub struct Engine {
    discovery: Discovery,
    transport: Arc<Transport>,
    identity: DeviceIdentity,
    events: broadcast::Sender<EngineEvent>,
    forwarders: Mutex<Option<Forwarders>>,
}

impl Engine {
    /// Builds this process's identity, starts the transport listener on
    /// `bind_addr`, then starts discovery advertising the port the
    /// listener actually bound to. Both subsystems' events are merged
    /// onto one bus, reachable via [`Engine::subscribe`].
    pub async fn start(bind_addr: SocketAddr) -> Result<Self, EngineError> {
        let downloads_dir = default_downloads_dir()?;
        Self::start_with_downloads_dir(bind_addr, downloads_dir).await
    }

    /// Same as [`Engine::start`], but with the downloads directory passed
    /// in directly instead of derived from [`DOWNLOADS_DIR_ENV_VAR`]/
    /// `$HOME`. Exists so callers that need an explicit, isolated
    /// directory — tests running several engines in one process, most
    /// notably — don't have to round-trip through a process-global env
    /// var to get one.
    pub async fn start_with_downloads_dir(
        bind_addr: SocketAddr,
        downloads_dir: PathBuf,
    ) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(&downloads_dir).await?;

        let host = hostname::get()
            .map_err(EngineError::Hostname)?
            .to_string_lossy()
            .into_owned();
        let device_name = std::env::var(DEVICE_NAME_ENV_VAR).unwrap_or_else(|_| host.clone());
        let http_port: u16 = std::env::var(HTTP_PORT_ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let transport = Arc::new(Transport::new(host.clone(), downloads_dir));
        let local_addr = transport.start(bind_addr).await?;

        let identity = DeviceIdentity {
            device_id: format!("{host}-{}", std::process::id()),
            device_name,
            platform: std::env::consts::OS.to_string(),
            http_port,
            transport_port: local_addr.port(),
        };

        let discovery = Discovery::new(identity.clone());
        discovery.start().await?;

        let (events, _rx) = broadcast::channel(256);
        let forwarders = spawn_forwarders(&discovery, &transport, events.clone());

        info!(%local_addr, device_id = %identity.device_id, "engine started");

        Ok(Self {
            discovery,
            transport,
            identity,
            events,
            forwarders: Mutex::new(Some(forwarders)),
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The merged event bus: every `PeerJoined`/`PeerLeft`/`PeersUpdated`
    /// from discovery and every transfer/incoming-request event from
    /// transport, in emission order per subsystem.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.discovery.peers().await
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.transport.transfers()
    }

    /// Starts sending `path` to `peer_addr`, returning the transfer's id
    /// immediately; its progress and outcome arrive through
    /// [`Engine::subscribe`] and [`Engine::transfers`]. `display_name`
    /// overrides the name the peer sees and saves as; `None` falls back
    /// to `path`'s basename.
    pub async fn send_file(
        &self,
        peer_addr: SocketAddr,
        path: PathBuf,
        display_name: Option<String>,
    ) -> Result<Uuid, EngineError> {
        Ok(self.transport.send_file(peer_addr, path, display_name).await?)
    }

    /// Answers a pending `IncomingRequest`. Returns `false` if it was
    /// already answered or the sender disconnected first.
    pub fn respond_to_incoming(&self, id: Uuid, accept: bool) -> bool {
        self.transport.respond_to_incoming(id, accept)
    }

    pub async fn stop(&self) {
        self.transport.stop().await;
        self.discovery.stop().await;
        if let Some(forwarders) = self.forwarders.lock().await.take() {
            forwarders.discovery.abort();
            forwarders.transport.abort();
        }
    }
}

fn spawn_forwarders(
    discovery: &Discovery,
    transport: &Transport,
    events: broadcast::Sender<EngineEvent>,
) -> Forwarders {
    let mut discovery_rx = discovery.subscribe();
    let discovery_events = events.clone();
    let discovery_task = tokio::spawn(async move {
        while let Ok(event) = discovery_rx.recv().await {
            let _ = discovery_events.send(event);
        }
    });

    let mut transport_rx = transport.subscribe();
    let transport_task = tokio::spawn(async move {
        while let Ok(event) = transport_rx.recv().await {
            let _ = events.send(event);
        }
    });

    Forwarders {
        discovery: discovery_task,
        transport: transport_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn two_engines_exchange_a_file_over_loopback() {
        let send_home = tempfile::tempdir().unwrap();
        let recv_home = tempfile::tempdir().unwrap();
        let receiver = Engine::start_with_downloads_dir(
            (Ipv4Addr::LOCALHOST, 0).into(),
            recv_home.path().to_path_buf(),
        )
        .await
        .unwrap();
        let sender = Engine::start_with_downloads_dir(
            (Ipv4Addr::LOCALHOST, 0).into(),
            send_home.path().to_path_buf(),
        )
        .await
        .unwrap();

        let file_path = send_home.path().join("note.txt");
        tokio::fs::write(&file_path, b"engine-level loopback").await.unwrap();

        let receiver_events = receiver.subscribe();
        let target: SocketAddr = (Ipv4Addr::LOCALHOST, receiver.identity().transport_port).into();
        sender.send_file(target, file_path, None).await.unwrap();

        let mut rx = receiver_events;
        let transfer_id = loop {
            match tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap()
            {
                EngineEvent::IncomingRequest(req) => break req.transfer_id,
                _ => continue,
            }
        };
        assert!(receiver.respond_to_incoming(transfer_id, true));

        loop {
            match tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap()
            {
                EngineEvent::TransferComplete(record) if record.id == transfer_id => break,
                _ => continue,
            }
        }

        let written = tokio::fs::read(recv_home.path().join("note.txt")).await.unwrap();
        assert_eq!(written, b"engine-level loopback");

        sender.stop().await;
        receiver.stop().await;
    }
}
