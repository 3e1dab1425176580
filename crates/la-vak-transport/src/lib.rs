//! The TLS-based secure file transport: per-transfer RSA key exchange,
//! AES-256-GCM chunk streaming, and SHA-256 verification of the
//! assembled file, all riding over one TLS connection per transfer.

pub mod error;
pub mod framing;
pub mod messages;
pub mod pending;
pub mod receiver;
pub mod sender;
pub mod tls;
pub mod transfers;
mod util;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{info, warn};
use uuid::Uuid;

pub use error::TransportError;
pub use util::safe_download_path;

use la_vak_types::{Direction, EngineEvent, TransferRecord};
use pending::{Decision, PendingTable};
use transfers::TransferTable;

struct ListenerHandle {
    accept: JoinHandle<()>,
}

/// Owns the listening socket, the in-flight transfer table, and the
/// pending-decision table. One `Transport` per process; `la-vak-engine`
/// wires its events into the unified engine event bus alongside
/// Discovery's.
pub struct Transport {
    downloads_dir: PathBuf,
    subject: String,
    transfers: Arc<TransferTable>,
    pending: Arc<PendingTable>,
    events: broadcast::Sender<EngineEvent>,
    listener: Mutex<Option<ListenerHandle>>,
    connector: TlsConnector,
}

impl Transport {
    /// `subject` becomes the CN of the ephemeral TLS certificate
    /// (typically the local hostname); `downloads_dir` is where accepted
    /// transfers are written.
    pub fn new(subject: impl Into<String>, downloads_dir: PathBuf) -> Self {
        let (events, _) = broadcast::channel(256);
        let transfers = Arc::new(TransferTable::new(events.clone()));
        let connector = TlsConnector::from(tls::client_config());
        Self {
            downloads_dir,
            subject: subject.into(),
            transfers,
            pending: Arc::new(PendingTable::new()),
            events,
            listener: Mutex::new(None),
            connector,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.transfers.list()
    }

    /// Resolves an incoming transfer previously surfaced via an
    /// `IncomingRequest` event. Returns `false` if there is no longer a
    /// pending decision for `id` — already resolved, or the sender
    /// disconnected before the user answered.
    pub fn respond_to_incoming(&self, id: Uuid, accept: bool) -> bool {
        let decision = if accept { Decision::Accept } else { Decision::Reject };
        self.pending.resolve(id, decision)
    }

    /// Generates this run's ephemeral TLS identity and starts accepting
    /// connections. Each accepted connection is handled as an inbound
    /// transfer on its own task; a connection failing never brings down
    /// the listener.
    pub async fn start(&self, bind_addr: SocketAddr) -> Result<SocketAddr, TransportError> {
        let identity = tls::generate_identity(&self.subject)?;
        let server_config = tls::server_config(&identity)?;
        let acceptor = TlsAcceptor::from(server_config);

        let tcp_listener = TcpListener::bind(bind_addr).await?;
        let local_addr = tcp_listener.local_addr()?;

        let downloads_dir = self.downloads_dir.clone();
        let transfers = self.transfers.clone();
        let pending = self.pending.clone();
        let events = self.events.clone();

        let accept = tokio::spawn(async move {
            loop {
                let (stream, addr) = match tcp_listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let downloads_dir = downloads_dir.clone();
                let transfers = transfers.clone();
                let pending = pending.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    receiver::handle_connection(
                        acceptor,
                        stream,
                        addr.ip(),
                        downloads_dir,
                        transfers,
                        pending,
                        events,
                    )
                    .await;
                });
            }
        });

        *self.listener.lock().await = Some(ListenerHandle { accept });
        info!(%local_addr, "transport listening");
        Ok(local_addr)
    }

    pub async fn stop(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.accept.abort();
        }
    }

    /// Begins sending `path` to `peer_addr` on a background task and
    /// returns the new transfer's id immediately; progress and the
    /// terminal outcome both arrive through `subscribe()`/`transfers()`,
    /// not through this call. `display_name`, when given, is what the
    /// peer sees and saves as — otherwise the local path's basename is
    /// used.
    pub async fn send_file(
        &self,
        peer_addr: SocketAddr,
        path: PathBuf,
        display_name: Option<String>,
    ) -> Result<Uuid, TransportError> {
        let metadata = tokio::fs::metadata(&path).await?;
        let file_name = display_name.unwrap_or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file")
                .to_string()
        });
        let id = Uuid::new_v4();
        let record = TransferRecord::new(id, Direction::Send, file_name.clone(), metadata.len(), Some(peer_addr.ip()));
        self.transfers.insert(record);

        let connector = self.connector.clone();
        let transfers = self.transfers.clone();
        tokio::spawn(async move {
            sender::send_file(connector, peer_addr, id, path, file_name, transfers).await;
        });
        Ok(id)
    }
}
