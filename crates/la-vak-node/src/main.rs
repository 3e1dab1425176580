use std::net::SocketAddr;

use tracing::info;

use la_vak_engine::Engine;
use la_vak_types::EngineEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "la_vak=info".into()),
        )
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("a rustls crypto provider was already installed"))?;

    let host = std::env::var("LA_VAK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LA_VAK_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let bind_addr: SocketAddr = format!("{host}:{port}").parse()?;

    let engine = Engine::start(bind_addr).await?;
    info!(
        device_id = %engine.identity().device_id,
        port = engine.identity().transport_port,
        "la-vak node is up"
    );

    let mut events = engine.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    shutdown_signal().await;
    info!("shutting down");
    event_task.abort();
    engine.stop().await;

    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::PeerJoined(peer) => {
            info!(peer = %peer.device_name, ip = %peer.ip, "peer joined")
        }
        EngineEvent::PeerLeft(peer) => info!(peer = %peer.device_name, "peer left"),
        EngineEvent::PeersUpdated(peers) => info!(count = peers.len(), "peer list updated"),
        EngineEvent::TransferProgress(t) => {
            tracing::debug!(id = %t.id, bytes = t.bytes_transferred, total = t.file_size, "transfer progress")
        }
        EngineEvent::TransferComplete(t) => {
            info!(id = %t.id, file = %t.file_name, "transfer complete")
        }
        EngineEvent::TransferError(t) => {
            tracing::warn!(id = %t.id, error = ?t.error, "transfer failed")
        }
        EngineEvent::IncomingRequest(req) => info!(
            id = %req.transfer_id,
            file = %req.file_name,
            from = %req.peer_ip,
            "incoming transfer request — awaiting accept/reject via the control API"
        ),
    }
}

/// Ctrl+C everywhere, SIGTERM on Unix too.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received Ctrl+C");
    }
}
