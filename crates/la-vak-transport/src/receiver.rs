use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use uuid::Uuid;

use la_vak_crypto::{aead, hash, keys};
use la_vak_types::{Direction, EngineEvent, IncomingRequest, TransferRecord, TransferStatus};

use crate::error::TransportError;
use crate::framing::{write_frame, FrameReader};
use crate::messages::MessageHeader;
use crate::pending::{Decision, PendingTable};
use crate::transfers::TransferTable;
use crate::util::safe_download_path;

/// Drives one inbound connection end to end: handshake, the user's
/// accept/reject decision, chunk streaming, and final hash verification.
/// Runs for the lifetime of the TCP connection; errors here end the
/// connection but never the listener.
pub async fn handle_connection(
    acceptor: TlsAcceptor,
    raw: tokio::net::TcpStream,
    peer_ip: IpAddr,
    downloads_dir: PathBuf,
    transfers: Arc<TransferTable>,
    pending: Arc<PendingTable>,
    events: broadcast::Sender<EngineEvent>,
) {
    let stream = match acceptor.accept(raw).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, %peer_ip, "TLS accept failed");
            return;
        }
    };

    if let Err(e) = run(stream, peer_ip, downloads_dir, transfers, pending, events).await {
        warn!(error = %e, %peer_ip, "inbound transfer ended with an error");
    }
}

async fn run(
    stream: TlsStream<tokio::net::TcpStream>,
    peer_ip: IpAddr,
    downloads_dir: PathBuf,
    transfers: Arc<TransferTable>,
    pending: Arc<PendingTable>,
    events: broadcast::Sender<EngineEvent>,
) -> Result<(), TransportError> {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);

    let Some((header, _)) = reader.read_frame().await? else {
        return Ok(());
    };
    let MessageHeader::Hello { public_key, transfer_id } = header else {
        return Err(TransportError::ProtocolViolation("expected hello".into()));
    };
    debug!(%transfer_id, %peer_ip, "received hello");

    let (session_key, base_iv) = aead::generate_session();
    let wrapped_key = keys::wrap_session_key(&public_key, &session_key)?;
    let session_header = MessageHeader::Session {
        encrypted_key: base64::engine::general_purpose::STANDARD.encode(wrapped_key),
        iv: base64::engine::general_purpose::STANDARD.encode(base_iv),
    };
    write_frame(&mut write_half, &session_header, &[]).await?;

    let Some((header, _)) = reader.read_frame().await? else {
        return Ok(());
    };
    let MessageHeader::Meta { name, size, hash: expected_hash, transfer_id: meta_id } = header
    else {
        return Err(TransportError::ProtocolViolation("expected meta".into()));
    };
    if meta_id != transfer_id {
        return Err(TransportError::ProtocolViolation(
            "transferId mismatch between hello and meta".into(),
        ));
    }

    let dest_path = safe_download_path(&downloads_dir, &name);
    let mut record = TransferRecord::new(transfer_id, Direction::Receive, name.clone(), size, Some(peer_ip));
    record.status = TransferStatus::Pending;
    record.dest_path = Some(dest_path.clone());
    transfers.insert(record);

    let decision_rx = pending.register(transfer_id);
    let _ = events.send(EngineEvent::IncomingRequest(IncomingRequest {
        transfer_id,
        file_name: name,
        file_size: size,
        peer_ip,
    }));

    // Race the user's decision against the connection itself: nothing
    // else is expected on the wire until we reply, so any frame or EOF
    // here means the sender went away before the user answered. Either
    // way the pending entry must be cleared — `respond_to_incoming`
    // must not "succeed" against a connection that is already gone.
    let decision = tokio::select! {
        decision = decision_rx => decision.unwrap_or(Decision::Reject),
        read_result = reader.read_frame() => {
            pending.cancel(transfer_id);
            return match read_result {
                Ok(None) | Err(_) => {
                    transfers.fail(transfer_id, "connection closed before accept/reject decision");
                    Ok(())
                }
                Ok(Some((header, _))) => Err(TransportError::ProtocolViolation(format!(
                    "unexpected message while awaiting accept/reject decision: {header:?}"
                ))),
            };
        }
    };
    pending.cancel(transfer_id);
    if decision == Decision::Reject {
        write_frame(&mut write_half, &MessageHeader::Rejected { transfer_id }, &[]).await?;
        transfers.reject(transfer_id);
        return Ok(());
    }

    write_frame(&mut write_half, &MessageHeader::Accepted { transfer_id }, &[]).await?;
    transfers.progress(transfer_id, TransferStatus::Transferring, 0);

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(&dest_path).await?;
    let mut bytes_written: u64 = 0;

    loop {
        let Some((header, payload)) = reader.read_frame().await? else {
            return Err(TransportError::ProtocolViolation(
                "connection closed before done".into(),
            ));
        };
        match header {
            MessageHeader::Data { index, auth_tag, chunk_size } => {
                if payload.len() as u32 != chunk_size {
                    return Err(TransportError::ProtocolViolation(
                        "chunkSize does not match payload length".into(),
                    ));
                }
                let tag_bytes = base64::engine::general_purpose::STANDARD
                    .decode(&auth_tag)
                    .map_err(|e| TransportError::ProtocolViolation(format!("authTag: {e}")))?;
                let tag: [u8; 16] = tag_bytes
                    .try_into()
                    .map_err(|_| TransportError::ProtocolViolation("authTag wrong length".into()))?;
                let iv = aead::chunk_iv(&base_iv, index);

                let plaintext = match aead::open_chunk(&session_key, &iv, &payload, &tag) {
                    Ok(plaintext) => plaintext,
                    Err(_) => {
                        transfers.fail(transfer_id, "decryption failed — possible tampering");
                        return Err(TransportError::AuthFailure);
                    }
                };

                file.write_all(&plaintext).await?;
                bytes_written += plaintext.len() as u64;
                transfers.progress(transfer_id, TransferStatus::Transferring, bytes_written);
            }
            MessageHeader::Done => break,
            other => {
                return Err(TransportError::ProtocolViolation(format!(
                    "unexpected message during transfer: {other:?}"
                )))
            }
        }
    }

    file.flush().await?;
    drop(file);

    transfers.progress(transfer_id, TransferStatus::Verifying, bytes_written);
    let actual_hash = hash::hash_file(&dest_path).await?;
    if actual_hash != expected_hash {
        transfers.fail(transfer_id, "SHA-256 mismatch — file corrupted");
        return Err(TransportError::HashMismatch);
    }

    transfers.complete(transfer_id);
    info!(%transfer_id, bytes = bytes_written, "transfer completed");
    Ok(())
}
