use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use rustls::pki_types::ServerName;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};
use uuid::Uuid;

use la_vak_crypto::{aead, hash, keys};
use la_vak_types::TransferStatus;

use crate::error::TransportError;
use crate::framing::{write_frame, FrameReader};
use crate::messages::MessageHeader;
use crate::transfers::TransferTable;

/// TLS on the wire needs a server name to construct a `ClientConnection`
/// even though the client never validates the certificate against it
/// (`tls::client_config` installs an accept-any verifier). Any valid DNS
/// name works.
const SERVER_NAME: &str = "la-vak";

/// Drives one outbound transfer end to end: dial, handshake, wait for
/// the peer's accept/reject, then stream the file as sealed chunks. The
/// caller has already inserted
/// `transfer_id` into `transfers` before spawning this, so every step
/// here only updates an existing record and reports its own failure.
pub async fn send_file(
    connector: TlsConnector,
    peer_addr: SocketAddr,
    transfer_id: Uuid,
    path: PathBuf,
    file_name: String,
    transfers: Arc<TransferTable>,
) {
    if let Err(e) = run(connector, peer_addr, transfer_id, &path, &file_name, &transfers).await {
        warn!(%transfer_id, error = %e, "outbound transfer ended with an error");
        transfers.fail(transfer_id, e.to_string());
    }
}

async fn run(
    connector: TlsConnector,
    peer_addr: SocketAddr,
    transfer_id: Uuid,
    path: &PathBuf,
    file_name: &str,
    transfers: &TransferTable,
) -> Result<(), TransportError> {
    let server_name =
        ServerName::try_from(SERVER_NAME).expect("constant server name is a valid DNS name");

    let tcp = TcpStream::connect(peer_addr).await?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);

    let (public_key_pem, _private_key_pem) = keys::get_key_pair()?;
    write_frame(
        &mut write_half,
        &MessageHeader::Hello {
            public_key: public_key_pem,
            transfer_id,
        },
        &[],
    )
    .await?;
    transfers.progress(transfer_id, TransferStatus::Handshake, 0);

    let Some((header, _)) = reader.read_frame().await? else {
        return Err(TransportError::ProtocolViolation(
            "connection closed before session".into(),
        ));
    };
    let MessageHeader::Session { encrypted_key, iv } = header else {
        return Err(TransportError::ProtocolViolation("expected session".into()));
    };
    let wrapped_key = base64::engine::general_purpose::STANDARD
        .decode(encrypted_key)
        .map_err(|e| TransportError::ProtocolViolation(format!("encryptedKey: {e}")))?;
    let session_key = keys::unwrap_session_key(&wrapped_key)?;
    let base_iv_bytes = base64::engine::general_purpose::STANDARD
        .decode(iv)
        .map_err(|e| TransportError::ProtocolViolation(format!("iv: {e}")))?;
    let base_iv: [u8; 12] = base_iv_bytes
        .try_into()
        .map_err(|_| TransportError::ProtocolViolation("iv wrong length".into()))?;

    let file_hash = hash::hash_file(path).await?;
    let metadata = tokio::fs::metadata(path).await?;

    write_frame(
        &mut write_half,
        &MessageHeader::Meta {
            name: file_name.to_string(),
            size: metadata.len(),
            hash: file_hash,
            transfer_id,
        },
        &[],
    )
    .await?;

    let Some((header, _)) = reader.read_frame().await? else {
        return Err(TransportError::ProtocolViolation(
            "connection closed before accept/reject".into(),
        ));
    };
    match header {
        MessageHeader::Rejected { .. } => {
            transfers.reject(transfer_id);
            return Err(TransportError::RejectedByPeer);
        }
        MessageHeader::Accepted { .. } => {}
        other => {
            return Err(TransportError::ProtocolViolation(format!(
                "expected accepted or rejected, got {other:?}"
            )))
        }
    }

    transfers.progress(transfer_id, TransferStatus::Transferring, 0);

    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; aead::CHUNK_SIZE];
    let mut index: u32 = 0;
    let mut bytes_sent: u64 = 0;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        let chunk_iv = aead::chunk_iv(&base_iv, index);
        let (ciphertext, tag) = aead::seal_chunk(&session_key, &chunk_iv, &buffer[..n])?;
        write_frame(
            &mut write_half,
            &MessageHeader::Data {
                index,
                auth_tag: base64::engine::general_purpose::STANDARD.encode(tag),
                chunk_size: ciphertext.len() as u32,
            },
            &ciphertext,
        )
        .await?;
        bytes_sent += n as u64;
        index += 1;
        transfers.progress(transfer_id, TransferStatus::Transferring, bytes_sent);
    }

    write_frame(&mut write_half, &MessageHeader::Done, &[]).await?;
    transfers.complete(transfer_id);
    info!(%transfer_id, bytes = bytes_sent, "transfer sent");
    Ok(())
}
