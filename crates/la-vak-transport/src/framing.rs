use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::messages::MessageHeader;

/// Every message is `outer_len(4) | header_len(4) | header(JSON) | payload`,
/// where `outer_len` covers everything after itself.
const OUTER_LEN_FIELD: usize = 4;
const HEADER_LEN_FIELD: usize = 4;

/// Generous cap on a JSON header (comfortably covers an RSA-4096 PEM plus
/// base64 session fields) and on a chunk payload (one `CHUNK_SIZE` block).
/// Bounds allocation against a corrupted or hostile length field.
const MAX_HEADER_LEN: u32 = 16 * 1024;
const MAX_PAYLOAD_LEN: u32 = la_vak_crypto::CHUNK_SIZE as u32 + 4096;
const MAX_OUTER_LEN: u32 = HEADER_LEN_FIELD as u32 + MAX_HEADER_LEN + MAX_PAYLOAD_LEN;

/// Write one frame. Awaiting this call *is* the sender's backpressure
/// point: `AsyncWrite::write_all` suspends exactly when the kernel send
/// buffer is saturated and resumes when it drains, so the caller's
/// read-seal-write loop naturally pauses the file reader without any
/// extra plumbing.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &MessageHeader,
    payload: &[u8],
) -> Result<(), TransportError> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| TransportError::ProtocolViolation(format!("header encode: {e}")))?;
    let header_len = header_bytes.len() as u32;
    let outer_len = HEADER_LEN_FIELD as u32 + header_len + payload.len() as u32;

    let mut frame = Vec::with_capacity(OUTER_LEN_FIELD + outer_len as usize);
    frame.extend_from_slice(&outer_len.to_be_bytes());
    frame.extend_from_slice(&header_len.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await?;
    Ok(())
}

enum ParseOutcome {
    Frame(MessageHeader, Vec<u8>),
    Malformed,
}

/// Try to parse one frame out of `buf`. Returns `None` if not enough
/// bytes have arrived yet. A structurally valid frame whose header isn't
/// valid JSON parses as `Malformed` and is dropped, but framing continues
/// from the next frame boundary.
fn try_parse(buf: &[u8]) -> Result<Option<(usize, ParseOutcome)>, TransportError> {
    if buf.len() < OUTER_LEN_FIELD {
        return Ok(None);
    }
    let outer_len = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if outer_len > MAX_OUTER_LEN {
        return Err(TransportError::ProtocolViolation(format!(
            "frame length {outer_len} exceeds maximum {MAX_OUTER_LEN}"
        )));
    }
    let total = OUTER_LEN_FIELD + outer_len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    if (outer_len as usize) < HEADER_LEN_FIELD {
        return Ok(Some((total, ParseOutcome::Malformed)));
    }

    let header_len = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    let payload_start = OUTER_LEN_FIELD + HEADER_LEN_FIELD + header_len;
    if payload_start > total {
        return Ok(Some((total, ParseOutcome::Malformed)));
    }

    let header_bytes = &buf[OUTER_LEN_FIELD + HEADER_LEN_FIELD..payload_start];
    let payload = buf[payload_start..total].to_vec();

    match serde_json::from_slice::<MessageHeader>(header_bytes) {
        Ok(header) => Ok(Some((total, ParseOutcome::Frame(header, payload)))),
        Err(_) => Ok(Some((total, ParseOutcome::Malformed))),
    }
}

/// Buffers partial reads across calls and yields complete frames: parses
/// as many complete frames as are available after each read, leaving an
/// incomplete tail buffered for the next one.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Next complete frame, or `Ok(None)` on a clean EOF with nothing
    /// partially buffered.
    pub async fn read_frame(&mut self) -> Result<Option<(MessageHeader, Vec<u8>)>, TransportError> {
        loop {
            if let Some((consumed, outcome)) = try_parse(&self.buf)? {
                self.buf.advance(consumed);
                match outcome {
                    ParseOutcome::Frame(header, payload) => return Ok(Some((header, payload))),
                    ParseOutcome::Malformed => continue,
                }
            }

            let mut chunk = [0u8; 8192];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::ProtocolViolation(
                    "connection closed mid-frame".into(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn round_trips_a_frame_with_payload() {
        let (client, server) = tokio::io::duplex(4096);
        let header = MessageHeader::Data {
            index: 3,
            auth_tag: "dGFn".into(),
            chunk_size: 5,
        };
        let payload = b"hello".to_vec();

        let mut writer = client;
        let write_task = {
            let header = header.clone();
            let payload = payload.clone();
            tokio::spawn(async move { write_frame(&mut writer, &header, &payload).await })
        };

        let mut reader = FrameReader::new(server);
        let (got_header, got_payload) = reader.read_frame().await.unwrap().unwrap();
        write_task.await.unwrap().unwrap();

        assert_eq!(got_payload, payload);
        match got_header {
            MessageHeader::Data { index, chunk_size, .. } => {
                assert_eq!(index, 3);
                assert_eq!(chunk_size, 5);
            }
            other => panic!("unexpected header: {other:?}"),
        }
    }

    #[tokio::test]
    async fn buffers_partial_reads_across_calls() {
        let (mut client, server) = tokio::io::duplex(4096);
        let header = MessageHeader::Hello {
            public_key: "pem".into(),
            transfer_id: Uuid::new_v4(),
        };
        let header_bytes = serde_json::to_vec(&header).unwrap();
        let outer_len = 4 + header_bytes.len() as u32;

        let mut reader = FrameReader::new(server);

        // Write the frame split across two writes, with a yield between
        // them, to exercise the "incomplete tail stays buffered" path.
        client.write_all(&outer_len.to_be_bytes()).await.unwrap();
        client
            .write_all(&(header_bytes.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&header_bytes[..3]).await.unwrap();

        let read_task = tokio::spawn(async move { reader.read_frame().await });
        tokio::task::yield_now().await;
        client.write_all(&header_bytes[3..]).await.unwrap();

        let (got_header, got_payload) = read_task.await.unwrap().unwrap().unwrap();
        assert!(got_payload.is_empty());
        assert!(matches!(got_header, MessageHeader::Hello { .. }));
    }

    #[tokio::test]
    async fn malformed_header_is_dropped_and_framing_continues() {
        let (mut client, server) = tokio::io::duplex(8192);

        // Frame 1: header bytes are not valid JSON.
        let bad_header = b"not json".to_vec();
        let outer_len = 4 + bad_header.len() as u32;
        client.write_all(&outer_len.to_be_bytes()).await.unwrap();
        client
            .write_all(&(bad_header.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&bad_header).await.unwrap();

        // Frame 2: a valid `done` header.
        let header = MessageHeader::Done;
        write_frame(&mut client, &header, &[]).await.unwrap();

        let mut reader = FrameReader::new(server);
        let (got_header, _) = reader.read_frame().await.unwrap().unwrap();
        assert!(matches!(got_header, MessageHeader::Done));
    }

    #[tokio::test]
    async fn oversized_frame_is_a_protocol_violation() {
        let (mut client, server) = tokio::io::duplex(64);
        // Claim an outer length far beyond MAX_OUTER_LEN.
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let mut reader = FrameReader::new(server);
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(TransportError::ProtocolViolation(_))));
    }
}
