//! Wire framing
//!
//! Frame layout: `[length:4 big-endian][bincode(WireEnvelope)]`. Each frame
//! carries one message batch together with its interning tables; indices in
//! a message reference the tables of the same envelope only, so reconnects
//! never need table state.

use crate::error::{RemoteError, RemoteResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use troupe_actor::Pid;

/// Length prefix size in bytes
pub const FRAME_HEADER_BYTES: usize = 4;

/// One batch of messages with per-batch interning tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Distinct senders referenced by this batch; empty when every message
    /// is anonymous
    pub senders: Vec<Pid>,
    /// Distinct targets referenced by this batch
    pub targets: Vec<Pid>,
    /// Distinct payload type names referenced by this batch
    pub type_names: Vec<String>,
    /// The batch itself
    pub messages: Vec<WireMessage>,
}

/// A single serialized message referencing the envelope's intern tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub data: Bytes,
    pub type_name_index: i32,
    pub sender_index: i32,
    pub target_index: i32,
}

/// Encode and write one frame
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    envelope: &WireEnvelope,
    max_frame_bytes: usize,
) -> RemoteResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(envelope).map_err(|e| RemoteError::Encode {
        reason: e.to_string(),
    })?;
    if payload.len() > max_frame_bytes {
        return Err(RemoteError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame_bytes,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> RemoteResult<WireEnvelope>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_BYTES];
    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RemoteError::ConnectionClosed,
            _ => RemoteError::Io(e),
        });
    }
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(RemoteError::decode("zero-length frame"));
    }
    if len > max_frame_bytes {
        return Err(RemoteError::FrameTooLarge {
            size: len,
            limit: max_frame_bytes,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| RemoteError::decode(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> WireEnvelope {
        WireEnvelope {
            senders: vec![Pid::new("127.0.0.1:5000", "response/7")],
            targets: vec![Pid::new("127.0.0.1:4000", "echo/1")],
            type_names: vec!["alloc::string::String".to_string()],
            messages: vec![WireMessage {
                data: Bytes::from_static(b"\"hello\""),
                type_name_index: 0,
                sender_index: 0,
                target_index: 0,
            }],
        }
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let envelope = sample_envelope();
        let mut buf = Vec::new();
        write_frame(&mut buf, &envelope, 1024 * 1024).await.unwrap();

        let mut cursor = buf.as_slice();
        let decoded = read_frame(&mut cursor, 1024 * 1024).await.unwrap();
        assert_eq!(decoded.targets, envelope.targets);
        assert_eq!(decoded.type_names, envelope.type_names);
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].data, envelope.messages[0].data);
    }

    #[tokio::test]
    async fn test_frame_too_large_rejected_on_write() {
        let mut envelope = sample_envelope();
        envelope.messages[0].data = Bytes::from(vec![0u8; 4096]);
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &envelope, 1024).await.unwrap_err();
        assert!(matches!(err, RemoteError::FrameTooLarge { .. }));
        assert!(buf.is_empty(), "nothing written for an oversized frame");
    }

    #[tokio::test]
    async fn test_frame_too_large_rejected_on_read() {
        let envelope = sample_envelope();
        let mut buf = Vec::new();
        write_frame(&mut buf, &envelope, 1024 * 1024).await.unwrap();

        let mut cursor = buf.as_slice();
        let err = read_frame(&mut cursor, 8).await.unwrap_err();
        assert!(matches!(err, RemoteError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_eof_maps_to_connection_closed() {
        let mut empty: &[u8] = &[];
        let err = read_frame(&mut empty, 1024).await.unwrap_err();
        assert!(matches!(err, RemoteError::ConnectionClosed));
    }
}
