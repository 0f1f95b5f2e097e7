//! Inbound stream handling
//!
//! One reader loop per accepted connection: read a frame, resolve the intern
//! tables, deserialize every payload, and hand the results to the local
//! engine. A payload that cannot be deserialized aborts the stream; the
//! peer's writer will re-dial and start a fresh batch.

use crate::error::{RemoteError, RemoteResult};
use crate::frame::{read_frame, WireEnvelope};
use crate::serializer::Deserializer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, error};
use troupe_actor::Engine;

pub(crate) async fn read_loop(
    engine: Engine,
    stream: TcpStream,
    deserializer: Arc<dyn Deserializer>,
    max_frame_bytes: usize,
    peer: SocketAddr,
    shutdown: Arc<Notify>,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let received = tokio::select! {
            _ = shutdown.notified() => {
                debug!(%peer, "stream reader stopped");
                return;
            }
            received = read_frame(&mut reader, max_frame_bytes) => received,
        };
        let envelope = match received {
            Ok(envelope) => envelope,
            Err(RemoteError::ConnectionClosed) => {
                debug!(%peer, "stream reader terminated");
                return;
            }
            Err(e) => {
                error!(err = %e, %peer, "stream reader receive failed");
                return;
            }
        };
        if let Err(e) = deliver_envelope(&engine, deserializer.as_ref(), &envelope) {
            error!(err = %e, %peer, "stream reader aborting");
            return;
        }
    }
}

fn deliver_envelope(
    engine: &Engine,
    deserializer: &dyn Deserializer,
    envelope: &WireEnvelope,
) -> RemoteResult<()> {
    for msg in &envelope.messages {
        let type_name = envelope
            .type_names
            .get(msg.type_name_index as usize)
            .ok_or_else(|| RemoteError::decode("type name index out of range"))?;
        let payload = deserializer.deserialize(&msg.data, type_name)?;
        let target = envelope
            .targets
            .get(msg.target_index as usize)
            .ok_or_else(|| RemoteError::decode("target index out of range"))?;
        let sender = if envelope.senders.is_empty() {
            None
        } else {
            envelope.senders.get(msg.sender_index as usize).cloned()
        };
        engine.send_local(target, payload, sender);
    }
    Ok(())
}
