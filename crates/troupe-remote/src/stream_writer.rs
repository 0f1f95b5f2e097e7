//! Per-peer outbound stream
//!
//! A stream writer is a custom process with its own inbox but no receiver:
//! batches popped from the inbox become single wire frames. Sender, target,
//! and type-name tables are interned per batch for wire compactness and
//! rebuilt from scratch on every frame.

use crate::config::RemoteConfig;
use crate::constants::{
    CONN_IDLE_TIMEOUT_MS, DIAL_ATTEMPTS_COUNT_MAX, DIAL_BACKOFF_MS_BASE,
    STREAM_WRITER_INBOX_CAPACITY,
};
use crate::frame::{write_frame, WireEnvelope, WireMessage};
use crate::serializer::Serializer;
use crate::stream_router::StreamDeliver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use troupe_actor::{ActorEvent, DynMessage, Engine, Envelope, Inbox, Pid, Process};

pub(crate) struct StreamWriter {
    engine: Engine,
    router: Pid,
    pid: Pid,
    peer_addr: String,
    max_frame_bytes: usize,
    serializer: Arc<dyn Serializer>,
    inbox: Arc<Inbox>,
    conn: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    idle_deadline: Mutex<Instant>,
    stopped: AtomicBool,
}

impl StreamWriter {
    pub(crate) fn new(
        engine: Engine,
        router: Pid,
        peer_addr: String,
        config: &RemoteConfig,
    ) -> Arc<Self> {
        let pid = Pid::new(engine.address(), format!("stream/{peer_addr}"));
        Arc::new(Self {
            engine,
            router,
            pid,
            peer_addr,
            max_frame_bytes: config.max_frame_bytes(),
            serializer: config.serializer(),
            inbox: Arc::new(Inbox::new(STREAM_WRITER_INBOX_CAPACITY)),
            conn: tokio::sync::Mutex::new(None),
            idle_deadline: Mutex::new(Instant::now()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Dial the peer with bounded retries and linear back-off
    async fn dial(&self) -> Option<TcpStream> {
        for attempt in 0..DIAL_ATTEMPTS_COUNT_MAX {
            match TcpStream::connect(&self.peer_addr).await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    let delay = Duration::from_millis(DIAL_BACKOFF_MS_BASE * u64::from(attempt) * 2);
                    error!(
                        err = %e,
                        remote = %self.peer_addr,
                        attempt,
                        max = DIAL_ATTEMPTS_COUNT_MAX,
                        ?delay,
                        "dial failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        None
    }

    /// Establish the connection, then begin draining the inbox
    ///
    /// Envelopes pushed before the dial completes wait in the ring; the
    /// inbox only starts scheduling once a connection exists, which keeps
    /// the per-peer delivery order intact.
    async fn init(self: Arc<Self>) {
        let stream = match self.dial().await {
            Some(stream) => stream,
            None => {
                self.terminate().await;
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        let (mut read_half, write_half) = stream.into_split();
        *self.conn.lock().await = Some(write_half);
        self.refresh_idle_deadline();

        // The peer never sends on this stream; a read completing means the
        // connection closed under us.
        let this = Arc::clone(&self);
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            debug!(remote = %this.peer_addr, "connection lost");
            this.terminate().await;
        });

        let this = Arc::clone(&self);
        tokio::spawn(async move { this.idle_watch().await });

        debug!(remote = %self.peer_addr, "connected");
        self.inbox.start(Arc::clone(&self) as Arc<dyn Process>);
    }

    fn refresh_idle_deadline(&self) {
        *self
            .idle_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Instant::now() + Duration::from_millis(CONN_IDLE_TIMEOUT_MS);
    }

    async fn idle_watch(self: Arc<Self>) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let deadline = *self
                .idle_deadline
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if Instant::now() >= deadline {
                warn!(remote = %self.peer_addr, "idle timeout, closing stream");
                self.terminate().await;
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Publish `RemoteUnreachable` and tear the writer down; idempotent
    async fn terminate(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let event = ActorEvent::RemoteUnreachable {
            listen_addr: self.peer_addr.clone(),
        };
        self.engine.send(&self.router, event.clone());
        self.engine.broadcast_event(event);
        self.inbox.stop();
        self.engine.registry().remove(&self.pid);
        self.conn.lock().await.take();
    }
}

#[async_trait]
impl Process for StreamWriter {
    fn pid(&self) -> &Pid {
        &self.pid
    }

    fn send(&self, msg: DynMessage, sender: Option<Pid>) {
        self.inbox.push(Envelope::new(msg, sender));
    }

    async fn invoke(self: Arc<Self>, batch: Vec<Envelope>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut type_lookup = HashMap::new();
        let mut type_names = Vec::new();
        let mut sender_lookup = HashMap::new();
        let mut senders = Vec::new();
        let mut target_lookup = HashMap::new();
        let mut targets = Vec::new();
        let mut messages = Vec::with_capacity(batch.len());

        for envelope in &batch {
            let deliver = match envelope.msg.downcast_ref::<StreamDeliver>() {
                Some(deliver) => deliver,
                None => continue,
            };
            let type_name = match self.serializer.type_name(deliver.msg.as_ref()) {
                Ok(name) => name,
                Err(e) => {
                    error!(err = %e, "cannot name message for the wire, dropping");
                    continue;
                }
            };
            let data = match self.serializer.serialize(deliver.msg.as_ref()) {
                Ok(data) => data,
                Err(e) => {
                    error!(err = %e, "serialize failed, dropping message");
                    continue;
                }
            };
            let type_name_index = lookup_type_name(&mut type_lookup, type_name, &mut type_names);
            let sender_index = lookup_pid(&mut sender_lookup, deliver.sender.as_ref(), &mut senders);
            let target_index = lookup_pid(&mut target_lookup, Some(&deliver.target), &mut targets);
            messages.push(WireMessage {
                data,
                type_name_index,
                sender_index,
                target_index,
            });
        }
        if messages.is_empty() {
            return;
        }

        let frame = WireEnvelope {
            senders,
            targets,
            type_names,
            messages,
        };
        let mut conn = self.conn.lock().await;
        let writer = match conn.as_mut() {
            Some(writer) => writer,
            None => return,
        };
        if let Err(e) = write_frame(writer, &frame, self.max_frame_bytes).await {
            error!(err = %e, remote = %self.peer_addr, "stream writer send failed");
            drop(conn);
            self.terminate().await;
            return;
        }
        drop(conn);
        self.refresh_idle_deadline();
    }

    fn start(self: Arc<Self>) {
        tokio::spawn(self.init());
    }

    async fn shutdown(self: Arc<Self>) {
        self.terminate().await;
    }
}

/// Intern a pid, returning its table index; `None` interns nothing and maps
/// to index 0 like every other anonymous sender in the batch
fn lookup_pid(lookup: &mut HashMap<u64, i32>, pid: Option<&Pid>, pids: &mut Vec<Pid>) -> i32 {
    let pid = match pid {
        Some(pid) => pid,
        None => return 0,
    };
    let key = pid.lookup_key();
    if let Some(&index) = lookup.get(&key) {
        return index;
    }
    let index = lookup.len() as i32;
    lookup.insert(key, index);
    pids.push(pid.clone());
    index
}

/// Intern a type name, returning its table index
fn lookup_type_name(
    lookup: &mut HashMap<&'static str, i32>,
    name: &'static str,
    names: &mut Vec<String>,
) -> i32 {
    if let Some(&index) = lookup.get(name) {
        return index;
    }
    let index = lookup.len() as i32;
    lookup.insert(name, index);
    names.push(name.to_string());
    index
}
