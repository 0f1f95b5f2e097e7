//! Request/response support
//!
//! A request spawns a transient response process whose mailbox is a single
//! oneshot slot. It deliberately does not sit on the general inbox: one
//! message does not justify scheduling overhead. The response process
//! ignores shutdown signals; it disappears when the caller collects the
//! result (or gives up).

use crate::engine::Engine;
use crate::error::{ActorError, ActorResult};
use crate::message::{DynMessage, Envelope};
use crate::pid::Pid;
use crate::process::Process;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Pending reply to a request
pub struct Response {
    engine: Engine,
    pid: Pid,
    rx: oneshot::Receiver<DynMessage>,
    timeout: Duration,
}

impl Response {
    pub(crate) fn new(engine: Engine, timeout: Duration) -> (Self, Arc<ResponseProcess>) {
        let (tx, rx) = oneshot::channel();
        let pid = Pid::new(
            engine.address(),
            format!("response/{}", rand::random::<u32>()),
        );
        let proc = Arc::new(ResponseProcess {
            pid: pid.clone(),
            slot: Mutex::new(Some(tx)),
        });
        (
            Self {
                engine,
                pid,
                rx,
                timeout,
            },
            proc,
        )
    }

    /// The pid replies should be addressed to
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Await the reply, or fail when the timeout elapses
    ///
    /// The response process is removed from the registry on return, whether
    /// or not a reply arrived.
    pub async fn result(self) -> ActorResult<DynMessage> {
        let outcome = tokio::time::timeout(self.timeout, self.rx).await;
        self.engine.registry().remove(&self.pid);
        match outcome {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(ActorError::ResponseDropped),
            Err(_) => Err(ActorError::RequestTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// One-shot process backing a [`Response`]
pub(crate) struct ResponseProcess {
    pid: Pid,
    slot: Mutex<Option<oneshot::Sender<DynMessage>>>,
}

#[async_trait]
impl Process for ResponseProcess {
    fn pid(&self) -> &Pid {
        &self.pid
    }

    fn send(&self, msg: DynMessage, _sender: Option<Pid>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = slot.take() {
            let _ = tx.send(msg);
        }
    }

    async fn invoke(self: Arc<Self>, _batch: Vec<Envelope>) {}

    fn start(self: Arc<Self>) {}

    // A response process ignores its own shutdown signals.
    async fn shutdown(self: Arc<Self>) {}
}
