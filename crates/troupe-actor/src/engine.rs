//! The actor engine
//!
//! The engine owns the registry and the event stream and routes every send:
//! local pids resolve through the registry, non-local pids hand off to the
//! configured remote transport. The handle is cheap to clone; processes hold
//! one, and the registry entry is what keeps a process alive.

use crate::context::Context;
use crate::event::ActorEvent;
use crate::event_stream::{event_stream_producer, Subscribe, Unsubscribe};
use crate::message::{DynMessage, Message, PoisonPill};
use crate::opts::Opts;
use crate::pid::{Pid, LOCAL_LOOKUP_ADDR, PID_SEPARATOR};
use crate::process::{ActorProcess, Process, ProcessShared};
use crate::receiver::{FuncReceiver, Producer};
use crate::registry::Registry;
use crate::response::Response;
use crate::ActorResult;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A remote transport bound to an engine
///
/// The engine resolves non-local sends through this seam; the concrete
/// transport lives in its own crate and is injected via
/// [`EngineConfig::with_remote`].
#[async_trait]
pub trait Remoter: Send + Sync + 'static {
    /// The listen address peers reach this engine on
    fn address(&self) -> String;

    /// Ship a message toward a non-local pid
    fn send(&self, pid: &Pid, msg: DynMessage, sender: Option<Pid>);

    /// Bind and begin accepting; called once from [`Engine::new`]
    async fn start(&self, engine: Engine) -> ActorResult<()>;

    /// Stop listening
    async fn stop(&self);
}

/// Engine construction options
#[derive(Default)]
pub struct EngineConfig {
    remote: Option<Arc<dyn Remoter>>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a remote transport so the engine can reach other nodes
    pub fn with_remote(mut self, remote: Arc<dyn Remoter>) -> Self {
        self.remote = Some(remote);
        self
    }
}

struct EngineInner {
    address: String,
    registry: Registry,
    remote: Option<Arc<dyn Remoter>>,
    event_stream: OnceLock<Pid>,
}

/// Cheap-clone handle to a running actor engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine, starting the remote transport when one is configured
    pub async fn new(config: EngineConfig) -> ActorResult<Engine> {
        let address = match &config.remote {
            Some(remote) => remote.address(),
            None => LOCAL_LOOKUP_ADDR.to_string(),
        };
        let engine = Engine {
            inner: Arc::new(EngineInner {
                address,
                registry: Registry::new(),
                remote: config.remote.clone(),
                event_stream: OnceLock::new(),
            }),
        };
        if let Some(remote) = &config.remote {
            remote.start(engine.clone()).await?;
        }
        let pid = engine.spawn(event_stream_producer(), "eventstream");
        let _ = engine.inner.event_stream.set(pid);
        Ok(engine)
    }

    /// The engine's address: the remote listen address, or `"local"`
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// The local process registry
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    /// Spawn a process with default options; the id part is randomized
    pub fn spawn(&self, producer: Producer, kind: &str) -> Pid {
        self.spawn_with(producer, kind, Opts::default())
    }

    /// Spawn a process with explicit options
    pub fn spawn_with(&self, producer: Producer, kind: &str, opts: Opts) -> Pid {
        self.spawn_internal(producer, kind, opts, None)
    }

    /// Spawn a stateless receiver from a plain function
    pub fn spawn_fn<F>(&self, f: F, kind: &str) -> Pid
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.spawn(FuncReceiver::producer(f), kind)
    }

    pub(crate) fn spawn_internal(
        &self,
        producer: Producer,
        kind: &str,
        mut opts: Opts,
        parent: Option<Weak<ProcessShared>>,
    ) -> Pid {
        let id = opts
            .id
            .take()
            .unwrap_or_else(|| rand::random::<u64>().to_string());
        let pid = Pid::new(self.address(), format!("{kind}{PID_SEPARATOR}{id}"));
        let proc = Arc::new(ActorProcess::new(
            self.clone(),
            pid,
            producer,
            opts,
            parent,
        ));
        self.spawn_process(proc)
    }

    /// Register and start a custom [`Process`] implementation
    ///
    /// On an id collision the incumbent is kept, an `ActorDuplicateId` event
    /// is broadcast, and the rejected pid is still returned.
    pub fn spawn_process(&self, proc: Arc<dyn Process>) -> Pid {
        let pid = proc.pid().clone();
        match self.inner.registry.insert(Arc::clone(&proc)) {
            Ok(()) => proc.start(),
            Err(_) => {
                self.broadcast_event(ActorEvent::ActorDuplicateId { pid: pid.clone() });
            }
        }
        pid
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send a message without a sender
    pub fn send(&self, pid: &Pid, msg: impl Message) {
        self.send_dyn(pid, Arc::new(msg), None);
    }

    /// Send a message carrying an explicit sender
    pub fn send_with_sender(&self, pid: &Pid, msg: impl Message, sender: Pid) {
        self.send_dyn(pid, Arc::new(msg), Some(sender));
    }

    /// Route an already-shared message
    ///
    /// This is the single routing choke point: local pids go through the
    /// registry, everything else through the remote (or becomes an
    /// `EngineRemoteMissing` event when none is configured).
    pub fn send_dyn(&self, pid: &Pid, msg: DynMessage, sender: Option<Pid>) {
        if pid.address == self.inner.address {
            self.send_local(pid, msg, sender);
            return;
        }
        match &self.inner.remote {
            Some(remote) => remote.send(pid, msg, sender),
            None => self.broadcast_event(ActorEvent::EngineRemoteMissing {
                target: pid.clone(),
                sender,
                message: msg,
            }),
        }
    }

    /// Deliver to a local process, dead-lettering on a registry miss
    pub fn send_local(&self, pid: &Pid, msg: DynMessage, sender: Option<Pid>) {
        match self.inner.registry.get(pid) {
            Some(proc) => proc.send(msg, sender),
            None => {
                // A dead letter that is itself undeliverable (a stale event
                // stream subscriber) must not produce another dead letter,
                // or the stream would feed itself forever.
                if let Some(ActorEvent::DeadLetter { .. }) = msg.downcast_ref::<ActorEvent>() {
                    tracing::warn!(%pid, "dropping dead letter to a stale subscriber");
                    return;
                }
                self.broadcast_event(ActorEvent::DeadLetter {
                    target: pid.clone(),
                    message: msg,
                    sender,
                });
            }
        }
    }

    /// Send `msg` as a request and return the pending reply
    ///
    /// A transient response process is registered as the sender; the reply
    /// addressed to it resolves [`Response::result`].
    pub fn request(&self, pid: &Pid, msg: impl Message, timeout: Duration) -> Response {
        let (response, proc) = Response::new(self.clone(), timeout);
        self.spawn_process(proc);
        self.send_dyn(pid, Arc::new(msg), Some(response.pid().clone()));
        response
    }

    /// Resend `msg` to `pid` every `interval` until stopped
    pub fn send_repeat(&self, pid: &Pid, msg: impl Message, interval: Duration) -> SendRepeater {
        let msg: DynMessage = Arc::new(msg);
        let engine = self.clone();
        let pid = pid.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval is immediate; swallow it so
            // the cadence starts one interval from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.send_dyn(&pid, Arc::clone(&msg), None);
            }
        });
        SendRepeater { handle }
    }

    // =========================================================================
    // Stopping
    // =========================================================================

    /// Ask a process to stop after draining its current batch
    pub fn poison(&self, pid: &Pid) -> StopHandle {
        self.send_poison_pill(pid, true)
    }

    /// Ask a process to stop immediately, discarding buffered messages
    pub fn stop(&self, pid: &Pid) -> StopHandle {
        self.send_poison_pill(pid, false)
    }

    fn send_poison_pill(&self, pid: &Pid, graceful: bool) -> StopHandle {
        let (pill, rx) = PoisonPill::new(graceful);
        let pill = Arc::new(pill);
        if self.inner.registry.get(pid).is_none() {
            self.broadcast_event(ActorEvent::DeadLetter {
                target: pid.clone(),
                message: Arc::clone(&pill) as DynMessage,
                sender: None,
            });
            pill.resolve();
            return StopHandle { rx };
        }
        self.send_local(pid, pill as DynMessage, None);
        StopHandle { rx }
    }

    // =========================================================================
    // Event stream
    // =========================================================================

    /// Subscribe `pid` to engine events
    pub fn subscribe(&self, pid: &Pid) {
        if let Some(stream) = self.inner.event_stream.get() {
            self.send_local(stream, Arc::new(Subscribe { pid: pid.clone() }), None);
        }
    }

    /// Unsubscribe `pid` from engine events
    pub fn unsubscribe(&self, pid: &Pid) {
        if let Some(stream) = self.inner.event_stream.get() {
            self.send_local(stream, Arc::new(Unsubscribe { pid: pid.clone() }), None);
        }
    }

    /// Push a message to the event stream, reaching every subscriber
    pub fn broadcast_event(&self, event: impl Message) {
        if let Some(stream) = self.inner.event_stream.get() {
            self.send_local(stream, Arc::new(event), None);
        }
    }
}

/// Awaits the completion of a poison or stop
#[derive(Debug)]
pub struct StopHandle {
    rx: oneshot::Receiver<()>,
}

impl StopHandle {
    /// Resolve once the target process finished its cleanup
    ///
    /// Callers wanting a deadline can wrap this in `tokio::time::timeout`.
    pub async fn done(self) {
        let _ = self.rx.await;
    }
}

/// Periodic resend started by [`Engine::send_repeat`]
#[derive(Debug)]
pub struct SendRepeater {
    handle: JoinHandle<()>,
}

impl SendRepeater {
    /// Stop repeating
    pub fn stop(self) {
        self.handle.abort();
    }
}
