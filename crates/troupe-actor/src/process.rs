//! Process execution and supervision
//!
//! A process owns an inbox, a receiver produced from its producer, and the
//! supervision state that survives the receiver across restarts. Exactly one
//! task invokes the receiver at any instant; the inbox state machine
//! enforces that without locking the delivery hot path.

use crate::context::Context;
use crate::engine::Engine;
use crate::event::ActorEvent;
use crate::inbox::Inbox;
use crate::message::{DynMessage, Envelope, Initialized, InternalFailure, Message, PoisonPill, Started, Stopped};
use crate::opts::{Next, Opts};
use crate::pid::Pid;
use crate::receiver::{Producer, Receiver};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::error;

/// Abstraction over anything the registry can schedule and route to
///
/// Most processes are actor processes, but special-purpose implementations
/// (response slots, stream writers) plug in the same way.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    /// The pid this process is registered under
    fn pid(&self) -> &Pid;

    /// Enqueue an envelope for this process
    fn send(&self, msg: DynMessage, sender: Option<Pid>);

    /// Handle a batch of envelopes popped from the inbox
    async fn invoke(self: Arc<Self>, batch: Vec<Envelope>);

    /// Begin the start sequence; called once after registration
    fn start(self: Arc<Self>);

    /// Tear the process down outside the poison path
    async fn shutdown(self: Arc<Self>);
}

/// State a process shares with its contexts: identity and the child table
pub(crate) struct ProcessShared {
    pub(crate) pid: Pid,
    parent: Option<Weak<ProcessShared>>,
    children: Mutex<HashMap<String, Pid>>,
}

impl ProcessShared {
    pub(crate) fn new(pid: Pid, parent: Option<Weak<ProcessShared>>) -> Arc<Self> {
        Arc::new(Self {
            pid,
            parent,
            children: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn add_child(&self, pid: Pid) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid.id.clone(), pid);
    }

    pub(crate) fn children(&self) -> Vec<Pid> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn remove_child(&self, id: &str) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn detach_from_parent(&self) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove_child(&self.pid.id);
        }
    }
}

struct ProcessState {
    receiver: Option<Box<dyn Receiver>>,
    /// Envelopes retained from a faulted batch, replayed before the inbox
    /// on the next start.
    mbuffer: Vec<Envelope>,
    restarts: u32,
}

/// What a receiver fault looked like, extracted from the panic payload
struct Failure {
    reason: String,
    backtrace: String,
    internal: bool,
}

impl Failure {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let (reason, internal) = if let Some(f) = payload.downcast_ref::<InternalFailure>() {
            (format!("{}: {}", f.from, f.reason), true)
        } else if let Some(s) = payload.downcast_ref::<&'static str>() {
            ((*s).to_string(), false)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            (s.clone(), false)
        } else {
            ("opaque panic payload".to_string(), false)
        };
        Self {
            reason,
            backtrace: Backtrace::force_capture().to_string(),
            internal,
        }
    }
}

enum BatchOutcome {
    Completed,
    /// A poison pill was observed; the process must stop
    Stopping(Arc<PoisonPill>),
    Failed(Failure),
}

enum StartResult {
    Running,
    Stopped,
    Failed(Failure),
}

/// The standard mailbox-driven process
pub(crate) struct ActorProcess {
    engine: Engine,
    shared: Arc<ProcessShared>,
    inbox: Arc<Inbox>,
    producer: Producer,
    opts: Opts,
    state: tokio::sync::Mutex<ProcessState>,
}

impl ActorProcess {
    pub(crate) fn new(
        engine: Engine,
        pid: Pid,
        producer: Producer,
        opts: Opts,
        parent: Option<Weak<ProcessShared>>,
    ) -> Self {
        let inbox = Arc::new(Inbox::new(opts.inbox_capacity));
        Self {
            engine,
            shared: ProcessShared::new(pid, parent),
            inbox,
            producer,
            opts,
            state: tokio::sync::Mutex::new(ProcessState {
                receiver: None,
                mbuffer: Vec::new(),
                restarts: 0,
            }),
        }
    }

    /// Deliver one envelope through the middleware chain, catching panics
    async fn deliver(
        &self,
        state: &mut ProcessState,
        envelope: &Envelope,
    ) -> Result<(), Box<dyn Any + Send>> {
        // Poison pills are engine-private and never reach receivers.
        if envelope.msg.is::<PoisonPill>() {
            return Ok(());
        }
        let receiver = match state.receiver.as_deref_mut() {
            Some(receiver) => receiver,
            None => return Ok(()),
        };
        let ctx = Context::new(
            self.engine.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&envelope.msg),
            envelope.sender.clone(),
        );
        let middleware = self.opts.middleware.as_slice();
        let fut = async move {
            if middleware.is_empty() {
                receiver.receive(&ctx).await;
            } else {
                Next::new(middleware, receiver).run(&ctx).await;
            }
        };
        AssertUnwindSafe(fut).catch_unwind().await
    }

    async fn deliver_system(
        &self,
        state: &mut ProcessState,
        msg: impl Message,
    ) -> Result<(), Box<dyn Any + Send>> {
        let envelope = Envelope::new(Arc::new(msg), None);
        self.deliver(state, &envelope).await
    }

    /// Walk a batch of envelopes, honoring poison pills and catching faults
    ///
    /// On a fault the unprocessed tail (excluding the faulting envelope) is
    /// stashed in `mbuffer` for replay by the next incarnation.
    async fn process_batch(&self, state: &mut ProcessState, batch: Vec<Envelope>) -> BatchOutcome {
        for idx in 0..batch.len() {
            let envelope = &batch[idx];
            if let Some(pill) = envelope.msg.downcast_ref::<PoisonPill>() {
                let graceful = pill.graceful;
                let pill = Arc::clone(&envelope.msg)
                    .into_any()
                    .downcast::<PoisonPill>()
                    .unwrap_or_else(|_| unreachable!("downcast_ref verified the type"));
                if graceful {
                    // Drain what was already materialized; the process is
                    // stopping either way, so a fault here does not restart.
                    for rest in &batch[idx + 1..] {
                        let _ = self.deliver(state, rest).await;
                    }
                }
                return BatchOutcome::Stopping(pill);
            }
            if let Err(payload) = self.deliver(state, envelope).await {
                // Best-effort Stopped to the failing incarnation.
                let _ = self.deliver_system(state, Stopped).await;
                state.mbuffer = batch[idx + 1..].to_vec();
                return BatchOutcome::Failed(Failure::from_panic(payload));
            }
        }
        BatchOutcome::Completed
    }

    /// Produce a fresh receiver and walk it through the start protocol
    async fn start_sequence(self: &Arc<Self>) -> StartResult {
        let pid = self.pid().clone();
        let mut state = self.state.lock().await;
        state.receiver = Some((self.producer)());

        if let Err(payload) = self.deliver_system(&mut state, Initialized).await {
            let _ = self.deliver_system(&mut state, Stopped).await;
            return StartResult::Failed(Failure::from_panic(payload));
        }
        self.engine
            .broadcast_event(ActorEvent::ActorInitialized { pid: pid.clone() });

        if let Err(payload) = self.deliver_system(&mut state, Started).await {
            let _ = self.deliver_system(&mut state, Stopped).await;
            return StartResult::Failed(Failure::from_panic(payload));
        }
        self.engine
            .broadcast_event(ActorEvent::ActorStarted { pid });

        let mbuffer = std::mem::take(&mut state.mbuffer);
        if !mbuffer.is_empty() {
            match self.process_batch(&mut state, mbuffer).await {
                BatchOutcome::Completed => {}
                BatchOutcome::Stopping(pill) => {
                    drop(state);
                    Arc::clone(self).cleanup(Some(pill)).await;
                    return StartResult::Stopped;
                }
                BatchOutcome::Failed(failure) => return StartResult::Failed(failure),
            }
        }
        drop(state);
        self.inbox.start(Arc::clone(self) as Arc<dyn Process>);
        StartResult::Running
    }

    /// Restart loop entered after a receiver fault
    ///
    /// Internal failures back off without consuming a restart credit; all
    /// other faults count toward `max_restarts`.
    async fn supervise(self: &Arc<Self>, mut failure: Failure) {
        loop {
            if failure.internal {
                error!(pid = %self.pid(), reason = %failure.reason, "internal failure, restarting");
            } else {
                let restarts = {
                    let mut state = self.state.lock().await;
                    if state.restarts == self.opts.max_restarts {
                        drop(state);
                        self.engine
                            .broadcast_event(ActorEvent::ActorMaxRestartsExceeded {
                                pid: self.pid().clone(),
                            });
                        Arc::clone(self).cleanup(None).await;
                        return;
                    }
                    state.restarts += 1;
                    state.restarts
                };
                self.engine.broadcast_event(ActorEvent::ActorRestarted {
                    pid: self.pid().clone(),
                    backtrace: std::mem::take(&mut failure.backtrace),
                    reason: failure.reason.clone(),
                    restarts,
                });
            }
            tokio::time::sleep(self.opts.restart_delay).await;
            match self.start_sequence().await {
                StartResult::Running | StartResult::Stopped => return,
                StartResult::Failed(next) => failure = next,
            }
        }
    }

    /// Tear the process down: children first, then self
    async fn cleanup(self: Arc<Self>, pill: Option<Arc<PoisonPill>>) {
        self.shared.detach_from_parent();
        for child in self.shared.children() {
            self.engine.poison(&child).done().await;
        }
        self.inbox.stop();
        self.engine.registry().remove(self.pid());
        {
            let mut state = self.state.lock().await;
            let _ = self.deliver_system(&mut state, Stopped).await;
            state.receiver = None;
        }
        self.engine.broadcast_event(ActorEvent::ActorStopped {
            pid: self.pid().clone(),
        });
        if let Some(pill) = pill {
            pill.resolve();
        }
    }
}

#[async_trait]
impl Process for ActorProcess {
    fn pid(&self) -> &Pid {
        &self.shared.pid
    }

    fn send(&self, msg: DynMessage, sender: Option<Pid>) {
        self.inbox.push(Envelope::new(msg, sender));
    }

    async fn invoke(self: Arc<Self>, batch: Vec<Envelope>) {
        let outcome = {
            let mut state = self.state.lock().await;
            self.process_batch(&mut state, batch).await
        };
        match outcome {
            BatchOutcome::Completed => {}
            BatchOutcome::Stopping(pill) => Arc::clone(&self).cleanup(Some(pill)).await,
            BatchOutcome::Failed(failure) => self.supervise(failure).await,
        }
    }

    fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            match self.start_sequence().await {
                StartResult::Running | StartResult::Stopped => {}
                StartResult::Failed(failure) => self.supervise(failure).await,
            }
        });
    }

    async fn shutdown(self: Arc<Self>) {
        self.cleanup(None).await;
    }
}
