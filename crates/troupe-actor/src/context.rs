//! Per-delivery receiver context

use crate::engine::Engine;
use crate::message::{DynMessage, Message};
use crate::opts::Opts;
use crate::pid::Pid;
use crate::process::ProcessShared;
use crate::receiver::{FuncReceiver, Producer};
use std::sync::Arc;
use tracing::warn;

/// Everything a receiver can see and do while handling one message
///
/// A fresh context is materialized per delivery; receivers must not assume
/// it outlives the `receive` call.
pub struct Context {
    engine: Engine,
    shared: Arc<ProcessShared>,
    message: DynMessage,
    sender: Option<Pid>,
}

impl Context {
    pub(crate) fn new(
        engine: Engine,
        shared: Arc<ProcessShared>,
        message: DynMessage,
        sender: Option<Pid>,
    ) -> Self {
        Self {
            engine,
            shared,
            message,
            sender,
        }
    }

    /// The message being handled
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// Who sent the message, when known
    pub fn sender(&self) -> Option<&Pid> {
        self.sender.as_ref()
    }

    /// The pid of the handling process
    pub fn pid(&self) -> &Pid {
        &self.shared.pid
    }

    /// The engine driving this process
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Send `msg` to `pid` with this process as the sender
    pub fn send(&self, pid: &Pid, msg: impl Message) {
        self.engine
            .send_dyn(pid, Arc::new(msg), Some(self.pid().clone()));
    }

    /// Reply to the sender of the current message
    ///
    /// Logs a warning when the message was anonymous.
    pub fn respond(&self, msg: impl Message) {
        match &self.sender {
            Some(sender) => self
                .engine
                .send_dyn(sender, Arc::new(msg), Some(self.pid().clone())),
            None => warn!(pid = %self.pid(), "respond called without a sender"),
        }
    }

    /// Forward the current message to another pid, preserving this process
    /// as the sender
    pub fn forward(&self, pid: &Pid) {
        self.engine
            .send_dyn(pid, Arc::clone(&self.message), Some(self.pid().clone()));
    }

    /// Spawn a child of this process
    ///
    /// The child pid extends this process's id, and the child is poisoned
    /// (and awaited) as part of this process's cleanup.
    pub fn spawn_child(&self, producer: Producer, kind: &str, opts: Opts) -> Pid {
        let child_kind = format!("{}/{}", self.pid().id, kind);
        let pid =
            self.engine
                .spawn_internal(producer, &child_kind, opts, Some(Arc::downgrade(&self.shared)));
        self.shared.add_child(pid.clone());
        pid
    }

    /// Spawn a stateless child from a plain function
    pub fn spawn_child_fn<F>(&self, f: F, kind: &str) -> Pid
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.spawn_child(FuncReceiver::producer(f), kind, Opts::default())
    }

    /// Pids of all live children
    pub fn children(&self) -> Vec<Pid> {
        self.shared.children()
    }
}
