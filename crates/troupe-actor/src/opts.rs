//! Spawn options and receive middleware

use crate::constants::{INBOX_CAPACITY_DEFAULT, RESTARTS_COUNT_MAX_DEFAULT, RESTART_DELAY_MS_DEFAULT};
use crate::context::Context;
use crate::receiver::Receiver;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Supervision and mailbox options applied at spawn
#[derive(Clone)]
pub struct Opts {
    pub(crate) id: Option<String>,
    pub(crate) max_restarts: u32,
    pub(crate) restart_delay: Duration,
    pub(crate) inbox_capacity: usize,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            id: None,
            max_restarts: RESTARTS_COUNT_MAX_DEFAULT,
            restart_delay: Duration::from_millis(RESTART_DELAY_MS_DEFAULT),
            inbox_capacity: INBOX_CAPACITY_DEFAULT,
            middleware: Vec::new(),
        }
    }
}

impl Opts {
    /// Set the id part of the spawned pid; random when absent
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set how many faults are tolerated before the process is terminated
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Set the delay between a fault and the restart
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Set the starting ring capacity of the inbox
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        debug_assert!(capacity > 0, "inbox capacity must be positive");
        self.inbox_capacity = capacity;
        self
    }

    /// Append a middleware; the first registered runs outermost
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

/// Wraps every receive of the process it is registered on
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handle the delivery; call `next.run(ctx)` to continue the chain
    async fn handle(&self, ctx: &Context, next: Next<'_>);
}

/// Remainder of the middleware chain ending at the receiver
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    receiver: &'a mut dyn Receiver,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], receiver: &'a mut dyn Receiver) -> Self {
        Self { chain, receiver }
    }

    /// Run the rest of the chain, innermost being the receiver itself
    pub async fn run(self, ctx: &Context) {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.handle(ctx, Next::new(rest, self.receiver)).await;
            }
            None => self.receiver.receive(ctx).await,
        }
    }
}
