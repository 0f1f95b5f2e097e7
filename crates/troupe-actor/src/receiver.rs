//! The receiver capability
//!
//! Anything that can handle a message may serve as an actor: the engine only
//! requires a `receive` method. Stateful receivers close over their state;
//! the producer is a factory callback that yields a fresh receiver at every
//! (re)start so crashed actors come back clean.

use crate::context::Context;
use async_trait::async_trait;
use std::sync::Arc;

/// A message handler associated with a process
#[async_trait]
pub trait Receiver: Send + 'static {
    /// Handle the current message carried by `ctx`
    ///
    /// Invoked by at most one task at any moment. A long-running receive
    /// starves only its own mailbox.
    async fn receive(&mut self, ctx: &Context);
}

/// Factory returning a fresh receiver at every process start
pub type Producer = Arc<dyn Fn() -> Box<dyn Receiver> + Send + Sync>;

/// Build a producer from a factory closure
pub fn producer<F, R>(f: F) -> Producer
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Receiver,
{
    Arc::new(move || Box::new(f()))
}

/// Stateless receiver wrapping a plain function
pub(crate) struct FuncReceiver {
    f: Arc<dyn Fn(&Context) + Send + Sync>,
}

impl FuncReceiver {
    pub(crate) fn producer<F>(f: F) -> Producer
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        let f: Arc<dyn Fn(&Context) + Send + Sync> = Arc::new(f);
        Arc::new(move || Box::new(FuncReceiver { f: Arc::clone(&f) }))
    }
}

#[async_trait]
impl Receiver for FuncReceiver {
    async fn receive(&mut self, ctx: &Context) {
        (self.f)(ctx);
    }
}
