//! The event stream process
//!
//! A regular actor holding the subscriber set; subscribe and unsubscribe are
//! just messages to it, so the set needs no external lock. Everything else
//! it receives is fanned out to every subscriber in unspecified order.

use crate::context::Context;
use crate::event::ActorEvent;
use crate::pid::Pid;
use crate::receiver::{producer, Producer, Receiver};
use async_trait::async_trait;
use std::collections::HashSet;

/// Subscribe `pid` to the event stream
#[derive(Debug, Clone)]
pub(crate) struct Subscribe {
    pub(crate) pid: Pid,
}

/// Unsubscribe `pid` from the event stream
#[derive(Debug, Clone)]
pub(crate) struct Unsubscribe {
    pub(crate) pid: Pid,
}

pub(crate) struct EventStream {
    subscribers: HashSet<Pid>,
}

pub(crate) fn event_stream_producer() -> Producer {
    producer(|| EventStream {
        subscribers: HashSet::new(),
    })
}

#[async_trait]
impl Receiver for EventStream {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(sub) = ctx.message().downcast_ref::<Subscribe>() {
            self.subscribers.insert(sub.pid.clone());
        } else if let Some(unsub) = ctx.message().downcast_ref::<Unsubscribe>() {
            self.subscribers.remove(&unsub.pid);
        } else {
            if let Some(event) = ctx.message().downcast_ref::<ActorEvent>() {
                event.log();
            }
            for subscriber in &self.subscribers {
                ctx.forward(subscriber);
            }
        }
    }
}
