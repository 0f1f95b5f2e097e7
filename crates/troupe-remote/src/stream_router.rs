//! Outbound stream routing
//!
//! One router actor per engine owns the map from peer address to stream
//! writer. The map never leaves the router, so it needs no lock. A writer
//! that loses its peer publishes `RemoteUnreachable`, which both drops the
//! mapping here and reaches event-stream subscribers.

use crate::config::RemoteConfig;
use crate::stream_writer::StreamWriter;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use troupe_actor::{producer, ActorEvent, Context, DynMessage, Engine, Pid, Producer, Receiver};

/// Ask the router to ship `msg` to the non-local pid `target`
#[derive(Debug)]
pub(crate) struct StreamDeliver {
    pub(crate) target: Pid,
    pub(crate) sender: Option<Pid>,
    pub(crate) msg: DynMessage,
}

pub(crate) struct StreamRouter {
    engine: Engine,
    config: RemoteConfig,
    /// Peer address -> stream writer pid
    streams: HashMap<String, Pid>,
}

pub(crate) fn stream_router_producer(engine: Engine, config: RemoteConfig) -> Producer {
    producer(move || StreamRouter {
        engine: engine.clone(),
        config: config.clone(),
        streams: HashMap::new(),
    })
}

#[async_trait]
impl Receiver for StreamRouter {
    async fn receive(&mut self, ctx: &Context) {
        if let Some(deliver) = ctx.message().downcast_ref::<StreamDeliver>() {
            let address = deliver.target.address.clone();
            let writer_pid = match self.streams.get(&address) {
                Some(pid) => pid.clone(),
                None => {
                    let writer = StreamWriter::new(
                        self.engine.clone(),
                        ctx.pid().clone(),
                        address.clone(),
                        &self.config,
                    );
                    let pid = self.engine.spawn_process(writer);
                    self.streams.insert(address, pid.clone());
                    pid
                }
            };
            ctx.forward(&writer_pid);
        } else if let Some(ActorEvent::RemoteUnreachable { listen_addr }) =
            ctx.message().downcast_ref::<ActorEvent>()
        {
            if let Some(writer_pid) = self.streams.remove(listen_addr) {
                debug!(remote = %listen_addr, pid = %writer_pid, "stream terminated");
            }
        }
    }
}
