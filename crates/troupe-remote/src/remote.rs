//! The remote transport
//!
//! Binds a TCP listener for inbound batches and owns the stream router that
//! fans outbound messages into per-peer writers. Implements the engine's
//! `Remoter` seam, so attaching it is one config call:
//!
//! ```no_run
//! # use troupe_actor::{Engine, EngineConfig};
//! # use troupe_remote::{Remote, RemoteConfig};
//! # async fn build() -> troupe_actor::ActorResult<Engine> {
//! let remote = Remote::new("127.0.0.1:4000", RemoteConfig::default());
//! Engine::new(EngineConfig::new().with_remote(remote)).await
//! # }
//! ```

use crate::config::RemoteConfig;
use crate::constants::STREAM_ROUTER_INBOX_CAPACITY;
use crate::stream_reader::read_loop;
use crate::stream_router::{stream_router_producer, StreamDeliver};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use troupe_actor::{ActorError, ActorResult, DynMessage, Engine, Opts, Pid, Remoter};

const STATE_INITIALIZED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

struct RemoteInner {
    engine: Engine,
    router: Pid,
    shutdown: Arc<Notify>,
}

/// TCP transport adapting an engine to the network
pub struct Remote {
    addr: String,
    config: RemoteConfig,
    state: AtomicU8,
    inner: OnceLock<RemoteInner>,
}

impl Remote {
    /// Create a transport that will listen on `addr`
    ///
    /// The address doubles as the engine's identity: peers route to this
    /// node by putting it in the address part of a pid.
    pub fn new(addr: impl Into<String>, config: RemoteConfig) -> Arc<Remote> {
        Arc::new(Remote {
            addr: addr.into(),
            config,
            state: AtomicU8::new(STATE_INITIALIZED),
            inner: OnceLock::new(),
        })
    }
}

#[async_trait]
impl Remoter for Remote {
    fn address(&self) -> String {
        self.addr.clone()
    }

    fn send(&self, pid: &Pid, msg: DynMessage, sender: Option<Pid>) {
        // Sending while stopped still routes; receiving will not work.
        let inner = match self.inner.get() {
            Some(inner) => inner,
            None => {
                warn!(target_pid = %pid, "remote send before start, dropping");
                return;
            }
        };
        inner.engine.send(
            &inner.router,
            StreamDeliver {
                target: pid.clone(),
                sender,
                msg,
            },
        );
    }

    async fn start(&self, engine: Engine) -> ActorResult<()> {
        if self
            .state
            .compare_exchange(
                STATE_INITIALIZED,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ActorError::remote_start("remote already started"));
        }
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ActorError::remote_start(format!("bind {}: {e}", self.addr)))?;

        let router = engine.spawn_with(
            stream_router_producer(engine.clone(), self.config.clone()),
            "router",
            Opts::default().with_inbox_capacity(STREAM_ROUTER_INBOX_CAPACITY),
        );

        let shutdown = Arc::new(Notify::new());
        let accept_engine = engine.clone();
        let deserializer = self.config.deserializer();
        let max_frame_bytes = self.config.max_frame_bytes();
        let accept_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.notified() => {
                        debug!("remote listener stopped");
                        return;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let _ = stream.set_nodelay(true);
                            tokio::spawn(read_loop(
                                accept_engine.clone(),
                                stream,
                                Arc::clone(&deserializer),
                                max_frame_bytes,
                                peer,
                                Arc::clone(&accept_shutdown),
                            ));
                        }
                        Err(e) => error!(err = %e, "accept failed"),
                    }
                }
            }
        });

        let _ = self.inner.set(RemoteInner {
            engine,
            router,
            shutdown,
        });
        info!(addr = %self.addr, "remote listening");
        Ok(())
    }

    async fn stop(&self) {
        if self.state.swap(STATE_STOPPED, Ordering::AcqRel) != STATE_RUNNING {
            warn!(addr = %self.addr, "stop called on a remote that was not running");
            return;
        }
        if let Some(inner) = self.inner.get() {
            inner.shutdown.notify_waiters();
        }
    }
}
