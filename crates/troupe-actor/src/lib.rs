//! troupe-actor: the local actor engine
//!
//! Processes are spawned from producers, scheduled one batch at a time off a
//! growable ring-buffer inbox, supervised with bounded restarts, and
//! observed through an event stream that is itself a process.
//!
//! # Overview
//!
//! - [`Engine`] spawns processes and routes messages by [`Pid`].
//! - [`Receiver`] is the actor capability: anything with a `receive` method.
//! - [`Context`] is what a receiver sees per delivery.
//! - Faults are caught, restarted up to `max_restarts`, and the unprocessed
//!   tail of the faulting batch is replayed to the fresh incarnation.

pub mod constants;

mod context;
mod engine;
mod error;
mod event;
mod event_stream;
mod inbox;
mod message;
mod opts;
mod pid;
mod process;
mod receiver;
mod registry;
mod response;
mod ring_buffer;

pub use context::Context;
pub use engine::{Engine, EngineConfig, Remoter, SendRepeater, StopHandle};
pub use error::{ActorError, ActorResult};
pub use event::ActorEvent;
pub use inbox::Inbox;
pub use message::{DynMessage, Envelope, Initialized, InternalFailure, Message, Started, Stopped};
pub use opts::{Middleware, Next, Opts};
pub use pid::{Pid, LOCAL_LOOKUP_ADDR, PID_SEPARATOR};
pub use process::Process;
pub use receiver::{producer, Producer, Receiver};
pub use registry::Registry;
pub use response::Response;
pub use ring_buffer::RingBuffer;
