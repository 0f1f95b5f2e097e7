//! troupe-remote: network transport for the actor engine
//!
//! Exposes the same send semantics for non-local pids: outbound messages are
//! batched per peer through one stream writer each, inbound connections run
//! a reader loop that delivers straight into the local engine. Frames intern
//! sender, target, and type-name tables per batch.
//!
//! Message types that cross the wire must be registered up front with
//! [`register_type`] on every node.

pub mod constants;

mod config;
mod error;
mod frame;
mod remote;
mod serializer;
mod stream_reader;
mod stream_router;
mod stream_writer;

pub use config::RemoteConfig;
pub use error::{RemoteError, RemoteResult};
pub use frame::{WireEnvelope, WireMessage};
pub use remote::Remote;
pub use serializer::{register_type, Deserializer, JsonSerializer, Serializer};
