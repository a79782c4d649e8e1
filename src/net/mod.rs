// net/mod.rs
//! Connection layer: one `Connection` per logical peer, each with its own
//! receive loop and writer task. Transport-specific plumbing stays here;
//! listeners and clients only wire sockets into it.

pub mod connection;
pub mod framing;
pub mod handler;

pub(crate) mod receive;
pub(crate) mod writer;

pub use connection::{Connection, ConnectionId, ConnectionState, DisconnectReason};
pub use handler::NetworkHandler;
