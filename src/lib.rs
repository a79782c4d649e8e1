pub mod buffer;
pub mod client;
pub mod config;
pub mod errors;
pub mod net;
pub mod server;

pub use buffer::{BufferPool, Decode, Encode, MessageBuffer, PooledBuffer};
pub use config::{Config, Framing, NetConfig, TransportKind};
pub use errors::{NetError, Result};
pub use net::{Connection, ConnectionId, ConnectionState, DisconnectReason, NetworkHandler};
pub use server::{Server, SessionRegistry};
