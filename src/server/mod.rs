pub mod registry;
pub mod server;

mod datagram_listener;
mod stream_listener;

pub use registry::SessionRegistry;
pub use server::Server;
