pub mod cli;
pub mod config;
pub mod net;
pub mod types;

pub use config::Config;
pub use net::{ConfigError, NetConfig};
pub use types::{Framing, LogLevel, TransportKind};
