use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;

use super::types::{Framing, TransportKind};

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 7171;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024;
pub const DEFAULT_POOL_CAPACITY: usize = 128;
pub const DEFAULT_DATAGRAM_QUEUE_DEPTH: usize = 256;

// -----------------------------------------------------------------------------
// ----- NetConfig -------------------------------------------------------------

/// Everything a listener or client needs to open its transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    pub address: IpAddr,
    pub port: u16,
    pub transport: TransportKind,
    pub max_message_size: usize,
    pub pool_capacity: usize,
    pub framing: Framing,
    pub max_connections: Option<usize>,

    // per-peer inbound queue on a datagram server
    pub datagram_queue_depth: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            transport: TransportKind::Stream,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            framing: Framing::Raw,
            max_connections: None,
            datagram_queue_depth: DEFAULT_DATAGRAM_QUEUE_DEPTH,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- NetConfig: Static -----------------------------------------------------

impl NetConfig {
    pub fn new(transport: TransportKind, addr: SocketAddr) -> Self {
        Self {
            address: addr.ip(),
            port: addr.port(),
            transport,
            ..Default::default()
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let cfg: NetConfig = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

// -----------------------------------------------------------------------------
// ----- NetConfig: Builder ----------------------------------------------------

impl NetConfig {
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_max_connections(mut self, limit: usize) -> Self {
        self.max_connections = Some(limit);
        self
    }

    pub fn with_datagram_queue_depth(mut self, depth: usize) -> Self {
        self.datagram_queue_depth = depth;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- NetConfig: Public -----------------------------------------------------

impl NetConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::invalid("max_message_size", "must be > 0"));
        }

        if self.pool_capacity == 0 {
            return Err(ConfigError::invalid("pool_capacity", "must be > 0"));
        }

        if self.datagram_queue_depth == 0 {
            return Err(ConfigError::invalid("datagram_queue_depth", "must be > 0"));
        }

        if self.max_connections == Some(0) {
            return Err(ConfigError::invalid("max_connections", "must be > 0 when set"));
        }

        if self.framing == Framing::LengthPrefixed && self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::invalid(
                "max_message_size",
                "must fit a u32 length prefix",
            ));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        ConfigError::Invalid { field, reason }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
