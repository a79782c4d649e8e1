use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::config::ConfigError;

// -----------------------------------------------------------------------------
// ----- Result ----------------------------------------------------------------

pub type Result<T, E = NetError> = std::result::Result<T, E>;

// -----------------------------------------------------------------------------
// ----- NetError --------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NetError {
    // -- Buffer (programmer errors, fail fast) --
    #[error("buffer overflow: need {needed} bytes, {available} left of {capacity}")]
    BufferOverflow {
        needed: usize,
        available: usize,
        capacity: usize,
    },

    #[error("buffer underflow: need {needed} bytes, {available} unread")]
    BufferUnderflow { needed: usize, available: usize },

    #[error("buffer holds invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // -- Pool / registry (resource contention) --
    #[error("buffer pool exhausted ({capacity} buffers in use)")]
    PoolExhausted { capacity: usize },

    #[error("session registry full ({limit} live connections)")]
    RegistryFull { limit: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // -- Transport --
    #[error("transport setup failed for {addr}: {source}")]
    TransportSetup { addr: SocketAddr, source: io::Error },

    #[error("transport read failed: {0}")]
    TransportRead(#[source] io::Error),

    #[error("transport write failed: {0}")]
    TransportWrite(#[source] io::Error),

    #[error("connection is disconnected")]
    Disconnected,

    #[error("message of {len} bytes exceeds limit of {limit}")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("empty payloads cannot be sent over a datagram transport")]
    EmptyDatagram,
}

// -----------------------------------------------------------------------------
// ----- NetError: Public ------------------------------------------------------

impl NetError {
    pub(crate) fn setup(addr: SocketAddr, source: io::Error) -> Self {
        NetError::TransportSetup { addr, source }
    }

    /// True when the error means the peer is gone rather than a one-off
    /// failure of a single operation.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            NetError::Disconnected => true,
            NetError::TransportRead(e) | NetError::TransportWrite(e) => is_closed_kind(e.kind()),
            _ => false,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
pub(crate) fn is_closed_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
