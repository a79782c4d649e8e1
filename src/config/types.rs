use serde::Deserialize;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- TransportKind ------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Connection-oriented byte stream (TCP).
    #[default]
    Stream,
    /// Connectionless datagrams (UDP).
    Datagram,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Framing ------------------------------------------------------------------------------------

/// How a stream transport's bytes are cut into messages. Datagram
/// transports always use the datagram boundary.
#[derive(clap::ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One completed read is one message.
    #[default]
    Raw,
    /// Each message is preceded by its length as a big-endian `u32`.
    LengthPrefixed,
}

// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
