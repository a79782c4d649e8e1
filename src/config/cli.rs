use clap::Parser;
use parking_lot::RwLock;
use std::{
    net::IpAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use super::{
    net::NetConfig,
    types::{Framing, LogLevel, TransportKind},
};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

/// Command-line / environment layer. `None` means "not given", so file and
/// default values show through.
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub config_file_location: Option<PathBuf>,
    pub log_level: Option<LogLevel>,

    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub transport: Option<TransportKind>,
    pub framing: Option<Framing>,
    pub max_message_size: Option<usize>,
    pub pool_capacity: Option<usize>,
    pub max_connections: Option<usize>,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }

    /// Overlay every flag that was given on top of `net`.
    pub fn apply_to(&self, net: &mut NetConfig) {
        if let Some(host) = self.host {
            net.address = host;
        }
        if let Some(port) = self.port {
            net.port = port;
        }
        if let Some(transport) = self.transport {
            net.transport = transport;
        }
        if let Some(framing) = self.framing {
            net.framing = framing;
        }
        if let Some(size) = self.max_message_size {
            net.max_message_size = size;
        }
        if let Some(capacity) = self.pool_capacity {
            net.pool_capacity = capacity;
        }
        if let Some(limit) = self.max_connections {
            net.max_connections = Some(limit);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));
        args.into()
    }
}

impl From<Args> for CliConfig {
    fn from(args: Args) -> Self {
        Self {
            config_file_location: args.config_file,
            log_level: args.log_level,
            host: args.host,
            port: args.port,
            transport: args.transport,
            framing: args.framing,
            max_message_size: args.max_message_size,
            pool_capacity: args.pool_capacity,
            max_connections: args.max_connections,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tidewire", version, about = "Stream/datagram echo server")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "TIDEWIRE_HOST")]
    host: Option<IpAddr>,

    #[arg(long = "port", short = 'p', env = "TIDEWIRE_PORT")]
    port: Option<u16>,

    #[arg(long = "transport", short = 't', env = "TIDEWIRE_TRANSPORT")]
    transport: Option<TransportKind>,

    #[arg(long = "framing", env = "TIDEWIRE_FRAMING")]
    framing: Option<Framing>,

    #[arg(long = "max-message-size", env = "TIDEWIRE_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    #[arg(long = "pool-capacity", env = "TIDEWIRE_POOL_CAPACITY")]
    pool_capacity: Option<usize>,

    #[arg(long = "max-connections", env = "TIDEWIRE_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    // Defaults to info.
    #[arg(long = "log", env = "TIDEWIRE_LOG")]
    log_level: Option<LogLevel>,

    // Optional TOML file with the same keys as NetConfig.
    #[arg(long = "config", short = 'c', env = "TIDEWIRE_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("cli config not initialized; call CliConfig::init() first")
        .clone()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
