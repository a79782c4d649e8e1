use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use tidewire::{Config, Connection, NetworkHandler, PooledBuffer, Server};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🌊 tidewire";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> tidewire::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> tidewire::Result<()> {
    let config = Config::snapshot();

    let server = Server::start(config.net, Arc::new(Echo)).await?;

    info!("{} listening on {}", APP_NAME, server.local_addr());

    if let Err(e) = signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }

    info!(
        "{} shutting down ({} live connections)",
        APP_NAME,
        server.connection_count()
    );
    server.shutdown().await;

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Echo ------------------------------------------------------------------

/// Sends every message straight back to where it came from.
struct Echo;

impl NetworkHandler for Echo {
    fn on_connected(&self, connection: &Arc<Connection>) {
        info!("peer {} connected as {}", connection.remote_addr(), connection.id());
    }

    fn on_message(&self, connection: &Arc<Connection>, buffer: PooledBuffer) {
        if let Err(e) = connection.send(&buffer) {
            warn!("echo to {} failed: {e}", connection.id());
        }
    }

    fn on_disconnected(&self, connection: &Arc<Connection>) {
        info!(
            "peer {} disconnected: {:?}",
            connection.id(),
            connection.disconnect_reason()
        );
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
