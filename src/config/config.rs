use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

use super::{cli::CliConfig, net::NetConfig, types::LogLevel};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

/// Process-wide configuration for the binary. Library users build a
/// `NetConfig` directly instead.
#[derive(Clone, Debug)]
pub struct Config {
    pub net: NetConfig,
    pub log_level: LogLevel,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the optional config file is read with non-blocking IO.
    pub async fn init() {
        CliConfig::init();

        Self::load().await;
    }

    /// Re-read the config file and re-apply CLI overrides.
    pub async fn reload() {
        Self::load().await;
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    async fn load() {
        let cli = CliConfig::snapshot();

        let mut net = match cli.config_file_location.as_deref() {
            Some(path) => NetConfig::from_file(path)
                .await
                .unwrap_or_else(|e| panic!("failed to load config from {:?}: {e}", path)),
            None => NetConfig::default(),
        };

        cli.apply_to(&mut net);
        net.validate()
            .unwrap_or_else(|e| panic!("invalid configuration: {e}"));

        let next = Config {
            net,
            log_level: cli.log_level.unwrap_or(LogLevel::Info),
        };

        if let Some(handle) = ROOT_CONFIG.get() {
            *handle.write() = next;
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
