//! bopbox: ESP-01S WiFi modem and PN532 NFC reader on two serial ports.
//!
//! Usage: `bopbox [config.json]`

mod app;
mod config;

use anyhow::Result;
use config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let path = Config::path_from_args(std::env::args());
    let config = Config::load(&path)?;

    init_tracing(config.debug_mode);
    tracing::info!(config = %path.display(), "Configuration loaded");

    app::run(config).await
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` in debug mode.
fn init_tracing(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
