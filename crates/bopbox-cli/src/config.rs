//! Runtime configuration.
//!
//! Read once at startup from a JSON file. Every field has a default, so a
//! partial file (or no file at all) still yields a usable configuration.

use anyhow::{Context, Result};
use bopbox_core::WifiMode;
use bopbox_network::NetworkConfig;
use bopbox_rfid::{NfcConfig, Retries};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Used when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raises the default log level to `debug`.
    pub debug_mode: bool,
    pub wifi: WifiConfig,
    pub http_server: HttpServerConfig,
    pub nfc: NfcSettings,
    pub serial: SerialConfig,
    /// Deadline of every AT and PN532 command.
    pub command_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_mode: false,
            wifi: WifiConfig::default(),
            http_server: HttpServerConfig::default(),
            nfc: NfcSettings::default(),
            serial: SerialConfig::default(),
            command_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Without an SSID the modem is never asked to join.
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub mode: WifiMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NfcSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub retries: RetriesConfig,
}

impl Default for NfcSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 500,
            retries: RetriesConfig::default(),
        }
    }
}

/// RFConfiguration retry counts, see [`Retries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetriesConfig {
    pub atr: u8,
    pub psl: u8,
    pub passive: u8,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        let retries = Retries::default();
        Self {
            atr: retries.atr,
            psl: retries.psl,
            passive: retries.passive,
        }
    }
}

impl From<RetriesConfig> for Retries {
    fn from(config: RetriesConfig) -> Self {
        Self {
            atr: config.atr,
            psl: config.psl,
            passive: config.passive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub modem: PortConfig,
    pub nfc: PortConfig,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            modem: PortConfig::new("/dev/ttyUSB0"),
            nfc: PortConfig::new("/dev/ttyUSB1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub path: String,
    pub baud_rate: u32,
}

impl PortConfig {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            baud_rate: 115_200,
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl Config {
    /// Path given as the first argument, else [`DEFAULT_CONFIG_PATH`].
    pub fn path_from_args(mut args: impl Iterator<Item = String>) -> PathBuf {
        args.nth(1)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load and validate the file at `path`.
    ///
    /// A missing file gives the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> bopbox_core::Result<()> {
        let invalid = |message: String| Err(bopbox_core::Error::Config(message));

        if self.command_timeout_ms == 0 {
            return invalid("command_timeout_ms must be greater than zero".into());
        }
        if self.nfc.poll_interval_ms == 0 {
            return invalid("nfc.poll_interval_ms must be greater than zero".into());
        }
        if self.http_server.enabled && self.http_server.port == 0 {
            return invalid("http_server.port must be non-zero".into());
        }
        for (name, port) in [("modem", &self.serial.modem), ("nfc", &self.serial.nfc)] {
            if port.path.is_empty() {
                return invalid(format!("serial.{name}.path must be set"));
            }
            if port.baud_rate == 0 {
                return invalid(format!("serial.{name}.baud_rate must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            command_timeout: self.command_timeout(),
            wifi_mode: self.wifi.mode,
            ..NetworkConfig::default()
        }
    }

    pub fn nfc(&self) -> NfcConfig {
        NfcConfig {
            poll_interval: Duration::from_millis(self.nfc.poll_interval_ms),
            command_timeout: self.command_timeout(),
            retries: self.nfc.retries.into(),
            ..NfcConfig::default()
        }
    }
}
