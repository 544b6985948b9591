//! Configuration file support for blexfer.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BLEXFER_*)
//! 3. File given with `--config`
//! 4. Local config file (./blexfer.toml)
//! 5. Global config file (~/.config/blexfer/config.toml)
//!
//! ```toml
//! [transport]
//! port = "/dev/ttyUSB0"
//! baud = 9600
//! fragment_size = 20
//! fragment_delay_ms = 10
//! timeout_ms = 1000
//!
//! [transfer]
//! retries = 3
//! retry_delay_ms = 500
//! block_size = 180
//! package_number = 1
//! increment = false
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "blexfer.toml";

/// How commands reach the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportConfig {
    /// Serial port of the BLE-UART bridge (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Bridge baud rate.
    pub baud: Option<u32>,
    /// Bytes per bridge or ATT write.
    pub fragment_size: Option<usize>,
    /// Pause between fragments, in milliseconds.
    pub fragment_delay_ms: Option<u64>,
    /// Port timeout, in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// How files are cut and resent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    /// Resends per command.
    pub retries: Option<u32>,
    /// Pause before a resend, in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Payload bytes per block or window.
    pub block_size: Option<usize>,
    /// Package number of the first command.
    pub package_number: Option<u16>,
    /// Increment the package number per command.
    pub increment: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load configuration from the global and local files, then `explicit`.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        if let Some(path) = explicit {
            config.merge(Self::load_from_path(path));
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "blexfer").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        let t = other.transport;
        take(&mut self.transport.port, t.port);
        take(&mut self.transport.baud, t.baud);
        take(&mut self.transport.fragment_size, t.fragment_size);
        take(&mut self.transport.fragment_delay_ms, t.fragment_delay_ms);
        take(&mut self.transport.timeout_ms, t.timeout_ms);

        let x = other.transfer;
        take(&mut self.transfer.retries, x.retries);
        take(&mut self.transfer.retry_delay_ms, x.retry_delay_ms);
        take(&mut self.transfer.block_size, x.block_size);
        take(&mut self.transfer.package_number, x.package_number);
        take(&mut self.transfer.increment, x.increment);
    }
}
