//! TOML daemon configuration, with CLI flags layered on top.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon configuration: transport wiring plus the IPC socket path.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket_path: PathBuf,
    pub spi_device: String,
    pub spi_speed_khz: u32,
    pub spi_mode: u8,
    pub gpio_chip: String,
    pub gpio_ready_offset: u32,
    pub protocol_version: u16,
    pub startup_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/rrfd.sock"),
            spi_device: "/dev/spidev0.0".to_string(),
            spi_speed_khz: 8_000,
            spi_mode: 0,
            gpio_chip: "/dev/gpiochip0".to_string(),
            gpio_ready_offset: 0,
            protocol_version: 1,
            startup_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults for unset fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
