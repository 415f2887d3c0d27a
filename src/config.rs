// Copyright 2026 rfchat contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::bluetooth::{ServiceRecord, DEFAULT_SCAN_DURATION, DEFAULT_SERVICE_NAME, READ_BUFFER_SIZE};
use crate::chat::MAX_FRAME_LEN;
use crate::error::{Error, Result};

const APP_DIR: &str = "rfchat";
const CONFIG_FILE: &str = "config.toml";

/// Make a name safe to advertise over Bluetooth.
/// Keeps alphanumerics, spaces and hyphens.
fn sanitize_alias(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == ' ' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        APP_DIR.to_string()
    } else {
        trimmed.to_string()
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Config {
        message: format!("Failed to {} {}: {}", action, path.display(), err),
    }
}

/// Which stack carries the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// BlueZ RFCOMM (needs the `bluez` feature).
    Rfcomm,
    /// Plain TCP, for running without radio hardware.
    Tcp,
}

impl Default for TransportKind {
    fn default() -> Self {
        if cfg!(feature = "bluez") {
            Self::Rfcomm
        } else {
            Self::Tcp
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rfcomm => f.write_str("rfcomm"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Chat settings.
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Service name; the RFCOMM UUID is derived from it.
    pub service_name: String,

    /// Length of a discovery scan in milliseconds.
    pub scan_duration_ms: u64,

    pub transport: TransportKind,

    /// Address the TCP transport listens on.
    pub tcp_bind: String,

    /// Name the adapter advertises (RFCOMM only).
    pub device_alias: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            scan_duration_ms: DEFAULT_SCAN_DURATION.as_millis() as u64,
            transport: TransportKind::default(),
            tcp_bind: "0.0.0.0:5959".to_string(),
            device_alias: APP_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Most bytes returned by one receive.
    pub read_buffer_size: usize,

    /// Longest inbound frame kept.
    pub max_frame_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl Config {
    /// `<config dir>/rfchat/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if missing.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| io_error("read", path, e))?;
            debug!("Loaded configuration from {}", path.display());
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            info!("Wrote default configuration to {}", path.display());
            config
        };

        config.bluetooth.device_alias = sanitize_alias(&config.bluetooth.device_alias);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_error("create", dir, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| io_error("write", path, e))?;
        Ok(())
    }

    /// Reject values the connection layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.bluetooth.service_name.is_empty() {
            return Err(Error::Config {
                message: "bluetooth.service_name must not be empty".to_string(),
            });
        }
        if self.chat.read_buffer_size == 0 || self.chat.max_frame_len == 0 {
            return Err(Error::Config {
                message: "chat buffer sizes must be greater than zero".to_string(),
            });
        }
        self.tcp_bind()?;
        Ok(())
    }

    pub fn service(&self) -> ServiceRecord {
        ServiceRecord::from_name(self.bluetooth.service_name.clone())
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.bluetooth.scan_duration_ms)
    }

    pub fn tcp_bind(&self) -> Result<SocketAddr> {
        self.bluetooth.tcp_bind.parse().map_err(|e| Error::Config {
            message: format!("Invalid tcp_bind '{}': {}", self.bluetooth.tcp_bind, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_alias() {
        assert_eq!(sanitize_alias("my.laptop"), "my-laptop");
        assert_eq!(sanitize_alias("Desk Top"), "Desk Top");
        assert_eq!(sanitize_alias("..."), "rfchat");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service().name, "CoinCraze");
        assert_eq!(config.scan_duration(), Duration::from_millis(8000));
        assert_eq!(config.chat.read_buffer_size, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.bluetooth.service_name = "rfchat-test".to_string();
        config.bluetooth.transport = TransportKind::Tcp;
        config.chat.max_frame_len = 512;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.service().uuid.to_string(),
            "6a9881c9-40f3-38d0-a550-2d91c02124de"
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chat]\nmax_frame_len = 64\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.chat.max_frame_len, 64);
        assert_eq!(config.bluetooth, BluetoothConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[bluetooth]\ntcp_bind = \"nowhere\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config { .. })));

        std::fs::write(&path, "[chat]\nread_buffer_size = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config { .. })));

        std::fs::write(&path, "not toml [").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config { .. })));
    }
}
