//! Configuration system for bacstack.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BACSTACK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/bacstack/config.toml
//!   3. ~/.config/bacstack/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::address::{Address, AddressParseError};
use crate::apdu::Segmentation;
use crate::object::LocalDevice;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub requests: RequestConfig,
}

/// The local device object announced to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub instance: u32,
    pub vendor_id: u16,
    pub max_apdu_length_accepted: u16,
    pub segmentation_supported: Segmentation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local station address, e.g. "1" or "0x0a0b".
    pub address: String,
    /// Peer devices attached to the virtual network alongside this one.
    pub simulated_peers: u32,
    /// Device instance of the first simulated peer; the rest count up.
    pub first_peer_instance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// How long a caller waits on a confirmed request before expiring it.
    pub timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "bacstack".to_string(),
            instance: 599,
            vendor_id: 999,
            max_apdu_length_accepted: 1024,
            segmentation_supported: Segmentation::NoSegmentation,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "1".to_string(),
            simulated_peers: 3,
            first_peer_instance: 1000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("bacstack")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid local address {0:?}: {1}")]
    InvalidAddress(String, AddressParseError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl StackConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            StackConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BACSTACK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&StackConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BACSTACK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BACSTACK_DEVICE__NAME") {
            self.device.name = v;
        }
        if let Ok(v) = std::env::var("BACSTACK_DEVICE__INSTANCE") {
            if let Ok(n) = v.parse() {
                self.device.instance = n;
            }
        }
        if let Ok(v) = std::env::var("BACSTACK_NETWORK__ADDRESS") {
            self.network.address = v;
        }
        if let Ok(v) = std::env::var("BACSTACK_NETWORK__SIMULATED_PEERS") {
            if let Ok(n) = v.parse() {
                self.network.simulated_peers = n;
            }
        }
        if let Ok(v) = std::env::var("BACSTACK_REQUESTS__TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.requests.timeout_ms = n;
            }
        }
    }

    /// The local device object described by the `device` section.
    pub fn local_device(&self) -> LocalDevice {
        let mut device = LocalDevice::new(
            self.device.name.clone(),
            self.device.instance,
            self.device.vendor_id,
        );
        device.max_apdu_length_accepted = self.device.max_apdu_length_accepted;
        device.segmentation_supported = self.device.segmentation_supported;
        device
    }

    pub fn local_address(&self) -> Result<Address, ConfigError> {
        self.network
            .address
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(self.network.address.clone(), e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.requests.timeout_ms)
    }
}
