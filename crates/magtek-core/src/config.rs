//! Host-side reader configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// USB identifiers and timeouts used when talking to a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub vendor_id: u16,
    /// PID while in keyboard emulation mode.
    pub kb_product_id: u16,
    /// PID while in raw HID mode.
    pub hid_product_id: u16,
    /// Feature report transfer timeout.
    pub control_timeout_ms: u64,
    /// Timeout of each interrupt read while waiting for a swipe.
    pub read_timeout_ms: u64,
    /// Timeout of the read that flushes trailing data after a swipe.
    pub drain_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            vendor_id: MAGTEK_VENDOR_ID,
            kb_product_id: KB_PRODUCT_ID,
            hid_product_id: HID_PRODUCT_ID,
            control_timeout_ms: DEFAULT_CONTROL_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ReaderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ReaderConfig = toml::from_str("read_timeout_ms = 250\n").unwrap();
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.vendor_id, MAGTEK_VENDOR_ID);
        assert_eq!(config.drain_timeout_ms, DEFAULT_DRAIN_TIMEOUT_MS);
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("magtek-config-{}.toml", std::process::id()));
        let config = ReaderConfig {
            hid_product_id: 0x0011,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = ReaderConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_bad_toml() {
        let err = toml::from_str::<ReaderConfig>("vendor_id = \"nope\"").unwrap_err();
        assert!(matches!(ConfigError::from(err), ConfigError::Parse(_)));
    }
}
