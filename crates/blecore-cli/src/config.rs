//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use blecore::BleConfig;

use crate::cli::{ConfigKey, OutputFormat};

/// Default connection timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Default output format ("text" or "json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Connection timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// RSSI poll interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi_interval: Option<i64>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blecore")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if it does not exist.
    ///
    /// A file that exists but cannot be read or parsed is reported as a
    /// warning and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => eprintln!("Warning: Failed to parse config: {}", e),
            },
            Err(e) => eprintln!("Warning: Failed to read config: {}", e),
        }
        Self::default()
    }

    /// Save config to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Set `key` from its string form
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            bail!("Value for {:?} must not be empty", key);
        }
        match key {
            ConfigKey::Device => self.device = Some(value.to_string()),
            ConfigKey::Format => {
                parse_format(value)?;
                self.format = Some(value.to_lowercase());
            }
            ConfigKey::Timeout => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout: {}", value))?;
                if secs == 0 {
                    bail!("Timeout must be at least 1 second");
                }
                self.timeout = Some(secs);
            }
            ConfigKey::RssiInterval => {
                let ms: i64 = value
                    .parse()
                    .with_context(|| format!("Invalid RSSI interval: {}", value))?;
                self.rssi_interval = Some(ms);
            }
        }
        Ok(())
    }

    /// Remove `key`
    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Device => self.device = None,
            ConfigKey::Format => self.format = None,
            ConfigKey::Timeout => self.timeout = None,
            ConfigKey::RssiInterval => self.rssi_interval = None,
        }
    }

    /// Library configuration for a session, with an optional RSSI override
    pub fn ble_config(&self, rssi_interval: Option<i64>) -> BleConfig {
        let mut config = BleConfig::default();
        if let Some(ms) = rssi_interval.or(self.rssi_interval) {
            config = config.rssi_poll_ms(ms);
        }
        config
    }
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    match value.to_lowercase().as_str() {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => bail!("Unknown format '{}', expected 'text' or 'json'", other),
    }
}

/// Resolve device from arg (which already includes the env var) or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .filter(|d| !d.trim().is_empty())
        .or_else(|| config.device.clone())
}

/// Resolve the connection timeout: explicit flag, then config, then default.
pub fn resolve_timeout(timeout: Option<u64>, config: &Config) -> u64 {
    timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Resolve the output format: explicit flag, then config, then text.
///
/// An unparseable format in the config file falls back to text.
pub fn resolve_format(format: Option<OutputFormat>, config: &Config) -> OutputFormat {
    format
        .or_else(|| config.format.as_deref().and_then(|f| parse_format(f).ok()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let result = resolve_device(Some("arg-device".to_string()), &config);
        assert_eq!(result, Some("arg-device".to_string()));
    }

    #[test]
    fn test_resolve_device_falls_back_to_config() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_device(Some("  ".to_string()), &config),
            Some("config-device".to_string())
        );
        assert_eq!(resolve_device(None, &config), Some("config-device".to_string()));
    }

    #[test]
    fn test_resolve_device_none_when_both_empty() {
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_resolve_timeout_order() {
        let config = Config {
            timeout: Some(60),
            ..Default::default()
        };
        assert_eq!(resolve_timeout(Some(5), &config), 5);
        assert_eq!(resolve_timeout(None, &config), 60);
        assert_eq!(resolve_timeout(None, &Config::default()), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_resolve_format_from_config() {
        let config = Config {
            format: Some("json".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_format(None, &config), OutputFormat::Json);
        assert_eq!(
            resolve_format(Some(OutputFormat::Text), &config),
            OutputFormat::Text
        );

        let broken = Config {
            format: Some("yaml".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_format(None, &broken), OutputFormat::Text);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set(ConfigKey::Device, "AA:BB:CC:DD:EE:FF").unwrap();
        config.set(ConfigKey::Timeout, "20").unwrap();
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_load_missing_or_invalid_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Config::load_from(&path), Config::default());

        fs::write(&path, "device = [").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set(ConfigKey::Timeout, "soon").is_err());
        assert!(config.set(ConfigKey::Timeout, "0").is_err());
        assert!(config.set(ConfigKey::Format, "csv").is_err());
        assert!(config.set(ConfigKey::Device, " ").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unset() {
        let mut config = Config::default();
        config.set(ConfigKey::Format, "JSON").unwrap();
        assert_eq!(config.format.as_deref(), Some("json"));
        config.unset(ConfigKey::Format);
        assert_eq!(config.format, None);
    }

    #[test]
    fn test_ble_config_rssi_override() {
        let config = Config {
            rssi_interval: Some(3000),
            ..Default::default()
        };
        assert_eq!(config.ble_config(None).rssi_poll_ms, 3000);
        assert_eq!(config.ble_config(Some(0)).rssi_poll_ms, 0);
        assert_eq!(
            Config::default().ble_config(None).rssi_poll_ms,
            BleConfig::default().rssi_poll_ms
        );
    }
}
