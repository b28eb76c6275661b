//! Configuration management for the virtual device
//!
//! Handles loading and saving of YAML configuration files. Every field has a
//! default, so an empty file (or no file) is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::midi::{FrameHeader, DEFAULT_PRODUCT_TYPE, OMNI_DEVICE_ID};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Product type byte of every SysEx header
    pub product_type: u8,
    /// Device id byte of every SysEx header
    pub device_id: u8,
    /// Ignore morph button presses (reproduces a known firmware interaction)
    pub simulate_morph_bug: bool,
    /// Morph crossfade duration
    pub morph_fade_seconds: f64,
    /// Interval the host drives `tick()` with
    pub tick_interval_ms: u64,
    /// Tempo at startup
    pub default_bpm: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            product_type: DEFAULT_PRODUCT_TYPE,
            device_id: OMNI_DEVICE_ID,
            simulate_morph_bug: false,
            morph_fade_seconds: 1.0,
            tick_interval_ms: 20,
            default_bpm: 120.0,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Failed to parse YAML config: {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: DeviceConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.product_type <= 0x7F,
            "product_type must be a 7-bit value, got {}",
            self.product_type
        );
        anyhow::ensure!(
            self.device_id <= 0x7F,
            "device_id must be a 7-bit value, got {}",
            self.device_id
        );
        anyhow::ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        anyhow::ensure!(
            self.morph_fade_seconds >= 0.0,
            "morph_fade_seconds must not be negative"
        );
        Ok(())
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.product_type, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = DeviceConfig::from_yaml("simulate_morph_bug: true\nproduct_type: 0\n").unwrap();
        assert!(config.simulate_morph_bug);
        assert_eq!(config.product_type, 0);
        assert_eq!(config.tick_interval_ms, 20);
        assert_eq!(config.default_bpm, 120.0);
    }

    #[test]
    fn test_default_header() {
        let header = DeviceConfig::default().header();
        assert_eq!(header.product_type, DEFAULT_PRODUCT_TYPE);
        assert_eq!(header.device_id, OMNI_DEVICE_ID);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(DeviceConfig::from_yaml("").unwrap(), DeviceConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DeviceConfig::from_yaml("product_type: 200").is_err());
        assert!(DeviceConfig::from_yaml("tick_interval_ms: 0").is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.yaml");
        let path = path.to_str().unwrap();

        let config = DeviceConfig {
            morph_fade_seconds: 2.5,
            default_bpm: 90.0,
            ..DeviceConfig::default()
        };
        config.save(path).await.unwrap();

        let loaded = DeviceConfig::load(path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        assert!(DeviceConfig::load(path.to_str().unwrap()).await.is_err());
    }
}
