//! Application configuration management.
//!
//! This module handles loading and saving the demo configuration: page
//! size, the mock backend's simulated latencies, and its random failure
//! rate.
//!
//! Configuration is stored at `~/.config/todocache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "todocache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

fn default_page_size() -> usize {
    10
}

fn default_read_latency_ms() -> u64 {
    300
}

fn default_write_latency_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_read_latency_ms")]
    pub read_latency_ms: u64,
    #[serde(default = "default_write_latency_ms")]
    pub write_latency_ms: u64,
    /// Probability in [0, 1] that any store call fails with a simulated
    /// network error.
    #[serde(default)]
    pub fail_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            read_latency_ms: default_read_latency_ms(),
            write_latency_ms: default_write_latency_ms(),
            fail_rate: 0.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.read_latency_ms, 300);
        assert_eq!(config.write_latency_ms, 500);
        assert_eq!(config.fail_rate, 0.0);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config: Config = serde_json::from_str(r#"{"fail_rate": 0.25}"#).unwrap();
        assert_eq!(config.fail_rate, 0.25);
        assert_eq!(config.page_size, 10);
    }
}
