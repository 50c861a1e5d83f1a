/*!
Configuration management for the capture simulator.
*/

use std::path::Path;

use anyhow::{Context, Result};
use gateware::ControllerConfig;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            controller: ControllerConfig::default(),
            capture: CaptureConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Root directory; each session gets a timestamped subdirectory
    pub output_directory: String,

    /// Write frame files
    pub enable_storage: bool,

    /// Print one JSON line per frame on stdout
    pub live_output: bool,

    /// Stop after this many bus ticks (0 = until Ctrl+C)
    pub max_bus_ticks: u64,

    /// Stop after this many frames (0 = no limit)
    pub max_frames: u64,

    /// Assert `full` every this many bus ticks (0 = never)
    pub stall_every_ticks: u64,

    /// Length of each stall in bus ticks
    pub stall_for_ticks: u64,

    /// Packet channel capacity between simulation and writer
    pub channel_buffer_size: usize,

    /// Statistics reporting interval in seconds
    pub stats_interval_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_directory: "./frames".to_string(),
            enable_storage: true,
            live_output: false,
            max_bus_ticks: 0,
            max_frames: 10,
            stall_every_ticks: 0,
            stall_for_ticks: 0,
            channel_buffer_size: 1000,
            stats_interval_seconds: 10,
        }
    }
}
