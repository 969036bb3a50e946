//! Configuration management for sync-studio

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Synchronization backend configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Engine channel sizing
    #[serde(default)]
    pub engine: EngineConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// How long the mock processor takes to finish (ms)
    #[serde(default = "default_simulated_latency")]
    pub simulated_latency_ms: u64,

    /// When set, every synchronization fails with this message
    #[serde(default)]
    pub fail_with: Option<String>,

    /// Upper bound on a single synchronization call (no limit when unset)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Capacity of the status broadcast channel
    #[serde(default = "default_status_buffer")]
    pub status_buffer: usize,
}

// Default value functions
fn default_simulated_latency() -> u64 {
    3000
}

fn default_command_buffer() -> usize {
    32
}

fn default_status_buffer() -> usize {
    16
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: default_simulated_latency(),
            fail_with: None,
            timeout_secs: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            status_buffer: default_status_buffer(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "sync-studio", "sync-studio")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
