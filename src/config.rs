use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transfer::SweeperConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    #[serde(default)]
    pub sweeper: SweeperSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "docledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: true,
            sweeper: SweeperSettings::default(),
        }
    }
}

/// Recovery sweeper settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweeperSettings {
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: usize,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

impl SweeperSettings {
    pub fn to_sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            batch_size: self.batch_size,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load from a YAML file, falling back to defaults if it is missing.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("config {path} not loaded ({e}), using defaults");
                Self::default()
            }
        }
    }
}
