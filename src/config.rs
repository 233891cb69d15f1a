use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::session::SessionOptions;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub pool: PoolConfig,
    pub monitor: MonitorConfig,
    pub listing: ListingConfig,
    pub kill: KillConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub default_sort: String,
    /// auto, always, never
    pub color: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            default_sort: "pid".to_string(),
            color: "auto".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { workers: 4 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_interval_ms: u64,
    pub display_interval_ms: u64,
    pub input_poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            sample_interval_ms: 1000,
            display_interval_ms: 1000,
            input_poll_ms: 200,
        }
    }
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub batch_size: usize,
    pub name_width: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        ListingConfig {
            batch_size: 15,
            name_width: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KillConfig {
    pub grace_period_ms: u64,
}

impl Default for KillConfig {
    fn default() -> Self {
        KillConfig {
            grace_period_ms: 1000,
        }
    }
}

impl KillConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    pub level: String,
    pub recent_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file: None,
            level: "info".to_string(),
            recent_lines: 10,
        }
    }
}

impl LogConfig {
    pub fn path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(default_log_path)
    }
}

impl Config {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            workers: self.pool.workers,
            display_interval: Duration::from_millis(self.monitor.display_interval_ms.max(1)),
            input_poll: Duration::from_millis(self.monitor.input_poll_ms.max(1)),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("procman").join("config.toml"))
}

pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("procman")
        .join("procman.log")
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
