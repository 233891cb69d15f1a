use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use color_eyre::eyre::{Result, eyre};
use tracing::Level;

use crate::config::LogConfig;

pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Installs the global subscriber, appending plain-text records to the log
/// file. Returns the file path.
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let path = config.path();
    ensure_parent_dir(&path)?;
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(false)
        .with_max_level(parse_level(&config.level))
        .with_writer(Mutex::new(file))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("failed to set tracing subscriber: {e}"))?;
    Ok(path)
}

/// The last `count` lines of the log file, oldest first.
pub fn recent_entries(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}
