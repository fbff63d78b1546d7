use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use tracing::Level;

/// A fresh log file in the temp dir, named after the start time.
pub fn default_log_path() -> PathBuf {
    let mut log_path = std::env::temp_dir();
    log_path.push(format!("ufwtui_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
    log_path
}

/// Sends `tracing` output to `path`. The terminal belongs to the UI, so
/// nothing is ever written to stdout or stderr.
pub fn init(path: &Path, debug: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(if debug { Level::DEBUG } else { Level::INFO })
        .try_init()
        .map_err(|e| anyhow!("cannot initialise logging: {e}"))
}

pub fn current_user() -> String {
    users::get_current_username()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("uid {}", users::get_current_uid()))
}
