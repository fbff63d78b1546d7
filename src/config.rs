use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ufw::Elevation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ufw_path: String,
    pub elevation: Elevation,
    pub command_timeout_secs: u64,
    /// Re-sort the list after adding ports instead of appending at the end
    pub sort_on_add: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ufw_path: "ufw".to_string(),
            elevation: Elevation::Auto,
            command_timeout_secs: 30,
            sort_on_add: false,
            log_file: None,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/ufwtui/config.json` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ufwtui").join("config.json"))
    }

    /// Loads `path`, or the default location when none is given. Only an
    /// explicitly requested file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}
