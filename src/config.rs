//! Agent configuration (`converge.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const CONFIG_FILE: &str = "converge.toml";

fn default_record_sessions() -> bool {
    true
}

/// Settings read from `converge.toml`; every key is optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Report changes instead of making them
    #[serde(default)]
    pub noop: bool,
    /// Where session records are written, defaults to the state dir
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default = "default_record_sessions")]
    pub record_sessions: bool,
    /// Default timeout in seconds for commands without their own
    #[serde(default)]
    pub command_timeout: Option<u64>,
    /// Data merged under the manifest's `[data]` table
    #[serde(default)]
    pub data: toml::Table,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            noop: false,
            state_dir: None,
            record_sessions: default_record_sessions(),
            command_timeout: None,
            data: toml::Table::new(),
        }
    }
}

impl AgentConfig {
    /// Load `converge.toml` from the config dir, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Directory for session records
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.map(Duration::from_secs)
    }

    /// Config data as JSON, for merging with manifest data
    pub fn data_value(&self) -> Result<Value> {
        serde_json::to_value(&self.data).context("Config data is not representable as JSON")
    }
}
