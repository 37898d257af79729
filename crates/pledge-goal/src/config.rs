// config.rs — Engine and deployment configuration.
//
// `PledgeConfig::for_project()` lays out state under a `.pledge/` directory
// in the project root. `PledgeConfig::load()` overlays `.pledge/config.toml`
// when it exists; every field has a default, so a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use pledge_ledger::DEFAULT_STARTING_BALANCE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration from `.pledge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PledgeConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub dialog: DialogConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

/// Ledger storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Credits granted to a user on first contact.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,

    /// Ledger document, relative to the project root unless absolute.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            data_file: default_data_file(),
        }
    }
}

/// Bounds on in-memory dialog state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Minutes of inactivity after which a half-finished dialog is dropped.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u32,

    /// Upper bound on concurrently tracked dialogs.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl DialogConfig {
    pub fn ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.ttl_minutes))
    }
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Event log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// JSONL event log, relative to the project root unless absolute.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

// Serde default functions
fn default_starting_balance() -> i64 {
    DEFAULT_STARTING_BALANCE
}

fn default_data_file() -> PathBuf {
    PathBuf::from(".pledge/ledger.json")
}

fn default_ttl_minutes() -> u32 {
    30
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".pledge/events.jsonl")
}

impl PledgeConfig {
    /// Path of the config file for a project.
    pub fn config_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(".pledge").join("config.toml")
    }

    /// Defaults with paths resolved against `project_root`.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.resolve_paths(project_root.as_ref());
        config
    }

    /// Load `.pledge/config.toml` if present, otherwise the defaults.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = project_root.as_ref();
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(Self::for_project(root));
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: PledgeConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
        config.resolve_paths(root);
        Ok(config)
    }

    fn resolve_paths(&mut self, root: &Path) {
        if self.ledger.data_file.is_relative() {
            self.ledger.data_file = root.join(&self.ledger.data_file);
        }
        if self.events.log_file.is_relative() {
            self.events.log_file = root.join(&self.events.log_file);
        }
    }
}
