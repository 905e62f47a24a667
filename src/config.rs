//! Daemon configuration: JSON file, then environment overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CLIENT_NAME: &str = "SEQROUTE_CLIENT_NAME";
pub const ENV_RULES: &str = "SEQROUTE_RULES";
pub const ENV_QUEUE_CAPACITY: &str = "SEQROUTE_QUEUE_CAPACITY";
pub const ENV_LOG: &str = "SEQROUTE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name shown to other sequencer clients.
    pub client_name: String,
    /// Rule file; `None` keeps rules in memory only.
    pub rules_path: Option<PathBuf>,
    pub queue_capacity: usize,
    pub startup_reconcile: bool,
    /// Default log filter, used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_name: "seqroute".to_string(),
            rules_path: Some(PathBuf::from("connections.json")),
            queue_capacity: 10,
            startup_reconcile: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SEQROUTE_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. An empty `SEQROUTE_RULES` selects the
    /// in-memory store.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(name) = lookup(ENV_CLIENT_NAME) {
            self.client_name = name;
        }
        if let Some(path) = lookup(ENV_RULES) {
            self.rules_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(capacity) = lookup(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = capacity.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: {:?}", ENV_QUEUE_CAPACITY, capacity))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(seqroute_core::Error::InvalidConfig("client_name is empty".into()).into());
        }
        if self.queue_capacity == 0 {
            return Err(
                seqroute_core::Error::InvalidConfig("queue_capacity must be > 0".into()).into(),
            );
        }
        Ok(())
    }
}
