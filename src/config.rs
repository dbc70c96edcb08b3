use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrackerError};

pub const DEFAULT_CONFIG_FILE: &str = "reward-tracker.toml";
pub const DB_ENV_VAR: &str = "REWARD_TRACKER_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Rows shown by `simulate`
    pub single_results_limit: usize,
    /// Legs shown by `split`
    pub split_results_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("reward_tracker.db"),
            single_results_limit: 5,
            split_results_limit: 3,
        }
    }
}

impl Config {
    /// Reads `path`, or the default file in the working directory. A missing
    /// file yields the defaults; `REWARD_TRACKER_DB` overrides the database path.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|e| TrackerError::Config(format!("read {}: {e}", path.display())))?;
            Self::parse(&raw)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(db) = std::env::var(DB_ENV_VAR) {
            if !db.is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| TrackerError::Config(format!("parse config: {e}")))?;
        if config.single_results_limit == 0 || config.split_results_limit == 0 {
            return Err(TrackerError::Config("result limits must be at least 1".into()));
        }
        Ok(config)
    }
}
