// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Agent configuration
//!
//! Loaded with priority: file > env > defaults.

use crate::error::{BeaconError, Result};
use crate::policy::CooldownPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Collector endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://127.0.0.1:2043";

/// Delay before every send attempt
pub const DEFAULT_COOLDOWN_SECS: u64 = 2;

/// Attempts per flush cycle before giving up until the next trigger
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 5;

/// Key under which the pending batch is persisted
pub const DEFAULT_STORAGE_KEY: &str = "StoredEvents";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Collector URL batches are POSTed to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Cooldown before each send attempt, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Cooldown growth per consecutive failure (1.0 = fixed cooldown)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on the cooldown when backoff is enabled, in seconds
    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,

    /// Maximum send attempts per flush cycle
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Key name for the persisted pending batch
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Directory holding the file-backed pending store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Per-request timeout for the HTTP transport, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_cooldown_secs() -> u64 {
    60
}

fn default_max_send_attempts() -> u32 {
    DEFAULT_MAX_SEND_ATTEMPTS
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./beacon-data")
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            cooldown_secs: default_cooldown_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_cooldown_secs: default_max_cooldown_secs(),
            max_send_attempts: default_max_send_attempts(),
            storage_key: default_storage_key(),
            data_dir: default_data_dir(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - BEACON_ENDPOINT: collector URL (default: https://127.0.0.1:2043)
    /// - BEACON_COOLDOWN_SECS: cooldown before each attempt (default: 2)
    /// - BEACON_BACKOFF_MULTIPLIER: cooldown growth per failure (default: 1.0)
    /// - BEACON_MAX_SEND_ATTEMPTS: attempts per flush cycle (default: 5)
    /// - BEACON_STORAGE_KEY: pending store key (default: StoredEvents)
    /// - BEACON_DATA_DIR: pending store directory (default: ./beacon-data)
    /// - BEACON_REQUEST_TIMEOUT_SECS: HTTP request timeout (default: 30)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> anyhow::Result<Self> {
        match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                let mut config = Self::default();
                config.apply_env();
                // Keys present in the file win over the environment.
                let content = std::fs::read_to_string(&path)?;
                let table: toml::Table = toml::from_str(&content)?;
                config.merge_table(table)?;
                Ok(config)
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Ok(Self::from_env())
            }
            None => Ok(Self::from_env()),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("BEACON_ENDPOINT") {
            self.endpoint = endpoint;
        }

        if let Ok(secs) = std::env::var("BEACON_COOLDOWN_SECS") {
            if let Ok(val) = secs.parse() {
                self.cooldown_secs = val;
            }
        }

        if let Ok(multiplier) = std::env::var("BEACON_BACKOFF_MULTIPLIER") {
            if let Ok(val) = multiplier.parse() {
                self.backoff_multiplier = val;
            }
        }

        if let Ok(attempts) = std::env::var("BEACON_MAX_SEND_ATTEMPTS") {
            if let Ok(val) = attempts.parse() {
                self.max_send_attempts = val;
            }
        }

        if let Ok(key) = std::env::var("BEACON_STORAGE_KEY") {
            self.storage_key = key;
        }

        if let Ok(dir) = std::env::var("BEACON_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(timeout) = std::env::var("BEACON_REQUEST_TIMEOUT_SECS") {
            if let Ok(val) = timeout.parse() {
                self.request_timeout_secs = val;
            }
        }
    }

    fn merge_table(&mut self, table: toml::Table) -> anyhow::Result<()> {
        let mut merged = toml::Table::try_from(&*self)?;
        merged.extend(table);
        *self = merged.try_into()?;
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Cooldown policy derived from the cooldown and backoff settings
    pub fn cooldown_policy(&self) -> CooldownPolicy {
        if self.backoff_multiplier <= 1.0 {
            CooldownPolicy::fixed(self.cooldown())
        } else {
            let mut policy = CooldownPolicy::exponential(
                self.cooldown(),
                Duration::from_secs(self.max_cooldown_secs.max(self.cooldown_secs)),
            );
            policy.multiplier = self.backoff_multiplier;
            policy
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(BeaconError::Config("endpoint must not be empty".into()));
        }
        if self.max_send_attempts == 0 {
            return Err(BeaconError::Config(
                "max_send_attempts must be at least 1".into(),
            ));
        }
        if self.storage_key.trim().is_empty() {
            return Err(BeaconError::Config("storage_key must not be empty".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(BeaconError::Config(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}
