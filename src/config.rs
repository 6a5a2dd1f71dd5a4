//! Aggregator configuration: JSON document, env overrides, validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_ENDPOINT: &str = "PLAYPULSE_ENDPOINT";
pub const ENV_PLAYER: &str = "PLAYPULSE_PLAYER";
pub const ENV_STORE: &str = "PLAYPULSE_STORE";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregatorConfig {
    pub endpoint_url: String,
    pub test_endpoint_url: Option<String>,
    pub use_test_endpoint: bool,

    pub connection_timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_secs: f64,

    pub send_on_interval: bool,
    pub send_interval_secs: f64,
    pub send_on_scene_change: bool,
    pub send_on_session_end: bool,

    pub save_offline_data: bool,
    pub max_offline_sessions: usize,

    pub player_name: String,
    pub game_scenes: Vec<String>,
    pub game_version: String,

    pub provider_retry_delay_ms: u64,
    pub replay_grace_secs: f64,
    pub replay_probe_timeout_secs: u64,
    pub replay_spacing_secs: f64,

    pub store_path: PathBuf,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8080/api/game-result".to_string(),
            test_endpoint_url: None,
            use_test_endpoint: false,
            connection_timeout_secs: 30,
            max_retry_attempts: 3,
            retry_delay_secs: 5.0,
            send_on_interval: false,
            send_interval_secs: 300.0,
            send_on_scene_change: true,
            send_on_session_end: true,
            save_offline_data: true,
            max_offline_sessions: 100,
            player_name: "Player1".to_string(),
            game_scenes: ["MathGame", "NewMaze", "PuzzleGame", "NewTower", "WhackAMole"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            game_version: env!("CARGO_PKG_VERSION").to_string(),
            provider_retry_delay_ms: 200,
            replay_grace_secs: 2.0,
            replay_probe_timeout_secs: 10,
            replay_spacing_secs: 1.0,
            store_path: PathBuf::from("playpulse_store.json"),
        }
    }
}

impl AggregatorConfig {
    /// Reads a JSON config file, applies env overrides and validates.
    /// Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_ENDPOINT) {
            self.endpoint_url = url;
        }
        if let Some(name) = non_empty(ENV_PLAYER) {
            self.player_name = name;
        }
        if let Some(path) = non_empty(ENV_STORE) {
            self.store_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(invalid("endpoint_url", "must not be empty"));
        }
        if self.use_test_endpoint
            && self
                .test_endpoint_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(invalid(
                "test_endpoint_url",
                "required when use_test_endpoint is set",
            ));
        }
        if self.connection_timeout_secs == 0 {
            return Err(invalid("connection_timeout_secs", "must be at least 1"));
        }
        if self.max_retry_attempts == 0 {
            return Err(invalid("max_retry_attempts", "must be at least 1"));
        }
        if self.max_offline_sessions == 0 {
            return Err(invalid("max_offline_sessions", "must be at least 1"));
        }
        for (field, value) in [
            ("retry_delay_secs", self.retry_delay_secs),
            ("send_interval_secs", self.send_interval_secs),
            ("replay_grace_secs", self.replay_grace_secs),
            ("replay_spacing_secs", self.replay_spacing_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be a finite, non-negative number of seconds"));
            }
        }
        if self.send_on_interval && self.send_interval_secs == 0.0 {
            return Err(invalid(
                "send_interval_secs",
                "must be positive when send_on_interval is set",
            ));
        }
        Ok(())
    }

    /// Endpoint every send and probe goes to.
    pub fn active_endpoint(&self) -> &str {
        match (&self.test_endpoint_url, self.use_test_endpoint) {
            (Some(url), true) => url,
            _ => &self.endpoint_url,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }

    pub fn send_interval(&self) -> Duration {
        secs(self.send_interval_secs)
    }

    pub fn provider_retry_delay(&self) -> Duration {
        Duration::from_millis(self.provider_retry_delay_ms)
    }

    pub fn replay_grace(&self) -> Duration {
        secs(self.replay_grace_secs)
    }

    pub fn replay_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.replay_probe_timeout_secs)
    }

    pub fn replay_spacing(&self) -> Duration {
        secs(self.replay_spacing_secs)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
