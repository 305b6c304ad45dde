//! Configuration for the Trellis client
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the workflow engine API
    #[serde(default = "default_engine_base_url")]
    pub engine_base_url: String,

    /// Interval between authoritative polls, in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// How long a completed execution is retained to absorb trailing
    /// late events, in seconds
    #[serde(default = "default_completed_grace")]
    pub completed_grace_seconds: u64,

    /// Window after a history clear during which appends and merges for
    /// that conversation are dropped, in milliseconds
    #[serde(default = "default_chat_clear_cooldown")]
    pub chat_clear_cooldown_ms: u64,

    /// Maximum number of messages kept in a rendered history
    #[serde(default = "default_history_render_limit")]
    pub history_render_limit: usize,

    /// Time bound on outbound calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Capacity of the workflow catalog cache
    #[serde(default = "default_catalog_capacity")]
    pub catalog_capacity: usize,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_engine_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_completed_grace() -> u64 {
    30
}

fn default_chat_clear_cooldown() -> u64 {
    1000
}

fn default_history_render_limit() -> usize {
    50
}

fn default_request_timeout() -> u64 {
    30
}

fn default_catalog_capacity() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine_base_url: default_engine_base_url(),
            poll_interval_seconds: default_poll_interval(),
            completed_grace_seconds: default_completed_grace(),
            chat_clear_cooldown_ms: default_chat_clear_cooldown(),
            history_render_limit: default_history_render_limit(),
            request_timeout_seconds: default_request_timeout(),
            catalog_capacity: default_catalog_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn load() -> ClientResult<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override from environment variables
        if let Ok(url) = env::var("TRELLIS_ENGINE_URL") {
            config.engine_base_url = url;
        }
        if let Ok(value) = env::var("TRELLIS_POLL_INTERVAL_SECONDS") {
            config.poll_interval_seconds = parse_env("TRELLIS_POLL_INTERVAL_SECONDS", &value)?;
        }
        if let Ok(value) = env::var("TRELLIS_COMPLETED_GRACE_SECONDS") {
            config.completed_grace_seconds = parse_env("TRELLIS_COMPLETED_GRACE_SECONDS", &value)?;
        }
        if let Ok(value) = env::var("TRELLIS_CHAT_CLEAR_COOLDOWN_MS") {
            config.chat_clear_cooldown_ms = parse_env("TRELLIS_CHAT_CLEAR_COOLDOWN_MS", &value)?;
        }
        if let Ok(value) = env::var("TRELLIS_HISTORY_RENDER_LIMIT") {
            config.history_render_limit = parse_env("TRELLIS_HISTORY_RENDER_LIMIT", &value)?;
        }
        if let Ok(value) = env::var("TRELLIS_REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = parse_env("TRELLIS_REQUEST_TIMEOUT_SECONDS", &value)?;
        }
        if let Ok(level) = env::var("TRELLIS_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        if self.engine_base_url.is_empty() {
            return Err(ClientError::ConfigError(
                "engine_base_url must not be empty".to_string(),
            ));
        }
        if self.history_render_limit == 0 {
            warn!("history_render_limit is 0; no chat history will be rendered");
        }
        Ok(())
    }

    /// Interval between authoritative polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Retention window for completed executions
    pub fn completed_grace(&self) -> Duration {
        Duration::from_secs(self.completed_grace_seconds)
    }

    /// Post-clear cooldown window for chat history
    pub fn chat_clear_cooldown(&self) -> Duration {
        Duration::from_millis(self.chat_clear_cooldown_ms)
    }

    /// Time bound on outbound calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> ClientResult<T> {
    value
        .parse()
        .map_err(|_| ClientError::ConfigError(format!("Invalid value for {}: {}", name, value)))
}
