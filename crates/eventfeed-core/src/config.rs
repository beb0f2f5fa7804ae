use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ACCOUNT_POLL_INTERVAL_SECS, DEFAULT_API_BASE_URL, DEFAULT_FEED_LIMIT,
    DEFAULT_MAX_RETAINED_EVENTS, DEFAULT_POLL_INTERVAL_SECS, ENV_TOKEN, INITIAL_WINDOW_DAYS,
    IN_PROGRESS_POLL_INTERVAL_SECS, PAYMENT_GRACE_DAYS,
};
use crate::models::{default_blocklist, EventAction};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("apiBaseUrl must be an http(s) URL, got {0:?}")]
    BaseUrl(String),
}

/// Feed engine configuration, loadable from a camelCase JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    pub api_base_url: String,

    /// Personal access token. `EVENTFEED_TOKEN` takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Event actions excluded from every view.
    pub blocklist: Vec<EventAction>,

    pub poll_interval_secs: u64,
    pub in_progress_poll_interval_secs: u64,
    pub account_poll_interval_secs: u64,
    pub feed_limit: usize,
    pub max_retained_events: usize,
    pub payment_grace_days: u32,
    pub initial_window_days: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let mut blocklist: Vec<EventAction> = default_blocklist().into_iter().collect();
        blocklist.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            blocklist,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            in_progress_poll_interval_secs: IN_PROGRESS_POLL_INTERVAL_SECS,
            account_poll_interval_secs: ACCOUNT_POLL_INTERVAL_SECS,
            feed_limit: DEFAULT_FEED_LIMIT,
            max_retained_events: DEFAULT_MAX_RETAINED_EVENTS,
            payment_grace_days: PAYMENT_GRACE_DAYS,
            initial_window_days: INITIAL_WINDOW_DAYS,
        }
    }
}

impl FeedConfig {
    /// `<config dir>/eventfeed/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eventfeed").join("config.json"))
    }

    /// Load config from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://")) {
            return Err(ConfigError::BaseUrl(self.api_base_url.clone()));
        }
        for (field, value) in [
            ("pollIntervalSecs", self.poll_interval_secs),
            ("inProgressPollIntervalSecs", self.in_progress_poll_interval_secs),
            ("accountPollIntervalSecs", self.account_poll_interval_secs),
            ("feedLimit", self.feed_limit as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    /// Token from the environment, falling back to the config file.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(ENV_TOKEN)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }

    pub fn blocklist_set(&self) -> HashSet<EventAction> {
        self.blocklist.iter().cloned().collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn in_progress_poll_interval(&self) -> Duration {
        Duration::from_secs(self.in_progress_poll_interval_secs)
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_secs(self.account_poll_interval_secs)
    }
}
