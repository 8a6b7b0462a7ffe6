//! Configuration management
//!
//! Settings are read with the following precedence:
//! 1. Environment variables
//! 2. `roomwhen.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is replaced with the variable's value.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "roomwhen.toml";

/// Main configuration for roomwhen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Personal calendar feed
    #[serde(default)]
    pub feed: FeedConfig,

    /// Venue booking site
    #[serde(default)]
    pub venue: VenueConfig,

    /// Availability polling
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Calendar feed URL
    #[serde(default)]
    pub url: Option<String>,

    /// File whose first line holds the feed URL, used when `url` is unset
    #[serde(default = "default_url_file")]
    pub url_file: String,

    /// Seconds between feed refreshes
    #[serde(default = "default_feed_refresh_secs")]
    pub refresh_secs: u64,

    /// HTTP timeout for the feed download
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_file: default_url_file(),
            refresh_secs: default_feed_refresh_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FeedConfig {
    /// Resolve the feed URL, falling back to `url_file`
    pub fn resolve_url(&self) -> Result<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.trim().to_string());
        }

        let content = std::fs::read_to_string(&self.url_file).map_err(|e| {
            Error::Config(format!(
                "No feed URL configured and {} is unreadable: {}",
                self.url_file, e
            ))
        })?;

        content
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Config(format!("{} is empty", self.url_file)))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Base URL of the booking site
    #[serde(default = "default_venue_url")]
    pub base_url: String,

    /// Group size submitted with every week request
    #[serde(default = "default_group_size")]
    pub group_size: u32,

    /// User-Agent sent to the booking site
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: default_venue_url(),
            group_size: default_group_size(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl VenueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between availability refreshes
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn default_url_file() -> String {
    ".icalURL".to_string()
}

fn default_feed_refresh_secs() -> u64 {
    3600
}

fn default_venue_url() -> String {
    "http://stockholm.roomescapelive.se".to_string()
}

fn default_group_size() -> u32 {
    4
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; WOW64; rv:39.0) Gecko/20100101 Firefox/39.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_poll_interval_secs() -> u64 {
    300
}

impl Config {
    /// Replace `${VAR_NAME}` with the value of the environment variable
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }

            if let Ok(env_value) = std::env::var(&var_name) {
                result.push_str(&env_value);
            }
        }

        result
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load from `./roomwhen.toml` if present, otherwise from the environment only
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Ok(Self::from_env())
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("ROOMWHEN_FEED_URL") {
            self.feed.url = Some(url);
        }
        if let Some(path) = non_empty_env("ROOMWHEN_FEED_URL_FILE") {
            self.feed.url_file = path;
        }
        if let Some(secs) = parsed_env("ROOMWHEN_FEED_REFRESH_SECS") {
            self.feed.refresh_secs = secs;
        }
        if let Some(secs) = parsed_env("ROOMWHEN_FEED_TIMEOUT_SECS") {
            self.feed.request_timeout_secs = secs;
        }

        if let Some(url) = non_empty_env("ROOMWHEN_VENUE_URL") {
            self.venue.base_url = url;
        }
        if let Some(size) = parsed_env("ROOMWHEN_GROUP_SIZE") {
            self.venue.group_size = size;
        }
        if let Some(agent) = non_empty_env("ROOMWHEN_USER_AGENT") {
            self.venue.user_agent = agent;
        }
        if let Some(secs) = parsed_env("ROOMWHEN_REQUEST_TIMEOUT_SECS") {
            self.venue.request_timeout_secs = secs;
        }

        if let Some(secs) = parsed_env("ROOMWHEN_POLL_INTERVAL_SECS") {
            self.poll.interval_secs = secs;
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_env(name).and_then(|v| v.parse().ok())
}
