//! Client configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Values set programmatically on [`ClientConfig`]
//! 2. `FAULTLINE_*` environment variables via [`ClientConfig::from_env`]
//! 3. A JSON file via [`ClientConfig::load_from_file`]
//! 4. Built-in defaults
//!
//! ```json
//! {"ingest_key": "ik_live_123", "base_url": "https://ingest.example.com", "timeout": 3}
//! ```
//!
//! `before_send` cannot come from a file; attach it in code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::breadcrumbs::DEFAULT_MAX_BREADCRUMBS;
use crate::error::ConfigError;
use crate::event::{Event, EventMeta};

/// Hard ceiling for the delivery timeout
pub const MAX_TIMEOUT_SECONDS: u64 = 10;
/// Ceiling for the connect phase
pub const MAX_CONNECT_TIMEOUT_SECONDS: u64 = 5;

pub const ENV_INGEST_KEY: &str = "FAULTLINE_INGEST_KEY";
pub const ENV_BASE_URL: &str = "FAULTLINE_BASE_URL";
pub const ENV_ENVIRONMENT: &str = "FAULTLINE_ENVIRONMENT";
pub const ENV_RELEASE: &str = "FAULTLINE_RELEASE";
pub const ENV_DEBUG: &str = "FAULTLINE_DEBUG";

/// Pre-send filter: return `Ok(None)` to drop the event
pub type BeforeSend = Arc<dyn Fn(Event) -> anyhow::Result<Option<Event>> + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Credential sent with every event; required
    #[serde(default)]
    pub ingest_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_environment")]
    pub environment: Option<String>,

    #[serde(default)]
    pub release: Option<String>,

    #[serde(default = "default_server_name")]
    pub server_name: Option<String>,

    #[serde(default = "default_max_breadcrumbs")]
    pub max_breadcrumbs: usize,

    /// When false every capture returns no id without doing any work
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Verbose diagnostic logging of dropped and failed events
    #[serde(default)]
    pub debug: bool,

    /// Delivery timeout in seconds, capped at [`MAX_TIMEOUT_SECONDS`]
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_seconds: u64,

    #[serde(skip)]
    pub before_send: Option<BeforeSend>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ingest_key: None,
            base_url: default_base_url(),
            environment: default_environment(),
            release: None,
            server_name: default_server_name(),
            max_breadcrumbs: default_max_breadcrumbs(),
            enabled: default_enabled(),
            debug: false,
            timeout_seconds: default_timeout(),
            before_send: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("ingest_key", &self.ingest_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("release", &self.release)
            .field("server_name", &self.server_name)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("enabled", &self.enabled)
            .field("debug", &self.debug)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("before_send", &self.before_send.is_some())
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_environment() -> Option<String> {
    Some(non_empty_env(ENV_ENVIRONMENT).unwrap_or_else(|| "production".to_string()))
}

fn default_server_name() -> Option<String> {
    Some(
        non_empty_env("HOSTNAME")
            .or_else(|| non_empty_env("COMPUTERNAME"))
            .unwrap_or_else(|| "unknown".to_string()),
    )
}

fn default_max_breadcrumbs() -> usize {
    DEFAULT_MAX_BREADCRUMBS
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    5
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ClientConfig {
    /// Defaults plus the given ingest key
    pub fn new(ingest_key: impl Into<String>) -> Self {
        Self {
            ingest_key: Some(ingest_key.into()),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `FAULTLINE_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(key) = non_empty_env(ENV_INGEST_KEY) {
            config.ingest_key = Some(key);
        }
        if let Some(url) = non_empty_env(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(release) = non_empty_env(ENV_RELEASE) {
            config.release = Some(release);
        }
        if let Some(debug) = non_empty_env(ENV_DEBUG) {
            config.debug = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        config
    }

    /// Load a JSON configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_before_send<F>(mut self, filter: F) -> Self
    where
        F: Fn(Event) -> anyhow::Result<Option<Event>> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(filter));
        self
    }

    /// The ingest key, or `MissingIngestKey` when absent or blank
    pub fn require_ingest_key(&self) -> Result<&str, ConfigError> {
        self.ingest_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingIngestKey)
    }

    /// Request timeout, clamped to `1..=MAX_TIMEOUT_SECONDS`
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.clamped_timeout_seconds())
    }

    /// Connect-phase timeout: min(effective timeout, 5s)
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.clamped_timeout_seconds().min(MAX_CONNECT_TIMEOUT_SECONDS))
    }

    /// Log once when `timeout_seconds` falls outside the accepted range
    pub fn warn_if_timeout_clamped(&self) {
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            warn!(
                "Configured timeout_seconds={} exceeds the maximum; using {} seconds",
                self.timeout_seconds, MAX_TIMEOUT_SECONDS
            );
        } else if self.timeout_seconds == 0 {
            warn!("Configured timeout_seconds=0 is too low; using 1 second");
        }
    }

    fn clamped_timeout_seconds(&self) -> u64 {
        self.timeout_seconds.clamp(1, MAX_TIMEOUT_SECONDS)
    }

    /// Endpoint receiving events
    pub fn events_url(&self) -> String {
        format!("{}/api/ingest/v1/events", self.base_url.trim_end_matches('/'))
    }

    pub fn event_meta(&self) -> EventMeta {
        EventMeta {
            environment: self.environment.clone(),
            server_name: self.server_name.clone(),
            release: self.release.clone(),
        }
    }
}
