//! Event record sent to the ingest API, plus the values it is built from.
//!
//! ```text
//! Event
//!   ├── message, level, timestamp
//!   ├── stack_trace            (fault path only, absent for empty stacks)
//!   ├── context                (SDK-managed keys + breadcrumbs)
//!   ├── extra_context          (every other merged key, omitted when empty)
//!   └── environment, server_name, release
//! ```
//!
//! `context` and `extra_context` never share a key.

pub mod fault;
pub mod serializer;

pub use fault::{Fault, StackFrame};
pub use serializer::{EventMeta, EventSerializer};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::scope::ContextMap;

/// Severity of a captured event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Critical,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Info,
        Level::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidLevel(s.to_string()))
    }
}

/// Outbound event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub message: String,

    pub level: Level,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// SDK-managed context; always serialized as an object
    #[serde(default)]
    pub context: ContextMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_context: Option<ContextMap>,

    /// UTC, second precision (`YYYY-MM-DDTHH:MM:SSZ`)
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl Event {
    /// Bare event with the current timestamp and no context
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self {
            message: message.into(),
            level,
            stack_trace: None,
            context: ContextMap::new(),
            extra_context: None,
            timestamp: utc_timestamp(),
            environment: None,
            server_name: None,
            release: None,
        }
    }
}

/// Current time as `YYYY-MM-DDTHH:MM:SSZ`
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Synthesize a local event id: `evt_<unix-seconds>_<16 hex chars>`
pub fn generate_event_id() -> String {
    let uuid = Uuid::new_v4();
    format!(
        "evt_{}_{}",
        Utc::now().timestamp(),
        hex::encode(&uuid.as_bytes()[8..16])
    )
}
