//! Breadcrumb trail - a bounded history of what happened before an event.
//!
//! The trail keeps at most `capacity` entries and drops the oldest first.
//! It lives as long as the client and is shared by every capture.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Default number of breadcrumbs retained per client
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;

const TIMESTAMP_KEY: &str = "timestamp";

/// A single breadcrumb: an arbitrary map with a well-known `timestamp` key
/// (integer seconds since the Unix epoch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Breadcrumb(Map<String, Value>);

impl Breadcrumb {
    /// Create a breadcrumb carrying a `message`
    pub fn new(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("message".into(), Value::String(message.into()));
        Self(map)
    }

    /// Wrap an existing map as-is
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.0
            .insert("category".into(), Value::String(category.into()));
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.0.insert("level".into(), Value::String(level.into()));
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.0.insert("data".into(), Value::Object(data));
        self
    }

    /// Set an explicit timestamp; the trail keeps it untouched
    pub fn with_timestamp(mut self, unix_seconds: i64) -> Self {
        self.0.insert(TIMESTAMP_KEY.into(), Value::from(unix_seconds));
        self
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.0.get(TIMESTAMP_KEY).and_then(Value::as_i64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Breadcrumb {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Fixed-capacity, insertion-ordered breadcrumb store
#[derive(Debug, Clone)]
pub struct BreadcrumbTrail {
    entries: VecDeque<Breadcrumb>,
    capacity: usize,
}

impl Default for BreadcrumbTrail {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BREADCRUMBS)
    }
}

impl BreadcrumbTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_BREADCRUMBS)),
            capacity,
        }
    }

    /// Append a breadcrumb, stamping `timestamp` when it is missing, then
    /// evict from the front until the trail fits its capacity.
    pub fn add(&mut self, breadcrumb: impl Into<Breadcrumb>) {
        let mut breadcrumb = breadcrumb.into();
        if !breadcrumb.0.contains_key(TIMESTAMP_KEY) {
            breadcrumb
                .0
                .insert(TIMESTAMP_KEY.into(), Value::from(Utc::now().timestamp()));
        }

        self.entries.push_back(breadcrumb);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Snapshot of all breadcrumbs, oldest first
    pub fn get_all(&self) -> Vec<Breadcrumb> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Breadcrumb> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
