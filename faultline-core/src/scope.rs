//! Scope - ambient context, tags and user identity applied to every event.
//!
//! ## Merge precedence
//!
//! ```text
//! global context  <-  local context          (local wins per key)
//! global tags     <-  local.tags             (only when either is non-empty)
//! stored user     <-  local.user             (shallow, local wins per field)
//! ```
//!
//! Keys in [`RESERVED_KEYS`] belong to the SDK's own instrumentation and can
//! never be written through [`Scope::set_context`]. A local context may
//! carry `request` and `queries` (plus `user` and `tags`) but nothing else
//! from the reserved set.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::ReservedKeyError;

/// Context keys owned by the SDK
pub const RESERVED_KEYS: [&str; 5] = [
    "exception_class",
    "frames",
    "queries",
    "request",
    "breadcrumbs",
];

/// Reserved keys a local context is still allowed to supply
const LOCAL_OVERRIDABLE: [&str; 3] = ["user", "request", "queries"];

/// A plain key/value context map
pub type ContextMap = Map<String, Value>;

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    context: ContextMap,
    tags: BTreeMap<String, String>,
    user: Option<ContextMap>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a global context value
    pub fn set_context(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ReservedKeyError> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(ReservedKeyError::new(key));
        }
        self.context.insert(key, value.into());
        Ok(())
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_tags<I, K, V>(&mut self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in tags {
            self.tags.insert(key.into(), value.into());
        }
    }

    /// Replace the stored user wholesale
    pub fn set_user(&mut self, user: Option<ContextMap>) {
        self.user = user;
    }

    pub fn clear(&mut self) {
        self.context.clear();
        self.tags.clear();
        self.user = None;
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn user(&self) -> Option<&ContextMap> {
        self.user.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.tags.is_empty() && self.user.is_none()
    }

    /// Layer a call-local context over the stored scope.
    ///
    /// `tags` and `user` are only present in the result when there is
    /// something to report; callers test for key presence.
    pub fn merge(&self, local: Option<&ContextMap>) -> Result<ContextMap, ReservedKeyError> {
        let empty = ContextMap::new();
        let local = local.unwrap_or(&empty);
        validate_local(local)?;

        let mut merged = self.context.clone();
        for (key, value) in local {
            merged.insert(key.clone(), value.clone());
        }

        let local_tags = local.get("tags").and_then(Value::as_object);
        let has_local_tags = local_tags.is_some_and(|t| !t.is_empty());
        if !self.tags.is_empty() || has_local_tags {
            let mut tags: ContextMap = self
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            if let Some(local_tags) = local_tags {
                for (key, value) in local_tags {
                    tags.insert(key.clone(), value.clone());
                }
            }
            merged.insert("tags".into(), Value::Object(tags));
        } else {
            merged.remove("tags");
        }

        let local_user = local.get("user").and_then(Value::as_object);
        let has_local_user = local_user.is_some_and(|u| !u.is_empty());
        let has_stored_user = self.user.as_ref().is_some_and(|u| !u.is_empty());
        if has_stored_user || has_local_user {
            let mut user = self.user.clone().unwrap_or_default();
            if let Some(local_user) = local_user {
                for (key, value) in local_user {
                    user.insert(key.clone(), value.clone());
                }
            }
            merged.insert("user".into(), Value::Object(user));
        } else {
            merged.remove("user");
        }

        Ok(merged)
    }
}

/// Reject local contexts that try to set SDK-managed keys
pub fn validate_local(local: &ContextMap) -> Result<(), ReservedKeyError> {
    match local
        .keys()
        .find(|key| is_reserved(key) && !LOCAL_OVERRIDABLE.contains(&key.as_str()))
    {
        Some(key) => Err(ReservedKeyError::new(key.clone())),
        None => Ok(()),
    }
}
