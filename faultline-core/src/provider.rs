//! Ambient context providers
//!
//! Hosts extract request, user or job metadata with framework-specific
//! code and hand the core a plain map. This trait is the seam for that
//! extraction; the client never calls providers itself.

use serde_json::Value;
use tracing::debug;

use crate::scope::ContextMap;

/// Something that can describe the current ambient context
pub trait ContextProvider {
    /// Extract the current context as a key/value map
    fn extract(&self) -> ContextMap;

    /// Provider identifier for logging/debugging
    fn name(&self) -> &'static str;
}

/// A provider backed by a fixed map
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    values: ContextMap,
}

impl StaticContext {
    pub fn new(values: ContextMap) -> Self {
        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ContextProvider for StaticContext {
    fn extract(&self) -> ContextMap {
        self.values.clone()
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Fold providers into one local-context map; later providers win per key
pub fn collect_local_context(providers: &[&dyn ContextProvider]) -> ContextMap {
    let mut merged = ContextMap::new();
    for provider in providers {
        let extracted = provider.extract();
        debug!(
            "Context provider {} supplied {} keys",
            provider.name(),
            extracted.len()
        );
        merged.extend(extracted);
    }
    merged
}
