//! Built-in event rules

use serde_json::{json, Value};

use super::{
    truncate_to_boundary, EventRule, Truncation, MESSAGE_TRUNCATION_SUFFIX,
    STACK_TRACE_TRUNCATION_SUFFIX,
};
use crate::error::ValidationError;
use crate::event::Event;
use crate::scope::ContextMap;

pub const CONTEXT_TRUNCATED_MESSAGE: &str = "Context too large and was truncated";

/// Message must be present; long messages are cut and suffixed
pub struct MessageRule {
    pub max_bytes: usize,
}

impl EventRule for MessageRule {
    fn apply(&self, event: &mut Event) -> Result<Option<Truncation>, ValidationError> {
        if event.message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        let original_size = event.message.len();
        if original_size <= self.max_bytes {
            return Ok(None);
        }

        truncate_to_boundary(&mut event.message, self.max_bytes);
        event.message.push_str(MESSAGE_TRUNCATION_SUFFIX);
        Ok(Some(Truncation {
            field: "message",
            original_size,
            max_size: self.max_bytes,
        }))
    }

    fn rule_id(&self) -> &'static str {
        "message-size"
    }
}

/// Long stack traces are cut and suffixed
pub struct StackTraceRule {
    pub max_bytes: usize,
}

impl EventRule for StackTraceRule {
    fn apply(&self, event: &mut Event) -> Result<Option<Truncation>, ValidationError> {
        let Some(trace) = event.stack_trace.as_mut() else {
            return Ok(None);
        };

        let original_size = trace.len();
        if original_size <= self.max_bytes {
            return Ok(None);
        }

        truncate_to_boundary(trace, self.max_bytes);
        trace.push_str(STACK_TRACE_TRUNCATION_SUFFIX);
        Ok(Some(Truncation {
            field: "stack_trace",
            original_size,
            max_size: self.max_bytes,
        }))
    }

    fn rule_id(&self) -> &'static str {
        "stack-trace-size"
    }
}

/// Oversized context is replaced wholesale by a marker object
pub struct ContextSizeRule {
    pub max_bytes: usize,
}

impl EventRule for ContextSizeRule {
    fn apply(&self, event: &mut Event) -> Result<Option<Truncation>, ValidationError> {
        // An unserializable context is treated as oversized
        let original_size = serde_json::to_vec(&event.context)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX);
        if original_size <= self.max_bytes {
            return Ok(None);
        }

        event.context = context_marker(original_size, self.max_bytes);
        Ok(Some(Truncation {
            field: "context",
            original_size,
            max_size: self.max_bytes,
        }))
    }

    fn rule_id(&self) -> &'static str {
        "context-size"
    }
}

fn context_marker(original_size: usize, max_size: usize) -> ContextMap {
    match json!({
        "_error": CONTEXT_TRUNCATED_MESSAGE,
        "_original_size": original_size,
        "_max_size": max_size,
    }) {
        Value::Object(map) => map,
        _ => ContextMap::new(),
    }
}
