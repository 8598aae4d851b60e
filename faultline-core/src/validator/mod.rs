//! Delivery validator - size and schema policy applied before transmission
//!
//! Oversized fields are truncated, never rejected. The only rejections are
//! structural: an empty message. (Levels are a closed enum, so an unknown
//! level cannot reach this point; string input is gated by `Level::from_str`.)

use tracing::debug;

pub mod rules;


use crate::error::ValidationError;
use crate::event::Event;
use rules::*;

/// Maximum message size in bytes
pub const MAX_MESSAGE_BYTES: usize = 10_000;
/// Maximum stack trace size in bytes
pub const MAX_STACK_TRACE_BYTES: usize = 500_000;
/// Maximum serialized context size in bytes
pub const MAX_CONTEXT_BYTES: usize = 256_000;

pub const MESSAGE_TRUNCATION_SUFFIX: &str = "...[truncated]";
pub const STACK_TRACE_TRUNCATION_SUFFIX: &str = "\n...[truncated]";

/// A field shortened or replaced during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub field: &'static str,
    pub original_size: usize,
    pub max_size: usize,
}

/// Trait for event policy rules
pub trait EventRule: Send + Sync {
    /// Check (and possibly shorten) the event in place
    fn apply(&self, event: &mut Event) -> Result<Option<Truncation>, ValidationError>;

    /// Rule identifier
    fn rule_id(&self) -> &'static str;
}

/// Validated event plus the truncations applied to it
#[derive(Debug, Clone)]
pub struct ValidatedEvent {
    pub event: Event,
    pub truncations: Vec<Truncation>,
}

/// Runs every rule over a copy of the event
pub struct EventValidator {
    rules: Vec<Box<dyn EventRule>>,
}

impl Default for EventValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventValidator {
    /// Create validator with the default limits
    pub fn new() -> Self {
        let rules: Vec<Box<dyn EventRule>> = vec![
            Box::new(MessageRule {
                max_bytes: MAX_MESSAGE_BYTES,
            }),
            Box::new(StackTraceRule {
                max_bytes: MAX_STACK_TRACE_BYTES,
            }),
            Box::new(ContextSizeRule {
                max_bytes: MAX_CONTEXT_BYTES,
            }),
        ];

        Self { rules }
    }

    pub fn with_rules(rules: Vec<Box<dyn EventRule>>) -> Self {
        Self { rules }
    }

    /// Validate an event, returning the adjusted copy
    pub fn validate(&self, mut event: Event) -> Result<ValidatedEvent, ValidationError> {
        let mut truncations = Vec::new();

        for rule in &self.rules {
            if let Some(truncation) = rule.apply(&mut event)? {
                debug!(
                    "Rule {} truncated {} ({} > {} bytes)",
                    rule.rule_id(),
                    truncation.field,
                    truncation.original_size,
                    truncation.max_size
                );
                truncations.push(truncation);
            }
        }

        Ok(ValidatedEvent { event, truncations })
    }
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary
pub(crate) fn truncate_to_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
