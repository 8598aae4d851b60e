//! Event serializer - turns a fault or a message plus ambient state into an
//! [`Event`].
//!
//! Both entry points are pure functions of their inputs apart from the
//! timestamp and reading source files for frame snippets.

use serde_json::{json, Map, Value};
use std::fs;

use super::fault::{Fault, StackFrame};
use super::{utc_timestamp, Event, Level};
use crate::breadcrumbs::Breadcrumb;
use crate::error::ReservedKeyError;
use crate::scope::{is_reserved, ContextMap, Scope};

/// Message used when a fault carries no description
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Source lines shown on each side of the failing line
const SNIPPET_RADIUS: u32 = 3;

/// Path segments marking third-party code. Separators are normalized to `/`
/// before matching.
const VENDOR_MARKERS: [&str; 4] = ["/vendor/", "/.cargo/registry/", "/.cargo/git/", "/rustc/"];

/// Deployment metadata stamped on every event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMeta {
    pub environment: Option<String>,
    pub server_name: Option<String>,
    pub release: Option<String>,
}

/// Builds events from the scope, the breadcrumb list and optional
/// call-local context.
#[derive(Debug, Clone, Default)]
pub struct EventSerializer {
    meta: EventMeta,
}

impl EventSerializer {
    pub fn new(meta: EventMeta) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    /// Fault path
    pub fn serialize_exception(
        &self,
        fault: &Fault,
        level: Level,
        scope: &Scope,
        breadcrumbs: &[Breadcrumb],
        local: Option<&ContextMap>,
    ) -> Result<Event, ReservedKeyError> {
        let message = if fault.message().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            fault.message().to_string()
        };

        let stack_trace = if fault.frames().is_empty() {
            None
        } else {
            Some(format!(
                "{}: {} in {}:{}\n\nStack trace:\n{}",
                fault.type_name(),
                message,
                fault.file().unwrap_or("[unknown]"),
                fault.line().unwrap_or(0),
                fault.trace_text()
            ))
        };

        let (mut system, extra) = partition(scope.merge(local)?);
        system.insert(
            "exception_class".into(),
            Value::String(fault.type_name().to_string()),
        );
        system.insert(
            "frames".into(),
            Value::Array(fault.frames().iter().map(frame_to_value).collect()),
        );
        system
            .entry("queries")
            .or_insert_with(|| Value::Array(Vec::new()));
        attach_breadcrumbs(&mut system, breadcrumbs);

        let mut event = self.assemble(message, level, system, extra);
        event.stack_trace = stack_trace;
        Ok(event)
    }

    /// Message path: the message is taken verbatim and no stack is attached
    pub fn serialize_message(
        &self,
        message: &str,
        level: Level,
        scope: &Scope,
        breadcrumbs: &[Breadcrumb],
        local: Option<&ContextMap>,
    ) -> Result<Event, ReservedKeyError> {
        let (mut system, extra) = partition(scope.merge(local)?);
        attach_breadcrumbs(&mut system, breadcrumbs);
        Ok(self.assemble(message.to_string(), level, system, extra))
    }

    fn assemble(
        &self,
        message: String,
        level: Level,
        context: ContextMap,
        extra: ContextMap,
    ) -> Event {
        Event {
            message,
            level,
            stack_trace: None,
            context,
            extra_context: (!extra.is_empty()).then_some(extra),
            timestamp: utc_timestamp(),
            environment: self.meta.environment.clone(),
            server_name: self.meta.server_name.clone(),
            release: self.meta.release.clone(),
        }
    }
}

/// Split merged context into SDK-managed and user-supplied halves
fn partition(merged: ContextMap) -> (ContextMap, ContextMap) {
    merged.into_iter().partition(|(key, _)| is_reserved(key))
}

fn attach_breadcrumbs(system: &mut ContextMap, breadcrumbs: &[Breadcrumb]) {
    if breadcrumbs.is_empty() {
        return;
    }
    let trail = breadcrumbs
        .iter()
        .map(|b| Value::Object(b.as_map().clone()))
        .collect();
    system.insert("breadcrumbs".into(), Value::Array(trail));
}

fn frame_to_value(frame: &StackFrame) -> Value {
    let mut value = json!({
        "file": frame.file,
        "line": frame.line,
        "function": frame.function,
        "class": frame.class,
        "type": frame.call_type,
        "is_vendor": frame.file.as_deref().is_some_and(is_vendor_path),
    });

    if let (Some(file), Some(line)) = (&frame.file, frame.line) {
        if let Some(snippet) = code_snippet(file, line) {
            value["code_snippet"] = Value::Object(snippet);
        }
    }
    value
}

/// Whether a path points into third-party code
pub fn is_vendor_path(path: &str) -> bool {
    let normalized = format!("/{}", path.replace('\\', "/").trim_start_matches('/'));
    VENDOR_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}

/// Lines around `line` keyed by their 1-based number, or `None` when the
/// file cannot be read or the line is out of range.
fn code_snippet(file: &str, line: u32) -> Option<Map<String, Value>> {
    let source = fs::read_to_string(file).ok()?;
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line as usize > lines.len() {
        return None;
    }

    let start = line.saturating_sub(SNIPPET_RADIUS).max(1);
    let end = (line + SNIPPET_RADIUS).min(lines.len() as u32);
    Some(
        (start..=end)
            .map(|n| {
                (
                    n.to_string(),
                    Value::String(lines[(n - 1) as usize].to_string()),
                )
            })
            .collect(),
    )
}
