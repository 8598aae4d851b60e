//! Error types for the capture pipeline
//!
//! Only [`ConfigError`] and [`ReservedKeyError`] ever reach the host
//! application. Everything raised while a capture is in flight is folded
//! into a [`CaptureError`] and contained by the client.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a client
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No ingest key was configured
    #[error("An ingest key is required.\n\nSet `ingest_key` in the client configuration or export FAULTLINE_INGEST_KEY.")]
    MissingIngestKey,

    /// Failed to read a configuration file
    #[error("Failed to read client configuration from {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file
    #[error("Failed to parse client configuration from {path}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// User code tried to write a context key owned by the SDK
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Context key '{key}' is reserved and cannot be set directly")]
pub struct ReservedKeyError {
    pub key: String,
}

impl ReservedKeyError {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Structurally invalid events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Event message is required")]
    EmptyMessage,

    #[error("Invalid level '{0}'; expected one of critical, error, warning, info, debug")]
    InvalidLevel(String),
}

/// Failures reported by a delivery channel
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The ingest key was refused (HTTP 401)
    #[error("Ingest key rejected by server")]
    Unauthorized,

    /// The server refused the payload shape (HTTP 400/422)
    #[error("Server rejected event payload ({status}): {body}")]
    InvalidPayload { status: u16, body: String },

    /// Any other non-202 response
    #[error("Unexpected response status {status}")]
    Rejected { status: u16 },

    /// The request did not complete in time
    #[error("Delivery timed out: {0}")]
    Timeout(String),

    /// Connection or transport level failure
    #[error("Ingest endpoint unreachable: {0}")]
    Unreachable(String),

    /// The event could not be encoded
    #[error("Failed to encode event: {0}")]
    Encode(String),
}

/// Everything that can go wrong inside a single capture call
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Local context rejected: {0}")]
    ReservedKey(#[from] ReservedKeyError),

    #[error("Event failed validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("before_send filter failed: {0}")]
    Filter(String),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Extra hint for failures the operator can act on
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CaptureError::Delivery(DeliveryError::Unauthorized) => {
                Some("check that the configured ingest key is valid for this project")
            }
            CaptureError::Delivery(DeliveryError::InvalidPayload { .. }) => {
                Some("the ingest API refused the event schema; inspect before_send output")
            }
            _ => None,
        }
    }
}

/// Render a caught panic payload as text
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_key_message_names_key() {
        let err = ReservedKeyError::new("frames");
        assert!(err.to_string().contains("'frames'"));
    }

    #[test]
    fn test_hint_only_for_actionable_delivery_errors() {
        let unauthorized = CaptureError::Delivery(DeliveryError::Unauthorized);
        assert!(unauthorized.hint().is_some());

        let rejected = CaptureError::Delivery(DeliveryError::Rejected { status: 500 });
        assert!(rejected.hint().is_none());

        let filter = CaptureError::Filter("boom".into());
        assert!(filter.hint().is_none());
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
