//! Delivery channels - where validated events are sent
//!
//! The orchestrator only distinguishes success from failure. Implementations
//! classify failures into [`DeliveryError`] variants for diagnostics:
//! - HTTP ingest API (default, `http` feature)
//! - Custom channels supplied by the host (tests, proxies, local sinks)

use crate::error::DeliveryError;
use crate::event::Event;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Trait for event delivery channels
///
/// `send` blocks until the attempt completes or is abandoned.
/// Implementations handle their own timeouts; no retries are expected.
pub trait Transport {
    /// Deliver one event; `Ok(())` means it was accepted
    fn send(&self, event: &Event) -> Result<(), DeliveryError>;

    /// Channel identifier for logging/debugging
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        (**self).send(event)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        (**self).send(event)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Mock channel for testing
#[cfg(test)]
pub struct MockTransport {
    pub sent: std::cell::RefCell<Vec<Event>>,
    pub fail_with_status: Option<u16>,
}

#[cfg(test)]
impl MockTransport {
    pub fn accepting() -> Self {
        Self {
            sent: std::cell::RefCell::new(Vec::new()),
            fail_with_status: None,
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            sent: std::cell::RefCell::new(Vec::new()),
            fail_with_status: Some(status),
        }
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        self.sent.borrow_mut().push(event.clone());
        match self.fail_with_status {
            Some(status) => Err(DeliveryError::Rejected { status }),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
