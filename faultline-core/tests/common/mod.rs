//! Test helper functions for integration tests
//!
//! Shared across test files using the tests/common/ pattern. Not every
//! test binary uses every helper.

#![allow(dead_code)]

use faultline_core::{Client, ClientConfig, DeliveryError, Event, Fault, StackFrame, Transport};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Transport that records every event and accepts or rejects all of them
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: RefCell<Vec<Event>>,
    pub reject: bool,
}

impl RecordingTransport {
    pub fn events(&self) -> Vec<Event> {
        self.sent.borrow().clone()
    }

    pub fn last(&self) -> Event {
        self.sent
            .borrow()
            .last()
            .cloned()
            .expect("at least one delivered event")
    }
}

impl Transport for RecordingTransport {
    fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        self.sent.borrow_mut().push(event.clone());
        if self.reject {
            Err(DeliveryError::Unreachable("recording transport set to reject".into()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Debug-enabled config with deterministic metadata
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("ik_integration");
    config.environment = Some("testing".into());
    config.server_name = Some("ci-runner".into());
    config.release = Some("1.0.0".into());
    config.debug = true;
    config
}

/// Client wired to a recording transport
pub fn recording_client(config: ClientConfig) -> (Client, Rc<RecordingTransport>) {
    init_test_logging();
    let transport = Rc::new(RecordingTransport::default());
    let client = Client::with_transport(config, transport.clone())
        .expect("test config has an ingest key");
    (client, transport)
}

/// A fault with a two-frame stack
pub fn sample_fault(message: &str) -> Fault {
    Fault::new("orders::PaymentError", message)
        .at("src/orders/payment.rs", 57)
        .with_frames(vec![
            StackFrame::new("charge")
                .at("src/orders/payment.rs", 57)
                .in_class("orders::Payment", "::"),
            StackFrame::new("handle").at("src/http/handler.rs", 12),
        ])
}
