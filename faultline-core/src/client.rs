//! Client - the capture orchestrator.
//!
//! Owns the scope, the breadcrumb trail and the delivery channel, and runs
//! every capture through the same sequence:
//!
//! ```text
//! build event (scope + breadcrumbs + local context)
//!   -> before_send filter   (may rewrite or drop; failures contained)
//!   -> validator            (truncation, empty-message rejection)
//!   -> transport            (one attempt, no retry)
//!   -> event id or None
//! ```
//!
//! ## Capture state
//!
//! Exception captures move the client from `Idle` to `Capturing` through a
//! [`CaptureGuard`]. While the guard is held, further exception captures on
//! the same client return `None` immediately, so a fault raised while
//! building or sending an event cannot loop back into capture. The guard
//! restores `Idle` on drop, covering every exit path including unwinding.
//!
//! A client is single-threaded (`!Sync`). Hosts that share one across
//! request handlers must serialize access themselves.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::breadcrumbs::{Breadcrumb, BreadcrumbTrail};
use crate::config::ClientConfig;
use crate::error::{panic_message, CaptureError, ConfigError, ReservedKeyError};
use crate::event::{generate_event_id, Event, EventSerializer, Fault, Level};
use crate::scope::{ContextMap, Scope};
use crate::transport::Transport;
use crate::validator::EventValidator;

/// Per-client capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// Scoped hold on the `Capturing` state; releases it when dropped
struct CaptureGuard<'a> {
    state: &'a Cell<CaptureState>,
}

impl<'a> CaptureGuard<'a> {
    /// `None` when a capture is already in progress
    fn acquire(state: &'a Cell<CaptureState>) -> Option<Self> {
        if state.get() == CaptureState::Capturing {
            return None;
        }
        state.set(CaptureState::Capturing);
        Some(Self { state })
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.state.set(CaptureState::Idle);
    }
}

pub struct Client {
    config: ClientConfig,
    serializer: EventSerializer,
    validator: EventValidator,
    transport: Box<dyn Transport>,
    scope: RefCell<Scope>,
    breadcrumbs: RefCell<BreadcrumbTrail>,
    state: Cell<CaptureState>,
    last_event_id: RefCell<Option<String>>,
}

impl Client {
    /// Create a client delivering over HTTP to the configured ingest API
    #[cfg(feature = "http")]
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = crate::transport::HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// Create a client delivering through a custom channel
    pub fn with_transport(
        config: ClientConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, ConfigError> {
        config.require_ingest_key()?;

        if config.debug {
            debug!(
                "Faultline client initialized: transport={}, environment={:?}, max_breadcrumbs={}, enabled={}",
                transport.name(),
                config.environment,
                config.max_breadcrumbs,
                config.enabled
            );
        }

        Ok(Self {
            serializer: EventSerializer::new(config.event_meta()),
            validator: EventValidator::new(),
            transport: Box::new(transport),
            scope: RefCell::new(Scope::new()),
            breadcrumbs: RefCell::new(BreadcrumbTrail::new(config.max_breadcrumbs)),
            state: Cell::new(CaptureState::Idle),
            last_event_id: RefCell::new(None),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn capture_state(&self) -> CaptureState {
        self.state.get()
    }

    /// Id of the most recent accepted event
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.borrow().clone()
    }

    // --- Scope & breadcrumbs ---

    pub fn add_breadcrumb(&self, breadcrumb: impl Into<Breadcrumb>) {
        self.breadcrumbs.borrow_mut().add(breadcrumb);
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.breadcrumbs.borrow().get_all()
    }

    pub fn set_context(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), ReservedKeyError> {
        self.scope.borrow_mut().set_context(key, value)
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.scope.borrow_mut().set_tag(key, value);
    }

    pub fn set_tags<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.scope.borrow_mut().set_tags(tags);
    }

    pub fn set_user(&self, user: Option<ContextMap>) {
        self.scope.borrow_mut().set_user(user);
    }

    /// Snapshot of the current scope
    pub fn scope(&self) -> Scope {
        self.scope.borrow().clone()
    }

    /// Reset scope and breadcrumbs
    pub fn clear_scope(&self) {
        self.scope.borrow_mut().clear();
        self.breadcrumbs.borrow_mut().clear();
    }

    // --- Capture ---

    /// Capture a fault at `error` level
    pub fn capture_exception(&self, fault: &Fault, local: Option<&ContextMap>) -> Option<String> {
        self.capture_exception_with_level(fault, Level::Error, local)
    }

    /// Capture a live error, recording the current call stack
    pub fn capture_error<E: Error + 'static>(
        &self,
        error: &E,
        local: Option<&ContextMap>,
    ) -> Option<String> {
        self.capture_fault_with(Level::Error, local, || Cow::Owned(Fault::from_error(error)))
    }

    pub fn capture_exception_with_level(
        &self,
        fault: &Fault,
        level: Level,
        local: Option<&ContextMap>,
    ) -> Option<String> {
        self.capture_fault_with(level, local, || Cow::Borrowed(fault))
    }

    /// Fault path. The fault is only built once the guard is held, inside
    /// the containment boundary.
    fn capture_fault_with<'f, F>(
        &self,
        level: Level,
        local: Option<&ContextMap>,
        fault: F,
    ) -> Option<String>
    where
        F: FnOnce() -> Cow<'f, Fault>,
    {
        if !self.config.enabled {
            return None;
        }

        let Some(_guard) = CaptureGuard::acquire(&self.state) else {
            if self.config.debug {
                debug!("Exception capture already in progress; dropping nested capture");
            }
            return None;
        };

        let result = self.run_contained(|| {
            let fault = fault();
            let scope = self.scope.borrow();
            let breadcrumbs = self.breadcrumbs.borrow().get_all();
            self.serializer
                .serialize_exception(&fault, level, &scope, &breadcrumbs, local)
        });
        self.finish(result)
    }

    /// Capture a plain message. Does not take the capture guard.
    pub fn capture_message(
        &self,
        message: &str,
        level: Level,
        local: Option<&ContextMap>,
    ) -> Option<String> {
        if !self.config.enabled {
            return None;
        }

        let result = self.run_contained(|| {
            let scope = self.scope.borrow();
            let breadcrumbs = self.breadcrumbs.borrow().get_all();
            self.serializer
                .serialize_message(message, level, &scope, &breadcrumbs, local)
        });
        self.finish(result)
    }

    /// Run the pipeline with panics converted to `CaptureError::Internal`
    fn run_contained<F>(&self, build: F) -> Result<Option<String>, CaptureError>
    where
        F: FnOnce() -> Result<Event, ReservedKeyError>,
    {
        match catch_unwind(AssertUnwindSafe(|| self.run_pipeline(build))) {
            Ok(result) => result,
            Err(payload) => Err(CaptureError::Internal(panic_message(payload.as_ref()))),
        }
    }

    fn run_pipeline<F>(&self, build: F) -> Result<Option<String>, CaptureError>
    where
        F: FnOnce() -> Result<Event, ReservedKeyError>,
    {
        let event = build()?;

        let Some(event) = self.apply_before_send(event)? else {
            if self.config.debug {
                debug!("Event dropped by before_send filter");
            }
            return Ok(None);
        };

        let validated = self.validator.validate(event)?;
        if self.config.debug && !validated.truncations.is_empty() {
            let fields: Vec<_> = validated.truncations.iter().map(|t| t.field).collect();
            debug!("Event truncated before delivery: {}", fields.join(", "));
        }

        self.transport.send(&validated.event)?;

        let event_id = generate_event_id();
        if self.config.debug {
            debug!(
                "Event {} delivered via {} ({})",
                event_id,
                self.transport.name(),
                validated.event.level
            );
        }
        Ok(Some(event_id))
    }

    /// Invoke the pre-send filter at most once, containing its failures
    fn apply_before_send(&self, event: Event) -> Result<Option<Event>, CaptureError> {
        let Some(filter) = &self.config.before_send else {
            return Ok(Some(event));
        };

        match catch_unwind(AssertUnwindSafe(|| filter(event))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(CaptureError::Filter(format!("{e:#}"))),
            Err(payload) => Err(CaptureError::Filter(panic_message(payload.as_ref()))),
        }
    }

    fn finish(&self, result: Result<Option<String>, CaptureError>) -> Option<String> {
        match result {
            Ok(Some(event_id)) => {
                *self.last_event_id.borrow_mut() = Some(event_id.clone());
                Some(event_id)
            }
            Ok(None) => None,
            Err(e) => {
                if self.config.debug {
                    match e.hint() {
                        Some(hint) => warn!("Faultline capture failed: {} ({})", e, hint),
                        None => warn!("Faultline capture failed: {}", e),
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::event::StackFrame;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::rc::{Rc, Weak};

    fn config() -> ClientConfig {
        let mut config = ClientConfig::new("ik_test");
        config.environment = Some("test".into());
        config.server_name = Some("unit".into());
        config
    }

    fn client_with(config: ClientConfig) -> (Client, Rc<MockTransport>) {
        let transport = Rc::new(MockTransport::accepting());
        let client = Client::with_transport(config, transport.clone()).unwrap();
        (client, transport)
    }

    fn fault() -> Fault {
        Fault::new("app::Boom", "exploded")
            .at("src/app.rs", 3)
            .with_frames(vec![StackFrame::new("run").at("src/app.rs", 3)])
    }

    #[test]
    fn test_missing_ingest_key_fails_construction() {
        let result = Client::with_transport(ClientConfig::default(), MockTransport::accepting());
        assert!(matches!(result, Err(ConfigError::MissingIngestKey)));
    }

    #[test]
    fn test_capture_exception_delivers_event() {
        let (client, transport) = client_with(config());
        client.add_breadcrumb(Breadcrumb::new("loaded cart"));

        let id = client.capture_exception(&fault(), None).expect("event id");
        assert!(id.starts_with("evt_"));
        assert_eq!(client.last_event_id(), Some(id));

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "exploded");
        assert_eq!(sent[0].level, Level::Error);
        assert_eq!(sent[0].environment.as_deref(), Some("test"));
        assert_eq!(sent[0].context["breadcrumbs"][0]["message"], json!("loaded cart"));
        assert_eq!(client.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn test_disabled_client_does_nothing() {
        let mut config = config();
        config.enabled = false;
        let (client, transport) = client_with(config);

        assert!(client.capture_exception(&fault(), None).is_none());
        assert!(client.capture_message("hi", Level::Info, None).is_none());
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_guard_blocks_nested_exception_capture() {
        let (client, transport) = client_with(config());
        client.state.set(CaptureState::Capturing);

        assert!(client.capture_exception(&fault(), None).is_none());
        assert!(transport.sent.borrow().is_empty());
        // The blocked call must not reset a capture it does not own
        assert_eq!(client.capture_state(), CaptureState::Capturing);
    }

    #[test]
    fn test_message_path_ignores_guard() {
        let (client, transport) = client_with(config());
        client.state.set(CaptureState::Capturing);

        assert!(client.capture_message("still sent", Level::Info, None).is_some());
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    fn test_guard_released_on_drop() {
        let state = Cell::new(CaptureState::Idle);
        {
            let _guard = CaptureGuard::acquire(&state).unwrap();
            assert_eq!(state.get(), CaptureState::Capturing);
            assert!(CaptureGuard::acquire(&state).is_none());
        }
        assert_eq!(state.get(), CaptureState::Idle);
    }

    #[test]
    fn test_filter_can_rewrite_event() {
        let config = config().with_before_send(|mut event| {
            event.message = format!("[filtered] {}", event.message);
            event.context.remove("frames");
            Ok(Some(event))
        });
        let (client, transport) = client_with(config);

        assert!(client.capture_exception(&fault(), None).is_some());
        let sent = transport.sent.borrow();
        assert_eq!(sent[0].message, "[filtered] exploded");
        assert!(!sent[0].context.contains_key("frames"));
    }

    #[test]
    fn test_filter_drop_returns_none() {
        let config = config().with_before_send(|_| Ok(None));
        let (client, transport) = client_with(config);

        assert!(client.capture_message("dropped", Level::Info, None).is_none());
        assert!(transport.sent.borrow().is_empty());
        assert!(client.last_event_id().is_none());
    }

    #[test]
    fn test_filter_panic_contained() {
        let config = config().with_before_send(|_| panic!("filter bug"));
        let (client, transport) = client_with(config);

        assert!(client.capture_exception(&fault(), None).is_none());
        assert!(transport.sent.borrow().is_empty());
        assert_eq!(client.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn test_delivery_failure_returns_none() {
        let transport = Rc::new(MockTransport::rejecting(500));
        let client = Client::with_transport(config(), transport.clone()).unwrap();

        assert!(client.capture_exception(&fault(), None).is_none());
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(client.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn test_validation_failure_returns_none() {
        let (client, transport) = client_with(config());
        assert!(client.capture_message("", Level::Info, None).is_none());
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_reserved_local_key_contained() {
        let (client, transport) = client_with(config());
        let mut local = ContextMap::new();
        local.insert("exception_class".into(), json!("Spoofed"));

        assert!(client.capture_exception(&fault(), Some(&local)).is_none());
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_scope_mutators_surface_reserved_key_error() {
        let (client, _) = client_with(config());
        assert_eq!(
            client.set_context("breadcrumbs", json!([])),
            Err(ReservedKeyError::new("breadcrumbs"))
        );
    }

    #[test]
    fn test_clear_scope_resets_everything() {
        let (client, _) = client_with(config());
        client.set_tag("env", "prod");
        client.set_context("k", 1).unwrap();
        client.add_breadcrumb(Breadcrumb::new("x"));

        client.clear_scope();
        client.clear_scope();
        assert!(client.scope().is_empty());
        assert!(client.breadcrumbs().is_empty());
    }

    /// Transport that tries to capture again while delivering
    struct ReentrantTransport {
        client: RefCell<Weak<Client>>,
        nested_results: RefCell<Vec<Option<String>>>,
    }

    impl Transport for ReentrantTransport {
        fn send(&self, _event: &Event) -> Result<(), DeliveryError> {
            if let Some(client) = self.client.borrow().upgrade() {
                let nested = client.capture_exception(&Fault::new("Nested", "during send"), None);
                self.nested_results.borrow_mut().push(nested);
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "reentrant"
        }
    }

    #[test]
    fn test_capture_during_delivery_is_blocked() {
        let transport = Rc::new(ReentrantTransport {
            client: RefCell::new(Weak::new()),
            nested_results: RefCell::new(Vec::new()),
        });
        let client = Rc::new(Client::with_transport(config(), transport.clone()).unwrap());
        *transport.client.borrow_mut() = Rc::downgrade(&client);

        assert!(client.capture_exception(&fault(), None).is_some());
        assert_eq!(*transport.nested_results.borrow(), vec![None]);
        assert_eq!(client.capture_state(), CaptureState::Idle);

        // A later, independent capture still works
        assert!(client.capture_exception(&fault(), None).is_some());
    }

    /// Error whose `Display` panics
    #[derive(Debug)]
    struct PanickingDisplay;

    impl std::fmt::Display for PanickingDisplay {
        fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            panic!("display exploded");
        }
    }

    impl Error for PanickingDisplay {}

    #[test]
    fn test_capture_error_contains_display_panic() {
        let (client, transport) = client_with(config());

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            client.capture_error(&PanickingDisplay, None)
        }));

        assert!(matches!(outcome, Ok(None)));
        assert_eq!(client.capture_state(), CaptureState::Idle);
        assert!(transport.sent.borrow().is_empty());
        assert!(client.capture_exception(&fault(), None).is_some());
    }

    /// Error that counts how often it is rendered
    #[derive(Debug, Default)]
    struct CountingDisplay {
        renders: Cell<usize>,
    }

    impl std::fmt::Display for CountingDisplay {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.renders.set(self.renders.get() + 1);
            f.write_str("counted")
        }
    }

    impl Error for CountingDisplay {}

    #[test]
    fn test_nested_capture_error_skips_fault_building() {
        let (client, transport) = client_with(config());
        let error = CountingDisplay::default();
        client.state.set(CaptureState::Capturing);

        assert!(client.capture_error(&error, None).is_none());
        assert_eq!(error.renders.get(), 0);
        assert!(transport.sent.borrow().is_empty());

        client.state.set(CaptureState::Idle);
        assert!(client.capture_error(&error, None).is_some());
        assert_eq!(error.renders.get(), 1);
    }

    /// Transport that panics on send
    struct PanickingTransport;

    impl Transport for PanickingTransport {
        fn send(&self, _event: &Event) -> Result<(), DeliveryError> {
            panic!("socket exploded");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[test]
    fn test_internal_panic_contained_and_guard_reset() {
        let client = Client::with_transport(config(), PanickingTransport).unwrap();

        assert!(client.capture_exception(&fault(), None).is_none());
        assert_eq!(client.capture_state(), CaptureState::Idle);
        assert!(client.capture_message("also contained", Level::Info, None).is_none());
    }
}
