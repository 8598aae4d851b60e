//! Faultline core - in-process error and event capture

pub mod breadcrumbs;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod provider;
pub mod scope;
pub mod transport;
pub mod validator;

pub use breadcrumbs::{Breadcrumb, BreadcrumbTrail};
pub use client::{CaptureState, Client};
pub use config::{BeforeSend, ClientConfig};
pub use error::{CaptureError, ConfigError, DeliveryError, ReservedKeyError, ValidationError};
pub use event::{Event, Fault, Level, StackFrame};
pub use provider::{collect_local_context, ContextProvider, StaticContext};
pub use scope::{ContextMap, Scope, RESERVED_KEYS};
pub use transport::Transport;

#[cfg(feature = "http")]
pub use transport::HttpTransport;
