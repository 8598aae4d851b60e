//! HTTP transport for the ingest API
//!
//! A single blocking POST per event to `<base_url>/api/ingest/v1/events`.
//! Only `202 Accepted` counts as delivered.

use serde::Deserialize;
use tracing::debug;

use super::Transport;
use crate::config::ClientConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::event::Event;

/// Header carrying the ingest credential
pub const INGEST_KEY_HEADER: &str = "X-Ingest-Key";

/// Ingest API transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
    ingest_key: String,
}

/// Informational body of an accepted event
#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    status: Option<String>,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    ///
    /// Timeouts are clamped: request <= 10s, connect <= min(request, 5s).
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let ingest_key = config.require_ingest_key()?.to_string();
        config.warn_if_timeout_clamped();

        let client = reqwest::blocking::Client::builder()
            .timeout(config.effective_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url: config.events_url(),
            ingest_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .header(INGEST_KEY_HEADER, &self.ingest_key)
            .json(event)
            .send()
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();
        classify_status(status, text)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn classify_transport_error(error: reqwest::Error) -> DeliveryError {
    if error.is_builder() {
        DeliveryError::Encode(error.to_string())
    } else if error.is_timeout() {
        DeliveryError::Timeout(error.to_string())
    } else {
        DeliveryError::Unreachable(error.to_string())
    }
}

/// Map an ingest API response onto a delivery result
pub(crate) fn classify_status(status: u16, body: String) -> Result<(), DeliveryError> {
    match status {
        202 => {
            if let Ok(ack) = serde_json::from_str::<IngestResponse>(&body) {
                debug!("Ingest API accepted event (status: {:?})", ack.status);
            }
            Ok(())
        }
        401 => Err(DeliveryError::Unauthorized),
        400 | 422 => Err(DeliveryError::InvalidPayload { status, body }),
        _ => Err(DeliveryError::Rejected { status }),
    }
}
