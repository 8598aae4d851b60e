//! HTTP delivery against a local one-shot ingest stub

#![cfg(feature = "http")]

mod common;

use common::{init_test_logging, sample_fault, test_config};
use faultline_core::{Client, DeliveryError, Event, HttpTransport, Level, Transport};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

/// A request as seen by the stub
struct Received {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Received {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Accept one connection, answer with `status`, return what was sent
fn serve_once(status: u16, reason: &str, body: &str) -> (String, JoinHandle<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut raw = vec![0u8; length];
        reader.read_exact(&mut raw).unwrap();

        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();

        Received {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: serde_json::from_slice(&raw).unwrap_or(Value::Null),
        }
    });

    (base_url, handle)
}

fn sample_event() -> Event {
    Event::new("checkout failed", Level::Error)
}

#[test]
fn test_accepted_event_posts_json_with_ingest_key() {
    init_test_logging();
    let (base_url, stub) = serve_once(202, "Accepted", r#"{"status":"queued"}"#);

    let mut config = test_config();
    config.base_url = base_url;
    let client = Client::new(config).unwrap();
    client.set_tag("region", "eu-west-1");

    let id = client.capture_exception(&sample_fault("card declined"), None);
    assert!(id.is_some());

    let received = stub.join().unwrap();
    assert_eq!(received.request_line, "POST /api/ingest/v1/events HTTP/1.1");
    assert_eq!(received.header("x-ingest-key"), Some("ik_integration"));
    assert!(received
        .header("content-type")
        .is_some_and(|v| v.starts_with("application/json")));

    assert_eq!(received.body["message"], json!("card declined"));
    assert_eq!(received.body["level"], json!("error"));
    assert_eq!(received.body["environment"], json!("testing"));
    assert_eq!(
        received.body["context"]["exception_class"],
        json!("orders::PaymentError")
    );
    assert_eq!(
        received.body["extra_context"]["tags"],
        json!({"region": "eu-west-1"})
    );
}

#[test]
fn test_ok_status_is_not_acceptance() {
    init_test_logging();
    let (base_url, stub) = serve_once(200, "OK", "{}");

    let mut config = test_config();
    config.base_url = base_url;
    let transport = HttpTransport::new(&config).unwrap();

    let result = transport.send(&sample_event());
    stub.join().unwrap();
    assert!(matches!(result, Err(DeliveryError::Rejected { status: 200 })));
}

#[test]
fn test_unauthorized_maps_to_error() {
    init_test_logging();
    let (base_url, stub) = serve_once(401, "Unauthorized", r#"{"error":"bad key"}"#);

    let mut config = test_config();
    config.base_url = base_url;
    let transport = HttpTransport::new(&config).unwrap();

    let result = transport.send(&sample_event());
    stub.join().unwrap();
    assert!(matches!(result, Err(DeliveryError::Unauthorized)));
}

#[test]
fn test_unprocessable_keeps_response_body() {
    init_test_logging();
    let (base_url, stub) = serve_once(422, "Unprocessable Entity", r#"{"error":"level"}"#);

    let mut config = test_config();
    config.base_url = base_url;
    let transport = HttpTransport::new(&config).unwrap();

    match transport.send(&sample_event()) {
        Err(DeliveryError::InvalidPayload { status, body }) => {
            assert_eq!(status, 422);
            assert!(body.contains("level"));
        }
        other => panic!("expected InvalidPayload, got {other:?}"),
    }
    stub.join().unwrap();
}

#[test]
fn test_server_error_returns_none_from_capture() {
    init_test_logging();
    let (base_url, stub) = serve_once(500, "Internal Server Error", "{}");

    let mut config = test_config();
    config.base_url = base_url;
    let client = Client::new(config).unwrap();

    assert!(client.capture_message("lost", Level::Info, None).is_none());
    stub.join().unwrap();
    assert!(client.last_event_id().is_none());
}
