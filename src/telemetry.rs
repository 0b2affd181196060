//! Best-effort telemetry emission.
//!
//! Every method call, wallet callback, and HTTP exchange in the engine emits
//! one event through a [`TelemetrySink`]. Emission is fire-and-forget: a
//! failed beacon POST is logged at debug level and dropped, never retried,
//! and never blocks or fails the payment flow.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use url::Url;

/// Upper bound on a single beacon POST. There is no retry.
pub const BEACON_TIMEOUT: Duration = Duration::from_secs(5);

/// What kind of engine activity an event describes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TelemetryKind {
    /// An inbound API method was invoked.
    MethodCall,
    /// An external collaborator called back into the engine.
    Callback,
    /// One HTTP exchange completed (success or failure).
    HttpRequest,
}

/// One telemetry event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Activity kind.
    pub kind: TelemetryKind,

    /// Wall-clock duration of the activity, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Request URL, for HTTP exchanges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request method, for HTTP exchanges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Response status, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Free-form key/value details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

impl TelemetryEvent {
    fn empty(kind: TelemetryKind) -> Self {
        Self {
            kind,
            duration_ms: None,
            url: None,
            method: None,
            status_code: None,
            values: BTreeMap::new(),
        }
    }

    /// An event describing an inbound API method invocation.
    pub fn method_call(name: &str) -> Self {
        Self::empty(TelemetryKind::MethodCall).with_value("method", name)
    }

    /// An event describing a callback from an external collaborator.
    pub fn callback(name: &str) -> Self {
        Self::empty(TelemetryKind::Callback).with_value("callback", name)
    }

    /// An event describing one completed HTTP exchange.
    pub fn http(duration: Duration, url: &Url, method: &Method, status_code: Option<u16>) -> Self {
        let mut event = Self::empty(TelemetryKind::HttpRequest);
        event.duration_ms = Some(duration.as_millis() as u64);
        event.url = Some(url.to_string());
        event.method = Some(method.to_string());
        event.status_code = status_code;
        event
    }

    /// An event describing an HTTP exchange that failed in transport,
    /// carrying the error description and classification.
    pub fn transport_failure(
        duration: Duration,
        url: &Url,
        method: &Method,
        error: &reqwest::Error,
    ) -> Self {
        let kind = if error.is_timeout() {
            "timeout"
        } else if error.is_connect() {
            "connect"
        } else {
            "transport"
        };
        Self::http(duration, url, method, None)
            .with_value("errorDescription", &error.to_string())
            .with_value("errorKind", kind)
    }

    /// Adds a key/value detail to the event.
    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_owned(), value.to_owned());
        self
    }
}

#[derive(Clone)]
enum Inner {
    Disabled,
    Beacon { client: Client, endpoint: Url },
    Memory(Arc<Mutex<Vec<TelemetryEvent>>>),
}

/// Append-only event sink, safe for concurrent emission from multiple
/// in-flight sessions.
#[derive(Clone)]
pub struct TelemetrySink {
    inner: Inner,
}

impl TelemetrySink {
    /// A sink that drops every event. The default.
    pub fn disabled() -> Self {
        Self {
            inner: Inner::Disabled,
        }
    }

    /// A sink that POSTs each event as JSON to the given beacon endpoint,
    /// one attempt per event.
    pub fn beacon(client: Client, endpoint: Url) -> Self {
        Self {
            inner: Inner::Beacon { client, endpoint },
        }
    }

    /// A sink that records events in memory, for tests and diagnostics.
    pub fn memory() -> Self {
        Self {
            inner: Inner::Memory(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Emits one event. Never blocks and never reports failure.
    pub fn emit(&self, event: TelemetryEvent) {
        match &self.inner {
            Inner::Disabled => {}
            Inner::Beacon { client, endpoint } => {
                let request = client
                    .request(Method::POST, endpoint.clone())
                    .timeout(BEACON_TIMEOUT)
                    .json(&event);
                tokio::spawn(async move {
                    if let Err(err) = request.send().await {
                        tracing::debug!(error = %err, "telemetry beacon dropped");
                    }
                });
            }
            Inner::Memory(events) => {
                if let Ok(mut guard) = events.lock() {
                    guard.push(event);
                }
            }
        }
    }

    /// Events recorded so far by a memory sink; empty for other sinks.
    pub fn recorded(&self) -> Vec<TelemetryEvent> {
        match &self.inner {
            Inner::Memory(events) => events.lock().map(|g| g.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = TelemetrySink::memory();
        sink.emit(TelemetryEvent::method_call("beginPaymentAttempt"));
        sink.emit(TelemetryEvent::callback("walletDismissed"));

        let events = sink.recorded();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, TelemetryKind::MethodCall);
        assert_eq!(events[1].kind, TelemetryKind::Callback);
        assert_eq!(
            events[1].values.get("callback").map(String::as_str),
            Some("walletDismissed")
        );
    }

    #[test]
    fn test_disabled_sink_records_nothing() {
        let sink = TelemetrySink::disabled();
        sink.emit(TelemetryEvent::method_call("abort"));
        assert!(sink.recorded().is_empty());
    }

    #[test]
    fn test_http_event_serialization() {
        let url = Url::parse("https://api.test/payment").unwrap();
        let event = TelemetryEvent::http(Duration::from_millis(42), &url, &Method::POST, Some(204));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "httpRequest");
        assert_eq!(json["durationMs"], 42);
        assert_eq!(json["method"], "POST");
        assert_eq!(json["statusCode"], 204);
        // Empty values map is omitted from the wire.
        assert!(json.get("values").is_none());
    }
}
