//! Resilient request execution.
//!
//! The executor performs one logical HTTP exchange at a time: it sends the
//! routed request, classifies the outcome, and retries transient server
//! errors on a fixed delay until the session-wide budget runs out. The
//! budget is measured from one fixed origin (the session clock), never
//! re-armed per request.
//!
//! Every completed exchange, success or failure, emits exactly one
//! telemetry event; emission never delays returning the result.

use std::time::{Duration, Instant};

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::errors::{PayError, Result};
use crate::router::RoutedRequest;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::ProblemDetails;

/// Fixed delay between retries of a transient failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Read-only clock capturing when a payment session started.
///
/// One clock is created per session and threaded through every
/// route/execute pair, so the retry budget is cumulative wall-clock time
/// since session start.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    /// Starts the clock now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Wall-clock time elapsed since session start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends routed requests and classifies their outcomes.
pub struct RequestExecutor {
    client: Client,
    telemetry: TelemetrySink,
    automatic_retry: bool,
}

impl RequestExecutor {
    /// Creates an executor emitting to the given telemetry sink.
    pub fn new(telemetry: TelemetrySink) -> Self {
        Self {
            client: Client::new(),
            telemetry,
            automatic_retry: false,
        }
    }

    /// Uses a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Also retries transport-level failures (connection reset, timeout)
    /// within the session budget. Off by default.
    pub fn with_automatic_retry(mut self, enabled: bool) -> Self {
        self.automatic_retry = enabled;
        self
    }

    /// Executes one logical request, retrying transient failures until the
    /// session budget is exhausted.
    ///
    /// Success with an empty or malformed body resolves to `Ok(None)`;
    /// callers must tolerate a successful-but-empty outcome.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        routed: &RoutedRequest,
        clock: &SessionClock,
    ) -> Result<Option<T>> {
        loop {
            let attempt_started = Instant::now();
            let mut builder = self
                .client
                .request(routed.method.clone(), routed.url.clone())
                .header(header::ACCEPT, "application/json")
                .header(header::CONTENT_TYPE, "application/json")
                .timeout(routed.request_timeout);
            if let Some(body) = &routed.body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    self.telemetry.emit(TelemetryEvent::http(
                        attempt_started.elapsed(),
                        &routed.url,
                        &routed.method,
                        Some(status.as_u16()),
                    ));

                    if (200..=204).contains(&status.as_u16()) {
                        return Ok(decode_success_body(response.text().await.ok()));
                    }

                    if status.is_server_error() {
                        if clock.elapsed() < routed.session_timeout {
                            tracing::debug!(
                                status = status.as_u16(),
                                url = %routed.url,
                                "transient server error, retrying"
                            );
                            tokio::time::sleep(RETRY_DELAY).await;
                            continue;
                        }
                        tracing::warn!(
                            status = status.as_u16(),
                            url = %routed.url,
                            "session retry budget exhausted"
                        );
                        return Err(PayError::ServerStatus(status.as_u16()));
                    }

                    return Err(classify_failure(status, response.text().await.ok().as_deref()));
                }
                Err(err) => {
                    self.telemetry.emit(TelemetryEvent::transport_failure(
                        attempt_started.elapsed(),
                        &routed.url,
                        &routed.method,
                        &err,
                    ));
                    if self.automatic_retry && clock.elapsed() < routed.session_timeout {
                        tracing::debug!(error = %err, "transport failure, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                    return Err(PayError::Http(err));
                }
            }
        }
    }
}

/// Decodes a 2xx body, downgrading absent or malformed JSON to "no payload".
fn decode_success_body<T: DeserializeOwned>(body: Option<String>) -> Option<T> {
    let text = body?;
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::debug!(error = %err, "malformed success body, treating as empty");
            None
        }
    }
}

/// Maps a non-2xx, non-5xx response into the error taxonomy.
///
/// 409 is special-cased: the operation-not-allowed problem type is benign
/// and expected (e.g. aborting a payment that already completed); any other
/// conflict is a generic operation error.
fn classify_failure(status: StatusCode, body: Option<&str>) -> PayError {
    let problem = body.and_then(|text| serde_json::from_str::<ProblemDetails>(text).ok());

    if status == StatusCode::CONFLICT {
        return match problem {
            Some(p) if p.is_operation_not_allowed() => {
                PayError::OperationNotAllowed(Some(Box::new(p)))
            }
            other => PayError::GenericOperationError(other.map(Box::new)),
        };
    }

    match problem {
        Some(p) => PayError::Problem(Box::new(p)),
        None => PayError::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OPERATION_NOT_ALLOWED_TYPE;

    #[test]
    fn test_conflict_classification() {
        let not_allowed = format!(
            r#"{{"type": "{}", "status": 409}}"#,
            OPERATION_NOT_ALLOWED_TYPE
        );
        let err = classify_failure(StatusCode::CONFLICT, Some(&not_allowed));
        assert!(matches!(err, PayError::OperationNotAllowed(Some(_))));

        let other = r#"{"type": "https://api.test/problems/stale-state", "status": 409}"#;
        let err = classify_failure(StatusCode::CONFLICT, Some(other));
        assert!(matches!(err, PayError::GenericOperationError(Some(_))));

        // An undecodable 409 body is still a generic operation error.
        let err = classify_failure(StatusCode::CONFLICT, Some("not json"));
        assert!(matches!(err, PayError::GenericOperationError(None)));
    }

    #[test]
    fn test_client_error_classification() {
        let problem = r#"{"type": "https://api.test/problems/input", "title": "Bad input", "status": 400}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, Some(problem));
        match err {
            PayError::Problem(p) => assert_eq!(p.title.as_deref(), Some("Bad input")),
            other => panic!("expected Problem, got {:?}", other),
        }

        let err = classify_failure(StatusCode::BAD_REQUEST, Some("<html>"));
        assert!(matches!(err, PayError::Unknown));

        let err = classify_failure(StatusCode::NOT_FOUND, None);
        assert!(matches!(err, PayError::Unknown));
    }

    #[test]
    fn test_success_body_downgrade() {
        let decoded: Option<serde_json::Value> =
            decode_success_body(Some("{\"ok\": true}".to_string()));
        assert!(decoded.is_some());

        let decoded: Option<serde_json::Value> = decode_success_body(Some("not json".to_string()));
        assert!(decoded.is_none());

        let decoded: Option<serde_json::Value> = decode_success_body(Some("  ".to_string()));
        assert!(decoded.is_none());

        let decoded: Option<serde_json::Value> = decode_success_body(None);
        assert!(decoded.is_none());
    }

    #[test]
    fn test_session_clock_monotonic() {
        let clock = SessionClock::new();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }
}
