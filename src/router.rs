//! Endpoint routing for payment session operations.
//!
//! The router is a pure function from (operation, intent) to an outbound
//! request description: method, normalized URL, body, and the timeout pair
//! governing the executor's retry loop. Body construction is total over the
//! intent vocabulary; intents with no defined body yield none.

use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::errors::{PayError, Result};
use crate::types::{OperationOutputModel, PaymentAttemptInstrument};

/// Default bound on one HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on cumulative retry time since session start.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(20);

/// Extended per-call bound for card attempts and authentication.
pub const EXTENDED_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extended session bound for card attempts and authentication.
pub const EXTENDED_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Screen metadata attached to screen-sensitive risk-scoring bodies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Screen height in points.
    pub height: u32,
    /// Screen width in points.
    pub width: u32,
    /// Color depth in bits.
    pub color_depth: u32,
}

/// Explicit router configuration, passed in at construction.
///
/// Defaults are exposed as named constants; there is no process-wide
/// mutable configuration.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// User agent reported in client fingerprint blocks.
    pub user_agent: String,

    /// Client type reported in fingerprint blocks (e.g. "Native").
    pub client_type: String,

    /// Locale reported as the browser language code.
    pub locale: String,

    /// Timezone offset from UTC in minutes.
    pub time_zone_offset: i32,

    /// Whether the embedding client executes JavaScript.
    pub javascript_enabled: bool,

    /// Screen metadata, when the embedding client has a screen.
    pub screen: Option<ScreenInfo>,

    /// Whether `http://` hrefs are rewritten to `https://` before
    /// dispatch. On by default; turn off only against local development
    /// servers.
    pub upgrade_insecure_hrefs: bool,

    /// Bound on one HTTP call for ordinary intents.
    pub request_timeout: Duration,

    /// Session retry budget for ordinary intents.
    pub session_timeout: Duration,

    /// Bound on one HTTP call for card attempts and authentication.
    pub extended_request_timeout: Duration,

    /// Session retry budget for card attempts and authentication.
    pub extended_session_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("paylink-rs/{}", env!("CARGO_PKG_VERSION")),
            client_type: "Native".to_string(),
            locale: "en-US".to_string(),
            time_zone_offset: 0,
            javascript_enabled: false,
            screen: None,
            upgrade_insecure_hrefs: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            extended_request_timeout: EXTENDED_REQUEST_TIMEOUT,
            extended_session_timeout: EXTENDED_SESSION_TIMEOUT,
        }
    }
}

impl RouterConfig {
    /// Sets the reported user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the reported locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Sets the reported timezone offset in minutes from UTC.
    pub fn with_time_zone_offset(mut self, minutes: i32) -> Self {
        self.time_zone_offset = minutes;
        self
    }

    /// Sets the screen metadata.
    pub fn with_screen(mut self, screen: ScreenInfo) -> Self {
        self.screen = Some(screen);
        self
    }

    /// Overrides the default timeout pair.
    pub fn with_timeouts(mut self, request: Duration, session: Duration) -> Self {
        self.request_timeout = request;
        self.session_timeout = session;
        self
    }

    /// Disables the `http://` to `https://` rewrite, for local
    /// development servers.
    pub fn with_upgrade_insecure_hrefs(mut self, enabled: bool) -> Self {
        self.upgrade_insecure_hrefs = enabled;
        self
    }
}

/// The intent a caller wants to pursue with an operation, carrying the
/// intent-specific body inputs.
#[derive(Clone, Debug)]
pub enum RouterIntent {
    /// Prepare the session for payment attempts.
    PreparePayment,
    /// Start a payment attempt with the given instrument.
    StartPaymentAttempt {
        /// Instrument to attempt with.
        instrument: PaymentAttemptInstrument,
        /// Culture for the attempt (e.g. "sv-SE").
        culture: String,
    },
    /// Create a strong customer authentication.
    CreateAuthentication {
        /// Outcome indicator of the SCA method request ("Y", "N" or "U").
        method_completion_indicator: String,
        /// Culture for the authentication.
        culture: String,
    },
    /// Complete an authentication challenge.
    CompleteAuthentication {
        /// The challenge response returned by the challenge flow.
        challenge_response: String,
    },
    /// Poll the payment state.
    GetPayment,
    /// Expand one payment method's details.
    ExpandMethod {
        /// The method to expand.
        payment_method: String,
    },
    /// Redirect the payer externally.
    RedirectPayer,
    /// Acknowledge a failed attempt.
    AcknowledgeFailedAttempt,
    /// Abort the payment.
    AbortPayment {
        /// Reason reported to the server.
        reason: String,
    },
    /// Route to the telemetry beacon endpoint.
    EventLogging,
    /// View the payment session.
    ViewPayment,
    /// Submit an opaque attempt payload, e.g. a base64 wallet token.
    AttemptPayload {
        /// The base64-encoded payload.
        payment_payload: String,
    },
    /// Customize the session, e.g. enter instrument mode.
    CustomizePayment {
        /// Method to lock the session to, when entering instrument mode.
        payment_method: Option<String>,
        /// Whether instrument mode should be on.
        instrument_mode: Option<bool>,
    },
    /// Report a client-side attempt failure.
    FailPaymentAttempt {
        /// Problem type URI describing the failure.
        problem_type: String,
        /// Optional client error code.
        error_code: Option<String>,
    },
    /// An operation outside the known vocabulary; dispatched with no body.
    Unspecified,
}

/// An outbound request description produced by the router.
#[derive(Clone, Debug)]
pub struct RoutedRequest {
    /// HTTP method.
    pub method: Method,
    /// Normalized HTTPS URL.
    pub url: Url,
    /// JSON body, when the intent defines one.
    pub body: Option<Value>,
    /// Bound on one HTTP call.
    pub request_timeout: Duration,
    /// Bound on cumulative retry time since session start.
    pub session_timeout: Duration,
}

/// Parses and normalizes an operation href.
///
/// `http://` is rewritten to `https://` before dispatch; a malformed href
/// fails fast with [`PayError::InvalidUrl`] before any network call.
pub fn normalize_href(href: &str) -> Result<Url> {
    let mut url = Url::parse(href).map_err(|_| PayError::InvalidUrl(href.to_string()))?;
    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| PayError::InvalidUrl(href.to_string()))?;
    }
    Ok(url)
}

/// Pure router from (operation, intent) to a [`RoutedRequest`].
#[derive(Clone, Debug)]
pub struct EndpointRouter {
    config: RouterConfig,
}

impl EndpointRouter {
    /// Creates a router with the given configuration.
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// The configuration this router was built with.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Builds the outbound request for pursuing `intent` through
    /// `operation`.
    pub fn route(
        &self,
        operation: &OperationOutputModel,
        intent: &RouterIntent,
    ) -> Result<RoutedRequest> {
        let href = operation
            .href
            .as_deref()
            .ok_or_else(|| PayError::InvalidUrl("operation carries no href".to_string()))?;
        let url = if self.config.upgrade_insecure_hrefs {
            normalize_href(href)?
        } else {
            Url::parse(href).map_err(|_| PayError::InvalidUrl(href.to_string()))?
        };
        let method = operation
            .method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or(Method::GET);
        let (request_timeout, session_timeout) = self.timeouts_for(intent);

        Ok(RoutedRequest {
            method,
            url,
            body: self.body_for(intent),
            request_timeout,
            session_timeout,
        })
    }

    /// Per-intent timeout policy. Card attempts and both authentication
    /// steps get the extended pair; everything else the default pair.
    fn timeouts_for(&self, intent: &RouterIntent) -> (Duration, Duration) {
        let extended = match intent {
            RouterIntent::CreateAuthentication { .. }
            | RouterIntent::CompleteAuthentication { .. } => true,
            RouterIntent::StartPaymentAttempt { instrument, .. } => matches!(
                instrument,
                PaymentAttemptInstrument::CreditCard { .. }
                    | PaymentAttemptInstrument::NewCreditCard { .. }
            ),
            _ => false,
        };
        if extended {
            (
                self.config.extended_request_timeout,
                self.config.extended_session_timeout,
            )
        } else {
            (self.config.request_timeout, self.config.session_timeout)
        }
    }

    /// Intent-specific body construction, total over the vocabulary.
    fn body_for(&self, intent: &RouterIntent) -> Option<Value> {
        match intent {
            RouterIntent::PreparePayment => Some(json!({
                "client": self.client_block(false),
                "browser": self.browser_block(),
            })),
            RouterIntent::StartPaymentAttempt { instrument, culture } => {
                let mut body = json!({
                    "culture": culture,
                    "paymentMethod": instrument.payment_method(),
                    "client": self.client_block(false),
                    "browser": self.browser_block(),
                });
                if let Value::Object(map) = &mut body {
                    match instrument {
                        PaymentAttemptInstrument::Swish {
                            msisdn: Some(msisdn),
                        } => {
                            map.insert("msisdn".to_owned(), json!(msisdn));
                        }
                        PaymentAttemptInstrument::Swish { msisdn: None } => {}
                        PaymentAttemptInstrument::CreditCard { prefill } => {
                            if let Some(token) = &prefill.payment_token {
                                map.insert("paymentToken".to_owned(), json!(token));
                            }
                            if let Some(brand) = &prefill.card_brand {
                                map.insert("cardBrand".to_owned(), json!(brand));
                            }
                        }
                        PaymentAttemptInstrument::ApplePay { .. } => {}
                        PaymentAttemptInstrument::NewCreditCard {
                            enable_payment_details_consent,
                        } => {
                            map.insert(
                                "enablePaymentDetailsConsentCheckbox".to_owned(),
                                json!(enable_payment_details_consent),
                            );
                        }
                    }
                }
                Some(body)
            }
            RouterIntent::CreateAuthentication {
                method_completion_indicator,
                culture,
            } => Some(json!({
                "methodCompletionIndicator": method_completion_indicator,
                "culture": culture,
                "client": self.client_block(true),
                "browser": self.browser_block(),
            })),
            RouterIntent::CompleteAuthentication { challenge_response } => Some(json!({
                "cRes": challenge_response,
            })),
            RouterIntent::ExpandMethod { payment_method } => Some(json!({
                "paymentMethod": payment_method,
            })),
            RouterIntent::AbortPayment { reason } => Some(json!({
                "abortReason": reason,
            })),
            RouterIntent::AttemptPayload { payment_payload } => Some(json!({
                "paymentPayload": payment_payload,
            })),
            RouterIntent::CustomizePayment {
                payment_method,
                instrument_mode,
            } => {
                let mut body = json!({});
                if let Value::Object(map) = &mut body {
                    if let Some(method) = payment_method {
                        map.insert("paymentMethod".to_owned(), json!(method));
                    }
                    if let Some(mode) = instrument_mode {
                        map.insert("instrumentMode".to_owned(), json!(mode));
                    }
                }
                Some(body)
            }
            RouterIntent::FailPaymentAttempt {
                problem_type,
                error_code,
            } => {
                let mut body = json!({ "problemType": problem_type });
                if let (Value::Object(map), Some(code)) = (&mut body, error_code) {
                    map.insert("errorCode".to_owned(), json!(code));
                }
                Some(body)
            }
            RouterIntent::GetPayment
            | RouterIntent::RedirectPayer
            | RouterIntent::AcknowledgeFailedAttempt
            | RouterIntent::EventLogging
            | RouterIntent::ViewPayment
            | RouterIntent::Unspecified => None,
        }
    }

    /// Client fingerprint block attached to risk-scored bodies. Screen
    /// fields only appear for screen-sensitive intents.
    fn client_block(&self, screen_sensitive: bool) -> Value {
        let mut block = json!({
            "userAgent": self.config.user_agent,
            "clientType": self.config.client_type,
        });
        if screen_sensitive {
            if let (Value::Object(map), Some(screen)) = (&mut block, &self.config.screen) {
                map.insert("screenHeight".to_owned(), json!(screen.height));
                map.insert("screenWidth".to_owned(), json!(screen.width));
                map.insert("screenColorDepth".to_owned(), json!(screen.color_depth));
            }
        }
        block
    }

    /// Browser metadata block attached to risk-scored bodies.
    fn browser_block(&self) -> Value {
        json!({
            "acceptHeader": "application/json",
            "timeZoneOffset": self.config.time_zone_offset,
            "javascriptEnabled": self.config.javascript_enabled,
            "languageCode": self.config.locale,
        })
    }
}
