//! Core type definitions for the payment negotiation protocol.
//!
//! This module contains the wire model of a payment session: operations and
//! their tasks, payment methods with prefill data, and the problem details
//! shape returned for failed operations. Every response from the server is
//! self-describing, so these types also carry the prioritization logic that
//! answers "what can the client legally do next".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{distant_past, iso8601_sentinel};

/// Problem `type` URI the server uses for the benign "operation not allowed"
/// conflict, e.g. aborting a payment that already completed.
pub const OPERATION_NOT_ALLOWED_TYPE: &str =
    "https://api.payex.com/psp/errordetail/problems/operationnotallowed";

/// Semantic purpose of a task attached to an operation.
///
/// Unrecognized server values round-trip losslessly through the `Unknown`
/// variant instead of failing the decode.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum TaskRel {
    /// Strong customer authentication method request.
    ScaMethodRequest,
    /// Strong customer authentication browser redirect.
    ScaRedirect,
    /// Hand-off to an external client application (e.g. a bank app).
    LaunchClientApp,
    /// Hand-off to a native wallet SDK (tokenized payment).
    WalletSdk,
    /// A rel this client version does not recognize, preserved verbatim.
    Unknown(String),
}

impl TaskRel {
    /// The wire string for this rel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ScaMethodRequest => "sca-method-request",
            Self::ScaRedirect => "sca-redirect",
            Self::LaunchClientApp => "launch-client-app",
            Self::WalletSdk => "wallet-sdk",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for TaskRel {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "sca-method-request" => Self::ScaMethodRequest,
            "sca-redirect" => Self::ScaRedirect,
            "launch-client-app" => Self::LaunchClientApp,
            "wallet-sdk" => Self::WalletSdk,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<TaskRel> for String {
    fn from(rel: TaskRel) -> Self {
        rel.as_str().to_owned()
    }
}

/// Semantic purpose of an operation offered by the server.
///
/// Same closed-with-escape-hatch pattern as [`TaskRel`], over the larger
/// operation vocabulary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum OperationRel {
    /// Expand the details of one payment method.
    ExpandMethod,
    /// Start a payment attempt with a chosen instrument.
    StartPaymentAttempt,
    /// Create a strong customer authentication.
    CreateAuthentication,
    /// Complete a strong customer authentication challenge.
    CompleteAuthentication,
    /// Poll the current payment state.
    GetPayment,
    /// Prepare the payment session for attempts.
    PreparePayment,
    /// Redirect the payer to an external page.
    RedirectPayer,
    /// Acknowledge a failed payment attempt.
    AcknowledgeFailedAttempt,
    /// Abort the payment.
    AbortPayment,
    /// Endpoint for telemetry beacon events.
    EventLogging,
    /// View the payment session.
    ViewPayment,
    /// Submit an opaque attempt payload (e.g. a wallet token).
    AttemptPayload,
    /// Customize the payment session (e.g. enter instrument mode).
    CustomizePayment,
    /// Report a client-side attempt failure.
    FailPaymentAttempt,
    /// A rel this client version does not recognize, preserved verbatim.
    Unknown(String),
}

impl OperationRel {
    /// The wire string for this rel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ExpandMethod => "expand-method",
            Self::StartPaymentAttempt => "start-payment-attempt",
            Self::CreateAuthentication => "create-authentication",
            Self::CompleteAuthentication => "complete-authentication",
            Self::GetPayment => "get-payment",
            Self::PreparePayment => "prepare-payment",
            Self::RedirectPayer => "redirect-payer",
            Self::AcknowledgeFailedAttempt => "acknowledge-failed-attempt",
            Self::AbortPayment => "abort-payment",
            Self::EventLogging => "event-logging",
            Self::ViewPayment => "view-payment",
            Self::AttemptPayload => "attempt-payload",
            Self::CustomizePayment => "customize-payment",
            Self::FailPaymentAttempt => "fail-payment-attempt",
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether this rel is part of the known vocabulary.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for OperationRel {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "expand-method" => Self::ExpandMethod,
            "start-payment-attempt" => Self::StartPaymentAttempt,
            "create-authentication" => Self::CreateAuthentication,
            "complete-authentication" => Self::CompleteAuthentication,
            "get-payment" => Self::GetPayment,
            "prepare-payment" => Self::PreparePayment,
            "redirect-payer" => Self::RedirectPayer,
            "acknowledge-failed-attempt" => Self::AcknowledgeFailedAttempt,
            "abort-payment" => Self::AbortPayment,
            "event-logging" => Self::EventLogging,
            "view-payment" => Self::ViewPayment,
            "attempt-payload" => Self::AttemptPayload,
            "customize-payment" => Self::CustomizePayment,
            "fail-payment-attempt" => Self::FailPaymentAttempt,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<OperationRel> for String {
    fn from(rel: OperationRel) -> Self {
        rel.as_str().to_owned()
    }
}

/// A named value a task expects as input, either a single string or a
/// string array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    /// Name the value is looked up by.
    pub name: String,

    /// Optional wire type annotation (e.g. "string").
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    /// The value itself, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ExpectationValue>,
}

/// The heterogeneous value of an [`Expectation`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExpectationValue {
    /// A single string value.
    Single(String),
    /// An array of string values.
    Many(Vec<String>),
}

/// A sub-action attached to an operation, describing an SCA, redirect, or
/// wallet step with named expectation parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationTask {
    /// Semantic purpose of this task.
    pub rel: TaskRel,

    /// Target URL, when the task is dispatched over HTTP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    /// HTTP method for the dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Content type of the dispatch body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Ordered list of named input values. Lookup is by name, first match
    /// wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expects: Vec<Expectation>,
}

impl IntegrationTask {
    /// Looks up a single-string expectation by name (first match).
    pub fn expect_string(&self, name: &str) -> Option<&str> {
        match self.expects.iter().find(|e| e.name == name)?.value.as_ref()? {
            ExpectationValue::Single(s) => Some(s.as_str()),
            ExpectationValue::Many(_) => None,
        }
    }

    /// Looks up a string-array expectation by name (first match).
    pub fn expect_string_array(&self, name: &str) -> Option<&[String]> {
        match self.expects.iter().find(|e| e.name == name)?.value.as_ref()? {
            ExpectationValue::Many(v) => Some(v.as_slice()),
            ExpectationValue::Single(_) => None,
        }
    }
}

/// One legal next operation offered by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutputModel {
    /// Semantic purpose of this operation.
    pub rel: OperationRel,

    /// Target URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    /// HTTP method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Server hint that this operation is the single recommended
    /// continuation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<bool>,

    /// Sub-actions attached to this operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<IntegrationTask>,

    /// Input values this operation expects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expects: Vec<Expectation>,
}

impl OperationOutputModel {
    /// Creates a minimal operation with the given rel, href and method.
    pub fn new(rel: OperationRel, href: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            rel,
            href: Some(href.into()),
            method: Some(method.into()),
            next: None,
            tasks: Vec::new(),
            expects: Vec::new(),
        }
    }

    /// Finds the first task with the given rel.
    pub fn find_task(&self, rel: &TaskRel) -> Option<&IntegrationTask> {
        self.tasks.iter().find(|t| &t.rel == rel)
    }
}

/// Swish prefill data carried by the session model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwishPrefill {
    /// Prefill ordering rank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,

    /// The payer's phone number.
    pub msisdn: String,
}

/// Stored-card prefill data carried by the session model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardPrefill {
    /// Prefill ordering rank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,

    /// Token identifying the stored card.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_token: Option<String>,

    /// Card brand (e.g. "Visa").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<String>,

    /// Masked PAN for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_pan: Option<String>,

    /// Card expiry. Unparsable wire dates decode to the distant-past
    /// sentinel, which means "unknown", never a real date.
    #[serde(with = "iso8601_sentinel", default = "distant_past")]
    pub expiry_date: DateTime<Utc>,
}

/// The Swish payment method entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwishMethod {
    /// Known payer numbers for prefill.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefills: Vec<SwishPrefill>,

    /// Operations offered for this method.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationOutputModel>,
}

/// The credit card payment method entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardMethod {
    /// Stored cards for prefill.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefills: Vec<CreditCardPrefill>,

    /// Operations offered for this method.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationOutputModel>,
}

/// The Apple Pay payment method entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplePayMethod {
    /// Card brands accepted through the wallet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub card_brands: Vec<String>,

    /// Operations offered for this method.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationOutputModel>,
}

/// A payment method available in the session, discriminated on the wire by
/// its `instrument` field.
///
/// Unknown instruments are preserved with their raw discriminator and still
/// surface their operations, so forward-compatible server rollouts never
/// break the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentMethod {
    /// Swish (bank app) payments.
    Swish(SwishMethod),
    /// Card payments.
    CreditCard(CreditCardMethod),
    /// Apple Pay wallet payments.
    ApplePay(ApplePayMethod),
    /// An instrument this client version does not recognize.
    Unknown {
        /// The raw `instrument` discriminator.
        instrument: String,
        /// Operations offered for this method, when decodable.
        operations: Vec<OperationOutputModel>,
    },
}

impl PaymentMethod {
    /// The wire `instrument` discriminator for this method.
    pub fn instrument(&self) -> &str {
        match self {
            Self::Swish(_) => "Swish",
            Self::CreditCard(_) => "CreditCard",
            Self::ApplePay(_) => "ApplePay",
            Self::Unknown { instrument, .. } => instrument,
        }
    }

    /// Operations offered for this method.
    pub fn operations(&self) -> &[OperationOutputModel] {
        match self {
            Self::Swish(m) => &m.operations,
            Self::CreditCard(m) => &m.operations,
            Self::ApplePay(m) => &m.operations,
            Self::Unknown { operations, .. } => operations,
        }
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let (tag, value) = match self {
            Self::Swish(m) => ("Swish", serde_json::to_value(m)),
            Self::CreditCard(m) => ("CreditCard", serde_json::to_value(m)),
            Self::ApplePay(m) => ("ApplePay", serde_json::to_value(m)),
            Self::Unknown {
                instrument,
                operations,
            } => (
                instrument.as_str(),
                serde_json::to_value(serde_json::json!({ "operations": operations })),
            ),
        };
        let mut value = value.map_err(serde::ser::Error::custom)?;
        if let Value::Object(map) = &mut value {
            map.insert("instrument".to_owned(), Value::String(tag.to_owned()));
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let instrument = value
            .get("instrument")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match instrument.as_str() {
            "Swish" => serde_json::from_value(value)
                .map(Self::Swish)
                .map_err(de::Error::custom),
            "CreditCard" => serde_json::from_value(value)
                .map(Self::CreditCard)
                .map_err(de::Error::custom),
            "ApplePay" => serde_json::from_value(value)
                .map(Self::ApplePay)
                .map_err(de::Error::custom),
            _ => {
                let operations = value
                    .get("operations")
                    .and_then(|ops| serde_json::from_value(ops.clone()).ok())
                    .unwrap_or_default();
                Ok(Self::Unknown {
                    instrument,
                    operations,
                })
            }
        }
    }
}

/// URLs configured for the payment session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Urls {
    /// Origins the session may be hosted under.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_urls: Vec<String>,

    /// Where the payer lands after completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_url: Option<String>,

    /// Where the payer lands after cancelling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,

    /// Url used to resume the payment from an external app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

/// The payment session state as reported by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionModel {
    /// Culture/locale of the session (e.g. "sv-SE").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,

    /// Payment methods available in this session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<PaymentMethod>,

    /// Session URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Urls>,

    /// The method the session is locked to while in instrument mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_mode_payment_method: Option<String>,

    /// When the session last changed. Decodes to the distant-past sentinel
    /// when absent or unparsable.
    #[serde(with = "iso8601_sentinel", default = "distant_past")]
    pub updated: DateTime<Utc>,
}

impl PaymentSessionModel {
    /// All operations reachable from any method, flattened into one
    /// ordered sequence de-duplicated by equality.
    pub fn all_method_operations(&self) -> Vec<&OperationOutputModel> {
        let mut out: Vec<&OperationOutputModel> = Vec::new();
        for method in &self.methods {
            for op in method.operations() {
                if !out.contains(&op) {
                    out.push(op);
                }
            }
        }
        out
    }
}

/// A structured error object returned by the API describing why an
/// operation failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// Problem type URI.
    #[serde(rename = "type")]
    pub problem_type: String,

    /// Short human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// HTTP status the problem was delivered with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Longer human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The single operation the server recommends to recover, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationOutputModel>,
}

impl ProblemDetails {
    /// Whether this problem is the benign operation-not-allowed conflict.
    pub fn is_operation_not_allowed(&self) -> bool {
        self.problem_type
            .eq_ignore_ascii_case(OPERATION_NOT_ALLOWED_TYPE)
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({})", title, self.problem_type),
            None => write!(f, "{}", self.problem_type),
        }
    }
}

/// Top-level response body of a payment session exchange.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutputModel {
    /// The session state.
    pub payment_session: PaymentSessionModel,

    /// Operations offered at the top level.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationOutputModel>,

    /// Problem attached to the response, when the last operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemDetails>,
}

impl PaymentOutputModel {
    /// The authoritative "what can I do now" answer.
    ///
    /// If the attached problem names a recovery operation with a known rel,
    /// that operation is the entire prioritized set. Otherwise the set is
    /// the top-level operations unioned with every method's operations,
    /// de-duplicated, with unknown rels dropped; if any remaining entry
    /// carries the `next` hint, the set narrows to those entries.
    ///
    /// Callers must never invent alternative prioritization.
    pub fn prioritised_operations(&self) -> Vec<&OperationOutputModel> {
        if let Some(op) = self.problem.as_ref().and_then(|p| p.operation.as_ref()) {
            if op.rel.is_known() {
                return vec![op];
            }
        }

        let mut out: Vec<&OperationOutputModel> = Vec::new();
        for op in self
            .operations
            .iter()
            .chain(self.payment_session.all_method_operations())
        {
            if !op.rel.is_known() {
                continue;
            }
            if !out.contains(&op) {
                out.push(op);
            }
        }
        if out.iter().any(|op| op.next == Some(true)) {
            out.retain(|op| op.next == Some(true));
        }
        out
    }

    /// Finds the first prioritized operation with the given rel.
    pub fn find_operation(&self, rel: &OperationRel) -> Option<&OperationOutputModel> {
        self.prioritised_operations()
            .into_iter()
            .find(|op| &op.rel == rel)
    }
}

/// Client-side intent describing which instrument to attempt a payment with.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentAttemptInstrument {
    /// Pay with Swish, optionally prefilling the payer's number.
    Swish {
        /// The payer's phone number, when known.
        msisdn: Option<String>,
    },
    /// Pay with a stored card.
    CreditCard {
        /// The stored-card prefill to pay with.
        prefill: CreditCardPrefill,
    },
    /// Pay with Apple Pay.
    ApplePay {
        /// Merchant identifier registered with the wallet provider.
        merchant_identifier: String,
    },
    /// Pay with a new card entered by the payer.
    NewCreditCard {
        /// Whether to offer a consent checkbox for storing the card.
        enable_payment_details_consent: bool,
    },
}

impl PaymentAttemptInstrument {
    /// The `paymentMethod` wire string for this instrument.
    pub fn payment_method(&self) -> &'static str {
        match self {
            Self::Swish { .. } => "Swish",
            Self::CreditCard { .. } | Self::NewCreditCard { .. } => "CreditCard",
            Self::ApplePay { .. } => "ApplePay",
        }
    }

    /// Whether this instrument requires the session to enter instrument
    /// mode before an attempt can start. True only for new cards.
    pub fn instrument_mode_required(&self) -> bool {
        matches!(self, Self::NewCreditCard { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(rel: &str) -> OperationOutputModel {
        OperationOutputModel::new(
            OperationRel::from(rel.to_string()),
            format!("https://api.test/{}", rel),
            "GET",
        )
    }

    fn empty_session() -> PaymentSessionModel {
        PaymentSessionModel {
            culture: None,
            methods: Vec::new(),
            urls: None,
            instrument_mode_payment_method: None,
            updated: distant_past(),
        }
    }

    #[test]
    fn test_rel_escape_hatch_round_trip() {
        let rel: OperationRel = serde_json::from_str("\"frob-payment\"").unwrap();
        assert_eq!(rel, OperationRel::Unknown("frob-payment".to_string()));
        assert_eq!(serde_json::to_string(&rel).unwrap(), "\"frob-payment\"");

        let rel: OperationRel = serde_json::from_str("\"get-payment\"").unwrap();
        assert_eq!(rel, OperationRel::GetPayment);

        let rel: TaskRel = serde_json::from_str("\"wallet-sdk\"").unwrap();
        assert_eq!(rel, TaskRel::WalletSdk);
        let rel: TaskRel = serde_json::from_str("\"mystery\"").unwrap();
        assert_eq!(serde_json::to_string(&rel).unwrap(), "\"mystery\"");
    }

    #[test]
    fn test_problem_operation_overrides_prioritization() {
        let model = PaymentOutputModel {
            payment_session: empty_session(),
            operations: vec![op("get-payment"), op("view-payment")],
            problem: Some(ProblemDetails {
                problem_type: "https://api.test/problems/declined".to_string(),
                title: None,
                status: Some(400),
                detail: None,
                operation: Some(op("redirect-payer")),
            }),
        };

        let prioritized = model.prioritised_operations();
        assert_eq!(prioritized.len(), 1);
        assert_eq!(prioritized[0].rel, OperationRel::RedirectPayer);
    }

    #[test]
    fn test_unknown_problem_operation_does_not_override() {
        let model = PaymentOutputModel {
            payment_session: empty_session(),
            operations: vec![op("get-payment")],
            problem: Some(ProblemDetails {
                problem_type: "https://api.test/problems/declined".to_string(),
                title: None,
                status: None,
                detail: None,
                operation: Some(op("mystery-op")),
            }),
        };

        let prioritized = model.prioritised_operations();
        assert_eq!(prioritized.len(), 1);
        assert_eq!(prioritized[0].rel, OperationRel::GetPayment);
    }

    #[test]
    fn test_unknown_rels_are_filtered() {
        let model = PaymentOutputModel {
            payment_session: empty_session(),
            operations: vec![op("x"), op("get-payment"), op("view-payment")],
            problem: None,
        };

        let rels: Vec<&str> = model
            .prioritised_operations()
            .iter()
            .map(|op| op.rel.as_str())
            .collect();
        assert_eq!(rels, vec!["get-payment", "view-payment"]);
    }

    #[test]
    fn test_next_hint_narrows_the_set() {
        let mut view = op("view-payment");
        view.next = Some(true);
        let mut get = op("get-payment");
        get.next = Some(false);

        let model = PaymentOutputModel {
            payment_session: empty_session(),
            operations: vec![get, view],
            problem: None,
        };

        let prioritized = model.prioritised_operations();
        assert_eq!(prioritized.len(), 1);
        assert_eq!(prioritized[0].rel, OperationRel::ViewPayment);
    }

    #[test]
    fn test_method_operations_are_unioned_and_deduplicated() {
        let shared = op("get-payment");
        let mut session = empty_session();
        session.methods = vec![
            PaymentMethod::Swish(SwishMethod {
                prefills: Vec::new(),
                operations: vec![shared.clone(), op("start-payment-attempt")],
            }),
            PaymentMethod::CreditCard(CreditCardMethod {
                prefills: Vec::new(),
                operations: vec![shared.clone()],
            }),
        ];

        let model = PaymentOutputModel {
            payment_session: session,
            operations: vec![shared.clone()],
            problem: None,
        };

        let rels: Vec<&str> = model
            .prioritised_operations()
            .iter()
            .map(|op| op.rel.as_str())
            .collect();
        assert_eq!(rels, vec!["get-payment", "start-payment-attempt"]);
    }

    #[test]
    fn test_expectation_lookup_first_match_wins() {
        let task = IntegrationTask {
            rel: TaskRel::WalletSdk,
            href: None,
            method: None,
            content_type: None,
            expects: vec![
                Expectation {
                    name: "CurrencyCode".to_string(),
                    value_type: None,
                    value: Some(ExpectationValue::Single("SEK".to_string())),
                },
                Expectation {
                    name: "CurrencyCode".to_string(),
                    value_type: None,
                    value: Some(ExpectationValue::Single("NOK".to_string())),
                },
                Expectation {
                    name: "SupportedNetworks".to_string(),
                    value_type: None,
                    value: Some(ExpectationValue::Many(vec!["visa".to_string()])),
                },
            ],
        };

        assert_eq!(task.expect_string("CurrencyCode"), Some("SEK"));
        assert_eq!(
            task.expect_string_array("SupportedNetworks"),
            Some(&["visa".to_string()][..])
        );
        // Shape mismatch on the first match is a miss, not a fall-through.
        assert_eq!(task.expect_string("SupportedNetworks"), None);
        assert_eq!(task.expect_string("Missing"), None);
    }

    #[test]
    fn test_unknown_instrument_keeps_operations() {
        let json = serde_json::json!({
            "instrument": "Vipps",
            "operations": [
                { "rel": "start-payment-attempt", "href": "https://api.test/attempt", "method": "POST" }
            ]
        });

        let method: PaymentMethod = serde_json::from_value(json).unwrap();
        assert_eq!(method.instrument(), "Vipps");
        assert_eq!(method.operations().len(), 1);
        assert_eq!(method.operations()[0].rel, OperationRel::StartPaymentAttempt);

        // And it round-trips with the raw discriminator preserved.
        let value = serde_json::to_value(&method).unwrap();
        assert_eq!(value["instrument"], "Vipps");
    }

    #[test]
    fn test_credit_card_expiry_sentinel() {
        let prefill: CreditCardPrefill = serde_json::from_value(serde_json::json!({
            "paymentToken": "tok-1",
            "maskedPan": "****1234",
            "expiryDate": "never"
        }))
        .unwrap();
        assert_eq!(prefill.expiry_date, distant_past());

        let prefill: CreditCardPrefill = serde_json::from_value(serde_json::json!({
            "expiryDate": "2027-04-30T00:00:00Z"
        }))
        .unwrap();
        assert_ne!(prefill.expiry_date, distant_past());
    }

    #[test]
    fn test_session_model_decoding() {
        let json = serde_json::json!({
            "culture": "sv-SE",
            "instrumentModePaymentMethod": "CreditCard",
            "updated": "2024-06-01T10:00:00Z",
            "methods": [
                {
                    "instrument": "Swish",
                    "prefills": [{ "rank": 1, "msisdn": "+46701234567" }],
                    "operations": [
                        { "rel": "start-payment-attempt", "href": "https://api.test/a", "method": "POST" }
                    ]
                },
                {
                    "instrument": "ApplePay",
                    "cardBrands": ["Visa", "Mastercard"],
                    "operations": []
                }
            ]
        });

        let session: PaymentSessionModel = serde_json::from_value(json).unwrap();
        assert_eq!(session.culture.as_deref(), Some("sv-SE"));
        assert_eq!(session.methods.len(), 2);
        assert_eq!(session.all_method_operations().len(), 1);
        assert_eq!(
            session.instrument_mode_payment_method.as_deref(),
            Some("CreditCard")
        );
    }

    #[test]
    fn test_problem_type_matching() {
        let problem = ProblemDetails {
            problem_type: OPERATION_NOT_ALLOWED_TYPE.to_uppercase(),
            title: None,
            status: Some(409),
            detail: None,
            operation: None,
        };
        assert!(problem.is_operation_not_allowed());

        let other = ProblemDetails {
            problem_type: "https://api.test/problems/paymentorder".to_string(),
            title: None,
            status: Some(409),
            detail: None,
            operation: None,
        };
        assert!(!other.is_operation_not_allowed());
    }

    #[test]
    fn test_instrument_mapping() {
        assert_eq!(
            PaymentAttemptInstrument::Swish { msisdn: None }.payment_method(),
            "Swish"
        );
        let new_card = PaymentAttemptInstrument::NewCreditCard {
            enable_payment_details_consent: true,
        };
        assert_eq!(new_card.payment_method(), "CreditCard");
        assert!(new_card.instrument_mode_required());
        assert!(!PaymentAttemptInstrument::ApplePay {
            merchant_identifier: "merchant.test".to_string()
        }
        .instrument_mode_required());
    }
}
