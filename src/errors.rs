//! Error types for the paylink-rs library.
//!
//! This module defines the closed error taxonomy surfaced by the negotiation
//! engine, plus pass-through variants for raw transport and decode failures.

use crate::types::ProblemDetails;
use thiserror::Error;

/// Main error type for payment negotiation operations.
#[derive(Error, Debug)]
pub enum PayError {
    /// An operation href was missing or could not be parsed into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The server rejected the operation as not allowed in the current
    /// payment state (HTTP 409 with the operation-not-allowed problem type).
    ///
    /// This is expected and benign in some flows, e.g. aborting a payment
    /// that already completed.
    #[error("operation not allowed in the current payment state")]
    OperationNotAllowed(Option<Box<ProblemDetails>>),

    /// The server rejected the operation with a conflict that is not the
    /// benign operation-not-allowed case.
    #[error("operation failed with a conflict")]
    GenericOperationError(Option<Box<ProblemDetails>>),

    /// The user dismissed the wallet sheet without authorizing a payment.
    #[error("payment cancelled by the user")]
    UserCancelled,

    /// A failure that could not be classified into any other variant.
    #[error("unknown error")]
    Unknown,

    /// Error during HTTP request/response handling.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Error during Base64 decoding of a wallet payload.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The last observed 5xx status once the session retry budget ran out.
    #[error("server error: HTTP {0}")]
    ServerStatus(u16),

    /// A structured problem returned by the server for a non-2xx response.
    #[error("problem reported by the server: {0}")]
    Problem(Box<ProblemDetails>),

    /// A wallet task was missing an expectation required to build the
    /// native payment request.
    #[error("missing expectation: {0}")]
    MissingExpectation(String),
}

/// Result type alias for payment negotiation operations.
pub type Result<T> = std::result::Result<T, PayError>;

impl PayError {
    /// A user-displayable message for this error.
    ///
    /// Raw pass-through errors (transport, decode) fall back to the generic
    /// unknown-error message; the UI layer is expected to localize these keys.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "The payment service returned an invalid link.",
            Self::OperationNotAllowed(_) => "This action is not available right now.",
            Self::GenericOperationError(_) => "The payment operation could not be completed.",
            Self::UserCancelled => "The payment was cancelled.",
            Self::Problem(_) => "The payment service reported a problem.",
            Self::ServerStatus(_) => "The payment service is temporarily unavailable.",
            Self::MissingExpectation(_)
            | Self::Unknown
            | Self::Http(_)
            | Self::Json(_)
            | Self::Url(_)
            | Self::Base64(_) => "Something went wrong. Please try again.",
        }
    }
}
