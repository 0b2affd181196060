//! # paylink-rs
//!
//! A Rust client engine for hypermedia-driven payment session negotiation
//! over HTTPS.
//!
//! The remote payment API is self-describing: every response enumerates the
//! set of legal next operations as HAL-style affordances. This crate models
//! those operations and tasks, routes caller intents to concrete HTTP
//! requests, executes them with retry bounded by a session-wide budget,
//! bridges native wallet authorization, and emits best-effort telemetry —
//! without rendering anything itself. The UI layer supplies payment-attempt
//! intents and consumes typed results.
//!
//! ## Features
//!
//! - **Operation/task model**: immutable, forward-compatible wire types;
//!   unknown server values round-trip through escape-hatch variants
//! - **Endpoint routing**: pure (operation, intent) → request mapping with
//!   per-intent timeout policy and https normalization
//! - **Resilient execution**: transient 5xx retry on a fixed delay, bounded
//!   by cumulative session time, never by attempt count
//! - **Wallet bridging**: builds a native payment request from server
//!   expectations and redeems the authorized token as an attempt payload
//! - **Telemetry**: fire-and-forget event emission that never blocks or
//!   fails the payment flow
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paylink_rs::{
//!     PaymentAttemptInstrument, PaymentSession, RouterConfig, TelemetrySink,
//! };
//!
//! # async fn example() -> paylink_rs::Result<()> {
//! let config = RouterConfig::default().with_locale("sv-SE");
//! let mut session = PaymentSession::new(
//!     config,
//!     TelemetrySink::disabled(),
//!     "https://api.example.com/psp/paymentsessions/abc123",
//! );
//!
//! session.fetch().await?;
//! session.prepare_payment().await?;
//!
//! let instrument = PaymentAttemptInstrument::Swish { msisdn: None };
//! if let Some(output) = session.begin_payment_attempt(&instrument, "sv-SE").await? {
//!     for op in output.prioritised_operations() {
//!         println!("next: {}", op.rel.as_str());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! A negotiation follows this loop:
//!
//! 1. **Fetch the session**: GET the session URL; the response lists
//!    operations and payment methods
//! 2. **Prepare**: `prepare-payment` with client/browser metadata
//! 3. **Attempt**: `start-payment-attempt` with the chosen instrument
//! 4. **Follow affordances**: the prioritized operations of each response
//!    say what is legal next — authentication, redirect, wallet task, poll
//! 5. **Resolve**: a terminal response reports success, a problem, or an
//!    abort confirmation
//!
//! Steps never follow a hard-coded order beyond what the rel/task
//! vocabulary encodes; an operation the server does not offer is simply
//! not required for that payment.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod errors;
pub mod executor;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod wallet;

// Re-export commonly used items
pub use errors::{PayError, Result};
pub use executor::{RequestExecutor, SessionClock, RETRY_DELAY};
pub use router::{
    EndpointRouter, RouterConfig, RouterIntent, RoutedRequest, ScreenInfo,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SESSION_TIMEOUT, EXTENDED_REQUEST_TIMEOUT,
    EXTENDED_SESSION_TIMEOUT,
};
pub use session::PaymentSession;
pub use telemetry::{TelemetryEvent, TelemetryKind, TelemetrySink};
pub use types::{
    IntegrationTask, OperationOutputModel, OperationRel, PaymentAttemptInstrument,
    PaymentMethod, PaymentOutputModel, PaymentSessionModel, ProblemDetails, TaskRel,
};
pub use wallet::{
    build_wallet_request, AuthorizationEvent, WalletBridge, WalletNetwork, WalletRequestSpec,
    WalletUi, WalletVerdict,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_pairs() {
        assert_eq!(DEFAULT_REQUEST_TIMEOUT.as_secs(), 10);
        assert_eq!(DEFAULT_SESSION_TIMEOUT.as_secs(), 20);
        assert_eq!(EXTENDED_REQUEST_TIMEOUT.as_secs(), 30);
        assert_eq!(EXTENDED_SESSION_TIMEOUT.as_secs(), 30);
    }

    #[test]
    fn test_module_accessibility() {
        // Ensure the main entry points are constructible.
        let _ = RouterConfig::default();
        let _ = EndpointRouter::new(RouterConfig::default());
        let _ = TelemetrySink::disabled();
        let _ = PaymentSession::new(
            RouterConfig::default(),
            TelemetrySink::disabled(),
            "https://api.example.com/session",
        );
    }
}
