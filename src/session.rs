//! Payment session orchestration.
//!
//! [`PaymentSession`] is the inbound surface for the UI/orchestration
//! layer. It holds the current server response, applies the prioritization
//! rule to pick the operation matching each caller intent, and threads one
//! session clock through every route/execute pair so the retry budget is
//! measured from a single origin.
//!
//! The protocol is strictly sequential: the next request is never issued
//! before the previous outcome is known, and each response determines what
//! is legal next. An operation the server did not offer is "not required
//! for this payment" and resolves to `Ok(None)`, never an error.

use crate::errors::Result;
use crate::executor::{RequestExecutor, SessionClock};
use crate::router::{EndpointRouter, RouterConfig, RouterIntent};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{
    IntegrationTask, OperationOutputModel, OperationRel, PaymentAttemptInstrument,
    PaymentOutputModel,
};
use crate::wallet::{WalletBridge, WalletUi};

/// One payment attempt negotiation against a session URL.
pub struct PaymentSession {
    router: EndpointRouter,
    executor: RequestExecutor,
    telemetry: TelemetrySink,
    session_href: String,
    clock: Option<SessionClock>,
    current: Option<PaymentOutputModel>,
}

impl PaymentSession {
    /// Creates a session engine for the given session URL.
    pub fn new(
        config: RouterConfig,
        telemetry: TelemetrySink,
        session_href: impl Into<String>,
    ) -> Self {
        Self {
            router: EndpointRouter::new(config),
            executor: RequestExecutor::new(telemetry.clone()),
            telemetry,
            session_href: session_href.into(),
            clock: None,
            current: None,
        }
    }

    /// Replaces the request executor, e.g. to share a `reqwest::Client` or
    /// enable automatic transport retry.
    pub fn with_executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// The latest server response, when any exchange has completed.
    pub fn current(&self) -> Option<&PaymentOutputModel> {
        self.current.as_ref()
    }

    /// Prioritized next operations of the current response.
    pub fn prioritised_operations(&self) -> Vec<&OperationOutputModel> {
        self.current
            .as_ref()
            .map(|m| m.prioritised_operations())
            .unwrap_or_default()
    }

    /// Finds a prioritized operation of the current response by rel.
    pub fn find_operation(&self, rel: &OperationRel) -> Option<&OperationOutputModel> {
        self.current.as_ref().and_then(|m| m.find_operation(rel))
    }

    /// The session clock, armed on first use.
    fn armed_clock(&mut self) -> SessionClock {
        *self.clock.get_or_insert_with(SessionClock::new)
    }

    fn remember(
        &mut self,
        model: Option<PaymentOutputModel>,
    ) -> Result<Option<PaymentOutputModel>> {
        if let Some(m) = &model {
            self.current = Some(m.clone());
        }
        Ok(model)
    }

    /// Routes and executes `intent` through the prioritized operation with
    /// the given rel, or resolves to `Ok(None)` when the server does not
    /// offer it.
    async fn perform(
        &mut self,
        rel: OperationRel,
        intent: RouterIntent,
    ) -> Result<Option<PaymentOutputModel>> {
        let clock = self.armed_clock();
        let operation = match self.current.as_ref().and_then(|m| m.find_operation(&rel)) {
            Some(op) => op.clone(),
            None => {
                tracing::debug!(rel = rel.as_str(), "operation not offered, skipping");
                return Ok(None);
            }
        };
        let routed = self.router.route(&operation, &intent)?;
        let model = self.executor.execute(&routed, &clock).await?;
        self.remember(model)
    }

    /// Fetches the session state from the session URL, arming the clock.
    pub async fn fetch(&mut self) -> Result<Option<PaymentOutputModel>> {
        self.telemetry.emit(TelemetryEvent::method_call("fetch"));
        let clock = self.armed_clock();
        let operation = OperationOutputModel::new(
            OperationRel::ViewPayment,
            self.session_href.clone(),
            "GET",
        );
        let routed = self.router.route(&operation, &RouterIntent::ViewPayment)?;
        let model = self.executor.execute(&routed, &clock).await?;
        self.remember(model)
    }

    /// Prepares the session for payment attempts.
    pub async fn prepare_payment(&mut self) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("preparePayment"));
        self.perform(OperationRel::PreparePayment, RouterIntent::PreparePayment)
            .await
    }

    /// Starts a payment attempt with the chosen instrument.
    ///
    /// An instrument that requires instrument mode (a new card) first locks
    /// the session to its method through `customize-payment`, when the
    /// session is not already locked to it.
    pub async fn begin_payment_attempt(
        &mut self,
        instrument: &PaymentAttemptInstrument,
        culture: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("beginPaymentAttempt"));

        if instrument.instrument_mode_required() {
            let already_locked = self
                .current
                .as_ref()
                .map(|m| {
                    m.payment_session.instrument_mode_payment_method.as_deref()
                        == Some(instrument.payment_method())
                })
                .unwrap_or(false);
            if !already_locked {
                self.perform(
                    OperationRel::CustomizePayment,
                    RouterIntent::CustomizePayment {
                        payment_method: Some(instrument.payment_method().to_string()),
                        instrument_mode: Some(true),
                    },
                )
                .await?;
            }
        }

        self.perform(
            OperationRel::StartPaymentAttempt,
            RouterIntent::StartPaymentAttempt {
                instrument: instrument.clone(),
                culture: culture.to_string(),
            },
        )
        .await
    }

    /// Creates a strong customer authentication after the SCA method
    /// request resolved.
    pub async fn create_authentication(
        &mut self,
        method_completion_indicator: &str,
        culture: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("createAuthentication"));
        self.perform(
            OperationRel::CreateAuthentication,
            RouterIntent::CreateAuthentication {
                method_completion_indicator: method_completion_indicator.to_string(),
                culture: culture.to_string(),
            },
        )
        .await
    }

    /// Completes an authentication with the challenge response.
    pub async fn continue_authentication(
        &mut self,
        challenge_response: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("continueAuthentication"));
        self.perform(
            OperationRel::CompleteAuthentication,
            RouterIntent::CompleteAuthentication {
                challenge_response: challenge_response.to_string(),
            },
        )
        .await
    }

    /// Expands one payment method's details.
    pub async fn expand_method(
        &mut self,
        payment_method: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("expandMethod"));
        self.perform(
            OperationRel::ExpandMethod,
            RouterIntent::ExpandMethod {
                payment_method: payment_method.to_string(),
            },
        )
        .await
    }

    /// Polls the current payment state.
    pub async fn get_payment(&mut self) -> Result<Option<PaymentOutputModel>> {
        self.telemetry.emit(TelemetryEvent::method_call("getPayment"));
        self.perform(OperationRel::GetPayment, RouterIntent::GetPayment)
            .await
    }

    /// Acknowledges a failed payment attempt.
    pub async fn acknowledge_failed_attempt(&mut self) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("acknowledgeFailedAttempt"));
        self.perform(
            OperationRel::AcknowledgeFailedAttempt,
            RouterIntent::AcknowledgeFailedAttempt,
        )
        .await
    }

    /// Reports a client-side attempt failure to the server.
    pub async fn fail_payment_attempt(
        &mut self,
        problem_type: &str,
        error_code: Option<&str>,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("failPaymentAttempt"));
        self.perform(
            OperationRel::FailPaymentAttempt,
            RouterIntent::FailPaymentAttempt {
                problem_type: problem_type.to_string(),
                error_code: error_code.map(str::to_string),
            },
        )
        .await
    }

    /// Aborts the payment.
    pub async fn abort(&mut self, reason: &str) -> Result<Option<PaymentOutputModel>> {
        self.telemetry.emit(TelemetryEvent::method_call("abort"));
        self.perform(
            OperationRel::AbortPayment,
            RouterIntent::AbortPayment {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Presents the wallet UI for a `wallet-sdk` task and redeems the
    /// resulting token through the given operation.
    pub async fn present_wallet<U: WalletUi + ?Sized>(
        &mut self,
        ui: &mut U,
        operation: &OperationOutputModel,
        task: &IntegrationTask,
        merchant_identifier: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        self.telemetry
            .emit(TelemetryEvent::method_call("presentWallet"));
        let clock = self.armed_clock();
        let bridge = WalletBridge::new(
            &self.router,
            &self.executor,
            &clock,
            self.telemetry.clone(),
        );
        let model = bridge
            .present(ui, operation, task, merchant_identifier)
            .await?;
        self.remember(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_operation_is_not_required() {
        tokio_test::block_on(async {
            let mut session = PaymentSession::new(
                RouterConfig::default(),
                TelemetrySink::disabled(),
                "https://api.test/session",
            );

            // No response has been fetched, so nothing is offered; every
            // step resolves to "not required" without touching the network.
            assert!(session.abort("UserAbort").await.unwrap().is_none());
            assert!(session.get_payment().await.unwrap().is_none());
            assert!(session
                .continue_authentication("cres")
                .await
                .unwrap()
                .is_none());
        });
    }

    #[test]
    fn test_accessors_before_first_exchange() {
        let session = PaymentSession::new(
            RouterConfig::default(),
            TelemetrySink::disabled(),
            "https://api.test/session",
        );
        assert!(session.current().is_none());
        assert!(session.prioritised_operations().is_empty());
        assert!(session
            .find_operation(&OperationRel::GetPayment)
            .is_none());
    }

    #[test]
    fn test_method_calls_emit_telemetry() {
        tokio_test::block_on(async {
            let sink = TelemetrySink::memory();
            let mut session = PaymentSession::new(
                RouterConfig::default(),
                sink.clone(),
                "https://api.test/session",
            );
            let _ = session.abort("UserAbort").await;

            let events = sink.recorded();
            assert_eq!(events.len(), 1);
            assert_eq!(
                events[0].values.get("method").map(String::as_str),
                Some("abort")
            );
        });
    }
}
