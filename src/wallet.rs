//! Wallet (tokenized payment) bridging.
//!
//! A `wallet-sdk` task describes, through its expectation list, the native
//! payment request the client should present. The concrete wallet UI is an
//! external collaborator behind the [`WalletUi`] trait; this module builds
//! the request from the task, drives one authorization round, and funnels
//! the resulting token back through the router and executor as an
//! attempt-payload operation.
//!
//! The wallet sheet's final verdict is driven by the outcome of that
//! network call, not by local token construction: the bridge waits for the
//! redeem round trip before resolving the sheet.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{PayError, Result};
use crate::executor::{RequestExecutor, SessionClock};
use crate::router::{EndpointRouter, RouterIntent};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{IntegrationTask, OperationOutputModel, PaymentOutputModel};
use crate::utils::{encode_wallet_token, region_of_locale};

/// Card networks the wallet request can restrict payment to.
///
/// The lookup from server-supplied identifiers is closed; unknown
/// identifiers are dropped, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WalletNetwork {
    /// Visa.
    Visa,
    /// Mastercard.
    Mastercard,
    /// American Express.
    Amex,
    /// Discover.
    Discover,
    /// Maestro.
    Maestro,
    /// JCB.
    Jcb,
    /// Diners Club.
    Diners,
    /// Visa Electron.
    Electron,
}

impl WalletNetwork {
    /// Maps a lowercase network identifier to a wallet network constant.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            "visa" => Some(Self::Visa),
            "mastercard" | "mc" => Some(Self::Mastercard),
            "amex" => Some(Self::Amex),
            "discover" => Some(Self::Discover),
            "maestro" => Some(Self::Maestro),
            "jcb" => Some(Self::Jcb),
            "diners" => Some(Self::Diners),
            "electron" => Some(Self::Electron),
            _ => None,
        }
    }
}

/// The native payment request derived from a `wallet-sdk` task.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletRequestSpec {
    /// Label shown next to the total amount.
    pub total_label: String,

    /// Total amount, as the server-supplied decimal string.
    pub total_amount: String,

    /// Merchant identifier registered with the wallet provider. Supplied
    /// by the caller, not the server.
    pub merchant_identifier: String,

    /// Whether the merchant supports 3-D Secure.
    pub supports_3ds: bool,

    /// Country of the transaction, derived from the locale expectation.
    pub country_code: Option<String>,

    /// ISO currency code.
    pub currency_code: String,

    /// Card networks accepted for this payment.
    pub supported_networks: Vec<WalletNetwork>,

    /// Countries cards may be issued in, when restricted.
    pub supported_countries: BTreeSet<String>,

    /// Contact fields the wallet must collect from the payer.
    pub required_contact_fields: BTreeSet<String>,
}

/// Builds the native payment request from a task's expectation list.
///
/// `TotalAmount` and `CurrencyCode` are required; everything else degrades
/// to an empty or default value when absent.
pub fn build_wallet_request(
    task: &IntegrationTask,
    merchant_identifier: &str,
) -> Result<WalletRequestSpec> {
    let total_amount = task
        .expect_string("TotalAmount")
        .ok_or_else(|| PayError::MissingExpectation("TotalAmount".to_string()))?
        .to_string();
    let currency_code = task
        .expect_string("CurrencyCode")
        .ok_or_else(|| PayError::MissingExpectation("CurrencyCode".to_string()))?
        .to_string();

    let supports_3ds = task
        .expect_string_array("MerchantCapabilities")
        .map(|caps| caps.iter().any(|c| c == "supports3DS"))
        .unwrap_or(false);

    let supported_networks = task
        .expect_string_array("SupportedNetworks")
        .unwrap_or(&[])
        .iter()
        .filter_map(|id| WalletNetwork::from_identifier(&id.to_ascii_lowercase()))
        .collect();

    Ok(WalletRequestSpec {
        total_label: task.expect_string("TotalAmountLabel").unwrap_or("").to_string(),
        total_amount,
        merchant_identifier: merchant_identifier.to_string(),
        supports_3ds,
        country_code: task.expect_string("Locale").and_then(region_of_locale),
        currency_code,
        supported_networks,
        supported_countries: task
            .expect_string_array("SupportedCountries")
            .unwrap_or(&[])
            .iter()
            .cloned()
            .collect(),
        required_contact_fields: task
            .expect_string_array("RequiredContactFields")
            .unwrap_or(&[])
            .iter()
            .cloned()
            .collect(),
    })
}

/// One event from the wallet sheet.
#[derive(Debug)]
pub enum AuthorizationEvent {
    /// The user authorized a payment; carries the raw token bytes.
    Authorized(Vec<u8>),
    /// The sheet was dismissed.
    Dismissed,
}

/// Final status the bridge reports back to the wallet sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletVerdict {
    /// The token was redeemed successfully.
    Success,
    /// The redeem call failed.
    Failure,
}

/// Capability interface over the native wallet UI.
///
/// The concrete sheet is an external collaborator: implementations present
/// the request, deliver authorization events on the returned channel, and
/// receive the final verdict once the bridge has redeemed (or failed to
/// redeem) the token.
#[async_trait]
pub trait WalletUi: Send {
    /// Presents the wallet sheet for the given request.
    async fn present(&mut self, spec: WalletRequestSpec) -> mpsc::Receiver<AuthorizationEvent>;

    /// Reports the final verdict so the sheet can resolve.
    async fn complete(&mut self, verdict: WalletVerdict);
}

/// Drives one wallet authorization round.
pub struct WalletBridge<'a> {
    router: &'a EndpointRouter,
    executor: &'a RequestExecutor,
    clock: &'a SessionClock,
    telemetry: TelemetrySink,
    has_authorized_payment: bool,
}

impl<'a> WalletBridge<'a> {
    /// Creates a bridge over the session's router, executor and clock.
    pub fn new(
        router: &'a EndpointRouter,
        executor: &'a RequestExecutor,
        clock: &'a SessionClock,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            router,
            executor,
            clock,
            telemetry,
            has_authorized_payment: false,
        }
    }

    /// Presents the wallet UI once and resolves the authorization.
    ///
    /// Consumes the bridge: each instance presents exactly once.
    ///
    /// A dismissal without a preceding authorization resolves to
    /// [`PayError::UserCancelled`]. An authorization is redeemed by
    /// base64-encoding the token and submitting it through `operation` as
    /// an attempt payload; the outcome of that call is both the returned
    /// result and the verdict reported to the sheet. A redeem failure is
    /// therefore surfaced as the call's own error, never as a
    /// cancellation.
    pub async fn present<U: WalletUi + ?Sized>(
        mut self,
        ui: &mut U,
        operation: &OperationOutputModel,
        task: &IntegrationTask,
        merchant_identifier: &str,
    ) -> Result<Option<PaymentOutputModel>> {
        let spec = build_wallet_request(task, merchant_identifier)?;
        let mut events = ui.present(spec).await;

        while let Some(event) = events.recv().await {
            match event {
                AuthorizationEvent::Authorized(token) => {
                    self.has_authorized_payment = true;
                    self.telemetry.emit(TelemetryEvent::callback("walletAuthorized"));

                    let intent = RouterIntent::AttemptPayload {
                        payment_payload: encode_wallet_token(&token),
                    };
                    let outcome = match self.router.route(operation, &intent) {
                        Ok(routed) => {
                            self.executor
                                .execute::<PaymentOutputModel>(&routed, self.clock)
                                .await
                        }
                        Err(err) => Err(err),
                    };
                    return match outcome {
                        Ok(model) => {
                            ui.complete(WalletVerdict::Success).await;
                            Ok(model)
                        }
                        Err(err) => {
                            ui.complete(WalletVerdict::Failure).await;
                            Err(err)
                        }
                    };
                }
                AuthorizationEvent::Dismissed => {
                    self.telemetry.emit(TelemetryEvent::callback("walletDismissed"));
                    if !self.has_authorized_payment {
                        return Err(PayError::UserCancelled);
                    }
                    // A dismissal after authorization carries no verdict of
                    // its own; the redeem call already resolved it.
                }
            }
        }

        // The sheet went away without delivering any event.
        if self.has_authorized_payment {
            Ok(None)
        } else {
            Err(PayError::UserCancelled)
        }
    }
}
