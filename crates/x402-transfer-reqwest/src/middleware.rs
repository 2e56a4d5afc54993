//! Middleware that answers `402 Payment Required` with a ledger transfer.
//!
//! On a challenge, [`PaymentHandler`]:
//! 1. reads the price block of the challenge
//! 2. checks the network, the spending cap and the wallet balance
//! 3. submits the transfer and, by default, waits until the ledger settles it
//! 4. retries the request once with the encoded proof in `X-Payment`
//!
//! A second challenge on the retry is an error. The handler never pays twice for
//! one call.

use alloy_primitives::Address;
use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;
use std::time::Duration;
use x402_transfer_types::amount::NativeAmount;
use x402_transfer_types::codec::PaymentCodec;
use x402_transfer_types::ledger::{LedgerClient, LedgerError};
use x402_transfer_types::network::NetworkId;
use x402_transfer_types::price::PriceError;
use x402_transfer_types::proof::{PaymentProof, TransferId};
use x402_transfer_types::proto::{ChallengePayment, PAYMENT_HEADER, PaymentRequired};
use x402_transfer_types::rates::Pricing;

use crate::flow::{FlowStatus, FlowTracker, PaymentFlow};
use crate::wallet::Wallet;

#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, warn};

/// Default bound on the wait for a submitted transfer to settle.
pub const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default delay between two settlement lookups.
pub const DEFAULT_SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// When a submitted transfer is good enough to build a proof from.
///
/// Strict servers only admit settled transfers, so the default waits for
/// settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Right after the ledger accepted the submission. Enough for permissive
    /// servers and ledgers that settle on submission.
    Submitted,
    /// Once the ledger reports the transfer settled, polling every `poll_interval`.
    WaitForSettlement {
        timeout: Duration,
        poll_interval: Duration,
    },
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        ConfirmationPolicy::WaitForSettlement {
            timeout: DEFAULT_SETTLEMENT_TIMEOUT,
            poll_interval: DEFAULT_SETTLEMENT_POLL_INTERVAL,
        }
    }
}

/// What to do when the transfer cannot be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockFallback {
    #[default]
    Disabled,
    /// Present a mock proof instead. Only useful against permissive servers.
    Enabled,
}

#[derive(Debug, thiserror::Error)]
pub enum PayerError {
    #[error("Wallet not connected")]
    WalletDisconnected,
    #[error("Wrong network: wallet is on {wallet}, {required} required")]
    WrongNetwork {
        wallet: NetworkId,
        required: NetworkId,
    },
    #[error("Invalid payment challenge: {0}")]
    InvalidChallenge(String),
    #[error("Cannot price payment: {0}")]
    Pricing(#[from] PriceError),
    #[error("Payment of {requested} exceeds the allowed maximum of {allowed}")]
    AmountTooLarge {
        requested: NativeAmount,
        allowed: NativeAmount,
    },
    #[error(
        "Insufficient balance: required {required} {currency}, available {available} {currency}"
    )]
    InsufficientBalance {
        required: NativeAmount,
        available: NativeAmount,
        currency: String,
    },
    #[error("Cannot read wallet balance: {0}")]
    Balance(#[source] LedgerError),
    #[error("Transfer failed: {0}")]
    Transfer(#[source] LedgerError),
    #[error("Transfer {0} was not confirmed in time")]
    ConfirmationTimeout(TransferId),
    #[error("Failed to encode payment proof to HTTP header")]
    HeaderValueEncode(#[source] http::header::InvalidHeaderValue),
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("Payment was not accepted by the server")]
    PaymentRejected,
    #[error("Request failed with status {0}")]
    RequestFailed(StatusCode),
    #[error("Illegal payment flow transition from {from} to {to}")]
    IllegalTransition { from: FlowStatus, to: FlowStatus },
}

impl From<PayerError> for rqm::Error {
    fn from(error: PayerError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Pays for `402` responses from a [`Wallet`].
pub struct PaymentHandler<L> {
    wallet: Arc<Wallet<L>>,
    pricing: Pricing,
    required_network: Option<NetworkId>,
    max_amount: Option<NativeAmount>,
    confirmation: ConfirmationPolicy,
    mock_fallback: MockFallback,
}

impl<L> Clone for PaymentHandler<L> {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            pricing: self.pricing.clone(),
            required_network: self.required_network.clone(),
            max_amount: self.max_amount,
            confirmation: self.confirmation,
            mock_fallback: self.mock_fallback,
        }
    }
}

impl<L> PaymentHandler<L> {
    pub fn new(wallet: Wallet<L>) -> Self {
        Self {
            wallet: Arc::new(wallet),
            pricing: Pricing::default(),
            required_network: None,
            max_amount: None,
            confirmation: ConfirmationPolicy::default(),
            mock_fallback: MockFallback::default(),
        }
    }

    /// Pricing used when a challenge does not state its native amount.
    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Refuse to start a call unless the wallet is on `network`.
    pub fn with_required_network<N: Into<NetworkId>>(mut self, network: N) -> Self {
        self.required_network = Some(network.into());
        self
    }

    /// Upper bound for a single payment, in the native unit.
    pub fn with_max_amount(mut self, max_amount: NativeAmount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_mock_fallback(mut self, mock_fallback: MockFallback) -> Self {
        self.mock_fallback = mock_fallback;
        self
    }

    pub fn wallet(&self) -> &Wallet<L> {
        &self.wallet
    }

    /// Wallet connected and on the right network. Checked before any request.
    fn preconditions(&self) -> Result<Address, PayerError> {
        let address = self.wallet.address().ok_or(PayerError::WalletDisconnected)?;
        if let Some(required) = &self.required_network
            && required != self.wallet.network()
        {
            return Err(PayerError::WrongNetwork {
                wallet: self.wallet.network().clone(),
                required: required.clone(),
            });
        }
        Ok(address)
    }

    /// The challenge must be payable from the wallet's network.
    fn check_network(&self, payment: &ChallengePayment) -> Result<(), PayerError> {
        if &payment.network != self.wallet.network() {
            return Err(PayerError::WrongNetwork {
                wallet: self.wallet.network().clone(),
                required: payment.network.clone(),
            });
        }
        Ok(())
    }
}

impl<L: LedgerClient> PaymentHandler<L> {
    /// Amount the challenge asks for, in the native unit.
    pub fn amount_due(&self, payment: &ChallengePayment) -> Result<NativeAmount, PayerError> {
        match payment.native_amount {
            Some(amount) => Ok(amount),
            None => Ok(self.pricing.convert(&payment.amount, &payment.network)?),
        }
    }

    /// Makes the transfer a challenge asks for and returns its proof.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.reqwest.pay", skip_all, fields(network = %payment.network), err)
    )]
    pub async fn pay(
        &self,
        from: Address,
        payment: &ChallengePayment,
    ) -> Result<PaymentProof, PayerError> {
        self.check_network(payment)?;
        let amount = self.amount_due(payment)?;
        if let Some(allowed) = self.max_amount
            && amount > allowed
        {
            return Err(PayerError::AmountTooLarge {
                requested: amount,
                allowed,
            });
        }
        let gas_buffer = self.pricing.network(&payment.network)?.gas_buffer;
        let required = amount + gas_buffer;
        let available = self
            .wallet
            .balance(from)
            .await
            .map_err(PayerError::Balance)?;
        if available < required {
            return Err(PayerError::InsufficientBalance {
                required,
                available,
                currency: payment.currency.clone(),
            });
        }

        let to = payment.receiver_address;
        match self.wallet.transfer(from, to, amount).await {
            Ok(transfer_id) => {
                #[cfg(feature = "telemetry")]
                info!(%transfer_id, %amount, %to, "Payment transfer submitted");
                self.await_settlement(&transfer_id).await?;
                Ok(PaymentProof::settled(
                    transfer_id,
                    from,
                    to,
                    amount,
                    payment.network.clone(),
                ))
            }
            Err(err) => match self.mock_fallback {
                MockFallback::Disabled => Err(PayerError::Transfer(err)),
                MockFallback::Enabled => {
                    #[cfg(feature = "telemetry")]
                    warn!(error = %err, "Transfer failed, presenting a mock payment proof");
                    #[cfg(not(feature = "telemetry"))]
                    let _ = err;
                    Ok(PaymentProof::mock(
                        from,
                        to,
                        amount,
                        payment.network.clone(),
                    ))
                }
            },
        }
    }

    async fn await_settlement(&self, transfer_id: &TransferId) -> Result<(), PayerError> {
        let (timeout, poll_interval) = match self.confirmation {
            ConfirmationPolicy::Submitted => return Ok(()),
            ConfirmationPolicy::WaitForSettlement {
                timeout,
                poll_interval,
            } => (timeout, poll_interval),
        };
        let poll = async {
            loop {
                match self.wallet.transfer_status(transfer_id).await {
                    Ok(Some(status)) if status.settled => return Ok(()),
                    Ok(_) => {}
                    Err(err) => return Err(PayerError::Transfer(err)),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| PayerError::ConfirmationTimeout(transfer_id.clone()))?
    }

    async fn handle_tracked(
        &self,
        tracker: &FlowTracker,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let from = self.preconditions()?;
        advance(tracker, FlowStatus::Requesting, "Requesting service...", |_| {})?;

        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;
        if res.status() != StatusCode::PAYMENT_REQUIRED {
            finish(tracker, res.status())?;
            return Ok(res);
        }

        let challenge = parse_payment_required(res).await?;
        let payment = challenge.payment;
        let message = match payment.native_amount {
            Some(native) => format!(
                "Payment required: {} {} ({})",
                native, payment.currency, payment.amount
            ),
            None => format!("Payment required: {} {}", payment.amount, payment.currency),
        };
        advance(tracker, FlowStatus::PaymentRequired, &message, |flow| {
            flow.payment_details = Some(payment.clone());
        })?;
        #[cfg(feature = "telemetry")]
        info!(amount = %payment.amount, network = %payment.network, "Received 402 Payment Required, processing payment");

        self.check_network(&payment)?;
        let mut retry = retry_req.ok_or(PayerError::RequestNotCloneable)?;
        advance(tracker, FlowStatus::Signing, "Signing transaction...", |_| {})?;
        let mut proof = self.pay(from, &payment).await?;
        let header = HeaderValue::from_str(&PaymentCodec::encode_now(&mut proof))
            .map_err(PayerError::HeaderValueEncode)?;
        let message = if proof.is_mock {
            "Mock payment confirmed! Processing request..."
        } else {
            "Payment confirmed! Processing request..."
        };
        advance(tracker, FlowStatus::Confirmed, message, |flow| {
            flow.transaction = Some(proof.clone());
        })?;

        retry.headers_mut().insert(PAYMENT_HEADER, header);
        #[cfg(feature = "telemetry")]
        debug!(url = %retry.url(), transfer_id = %proof.transfer_id, "Retrying request with payment");
        let res = next.run(retry, extensions).await?;
        if res.status() == StatusCode::PAYMENT_REQUIRED {
            return Err(PayerError::PaymentRejected.into());
        }
        finish(tracker, res.status())?;
        Ok(res)
    }
}

#[async_trait::async_trait]
impl<L> rqm::Middleware for PaymentHandler<L>
where
    L: LedgerClient + 'static,
{
    /// Pays for a challenged request and retries it once.
    ///
    /// Progress goes to the [`FlowTracker`] found in the request extensions, if any.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.reqwest.handle", skip_all, err)
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let tracker = extensions.get::<FlowTracker>().cloned().unwrap_or_default();
        let result = self.handle_tracked(&tracker, req, extensions, next).await;
        if let Err(err) = &result {
            tracker.fail(&failure_message(err));
        }
        result
    }
}

fn advance<F>(
    tracker: &FlowTracker,
    next: FlowStatus,
    message: &str,
    update: F,
) -> Result<(), PayerError>
where
    F: FnOnce(&mut PaymentFlow),
{
    tracker
        .transition(next, message, update)
        .map_err(|(from, to)| PayerError::IllegalTransition { from, to })
}

/// Completes on success, fails on any other status.
fn finish(tracker: &FlowTracker, status: StatusCode) -> Result<(), PayerError> {
    if status.is_success() {
        advance(
            tracker,
            FlowStatus::Completed,
            "Service executed successfully!",
            |_| {},
        )
    } else {
        tracker.fail(&PayerError::RequestFailed(status).to_string());
        Ok(())
    }
}

fn failure_message(err: &rqm::Error) -> String {
    match err {
        rqm::Error::Middleware(err) => match err.downcast_ref::<PayerError>() {
            Some(payer) => payer.to_string(),
            None => err.to_string(),
        },
        rqm::Error::Reqwest(err) => err.to_string(),
    }
}

async fn parse_payment_required(response: Response) -> Result<PaymentRequired, PayerError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PayerError::InvalidChallenge(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| PayerError::InvalidChallenge(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
    use alloy_primitives::address;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_transfer_types::ledger::InMemoryLedger;
    use x402_transfer_types::network::{NetworkInfo, NetworkRegistry};
    use x402_transfer_types::price::PriceSpec;
    use x402_transfer_types::rates::RateTable;

    const PAYER: Address = address!("0x1111111111111111111111111111111111111111");
    const RECEIVER: Address = address!("0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e");

    fn pricing() -> Pricing {
        Pricing::new(
            NetworkRegistry::default().with_network(NetworkInfo::new("test-net", "TST", 18)),
            RateTable::default().with_rate("test-net", Decimal::from(1000)),
        )
    }

    fn challenge_body(native_amount: Option<&str>) -> serde_json::Value {
        let spec = PriceSpec::from_parts("$0.02".parse().unwrap(), "test-net", RECEIVER)
            .with_description("Summaries");
        let payment = ChallengePayment::new(
            &spec,
            "TST",
            native_amount.map(|amount| amount.parse().unwrap()),
        );
        serde_json::to_value(PaymentRequired::missing(payment)).unwrap()
    }

    fn handler(ledger: &InMemoryLedger) -> PaymentHandler<InMemoryLedger> {
        PaymentHandler::new(Wallet::connected(PAYER, "test-net", ledger.clone())).with_pricing(pricing())
    }

    async fn challenging_server(paid_status: u16) -> MockServer {
        let server = MockServer::start().await;
        let paid = if paid_status == 402 {
            ResponseTemplate::new(402).set_body_json(challenge_body(Some("0.00002")))
        } else {
            ResponseTemplate::new(paid_status).set_body_json(json!({ "summary": "short" }))
        };
        Mock::given(method("POST"))
            .and(path("/paid"))
            .and(header_exists(PAYMENT_HEADER))
            .respond_with(paid)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/paid"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge_body(Some("0.00002"))))
            .mount(&server)
            .await;
        server
    }

    async fn call(
        handler: PaymentHandler<InMemoryLedger>,
        server: &MockServer,
    ) -> (rqm::Result<Response>, PaymentFlow) {
        call_tracked(handler, server, FlowTracker::new()).await
    }

    async fn call_tracked(
        handler: PaymentHandler<InMemoryLedger>,
        server: &MockServer,
        tracker: FlowTracker,
    ) -> (rqm::Result<Response>, PaymentFlow) {
        let client = reqwest::Client::new().with_payments(handler).build();
        let result = client
            .post(format!("{}/paid", server.uri()))
            .with_extension(tracker.clone())
            .json(&json!({ "text": "hello" }))
            .send()
            .await;
        (result, tracker.snapshot())
    }

    #[tokio::test]
    async fn pays_once_and_retries_with_proof() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(200).await;

        let (result, flow) = call(handler(&ledger), &server).await;
        assert_eq!(result.unwrap().status(), 200);
        assert_eq!(flow.status, FlowStatus::Completed);
        assert_eq!(ledger.submission_count(), 1);
        assert_eq!(ledger.balance_of(&RECEIVER).to_string(), "0.00002");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].headers.contains_key(PAYMENT_HEADER));
        let header = requests[1].headers.get(PAYMENT_HEADER).unwrap().to_str().unwrap();
        let proof = PaymentCodec::decode(header).unwrap();
        assert_eq!(proof.to, RECEIVER);
        assert_eq!(proof.from, PAYER);
        assert_eq!(proof.value.to_string(), "0.00002");
        assert!(!proof.is_mock);
        assert_eq!(flow.transaction, Some(proof));
        assert_eq!(flow.payment_details.unwrap().receiver_address, RECEIVER);
    }

    #[tokio::test]
    async fn retries_exactly_once_against_rejecting_server() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(402).await;

        let (result, flow) = call(handler(&ledger), &server).await;
        assert!(result.is_err());
        assert_eq!(flow.status, FlowStatus::Error);
        assert_eq!(flow.error.as_deref(), Some("Payment was not accepted by the server"));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn preconditions_fail_before_any_request() {
        let ledger = InMemoryLedger::new();
        let server = challenging_server(200).await;

        let disconnected = PaymentHandler::new(Wallet::disconnected("test-net", ledger.clone()));
        let (result, flow) = call(disconnected, &server).await;
        assert!(result.is_err());
        assert_eq!(flow.status, FlowStatus::Error);
        assert_eq!(flow.error.as_deref(), Some("Wallet not connected"));

        let wrong_network = handler(&ledger).with_required_network("avalanche-fuji");
        let (_, flow) = call(wrong_network, &server).await;
        assert_eq!(flow.status, FlowStatus::Error);
        assert!(flow.message.contains("Wrong network"));

        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn insufficient_balance_submits_nothing() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "0.0005".parse().unwrap());
        let server = challenging_server(200).await;

        let (result, flow) = call(handler(&ledger), &server).await;
        assert!(result.is_err());
        assert_eq!(flow.status, FlowStatus::Error);
        assert_eq!(
            flow.error.as_deref(),
            Some("Insufficient balance: required 0.00102 TST, available 0.0005 TST")
        );
        assert_eq!(ledger.submission_count(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spending_cap_is_enforced() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(200).await;

        let capped = handler(&ledger).with_max_amount("0.00001".parse().unwrap());
        let (_, flow) = call(capped, &server).await;
        assert_eq!(flow.status, FlowStatus::Error);
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn converts_locally_when_challenge_has_no_native_amount() {
        let ledger = InMemoryLedger::new();
        let payment: PaymentRequired = serde_json::from_value(challenge_body(None)).unwrap();
        let amount = handler(&ledger).amount_due(&payment.payment).unwrap();
        assert_eq!(amount.to_string(), "0.00002");
    }

    #[tokio::test]
    async fn failed_transfer_falls_back_to_mock_only_when_enabled() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "1".parse().unwrap());
        ledger.fail_submissions(true);

        let server = challenging_server(200).await;
        let (result, flow) = call(handler(&ledger), &server).await;
        assert!(result.is_err());
        assert!(flow.error.unwrap().starts_with("Transfer failed"));

        let server = challenging_server(200).await;
        let demo = handler(&ledger).with_mock_fallback(MockFallback::Enabled);
        let (result, flow) = call(demo, &server).await;
        assert_eq!(result.unwrap().status(), 200);
        assert_eq!(flow.status, FlowStatus::Completed);
        assert!(flow.transaction.unwrap().is_mock);
    }

    #[tokio::test]
    async fn unsettled_transfer_times_out_without_retry() {
        let ledger = InMemoryLedger::new().with_manual_settlement();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(200).await;

        let waiting = handler(&ledger).with_confirmation(ConfirmationPolicy::WaitForSettlement {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        });
        let (_, flow) = call(waiting, &server).await;
        assert_eq!(flow.status, FlowStatus::Error);
        assert!(flow.error.unwrap().contains("not confirmed in time"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_transfer_is_presented_once_settled() {
        let ledger = InMemoryLedger::new().with_manual_settlement();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(200).await;

        let settler = ledger.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let pending = settler.pending_transfers();
                if !pending.is_empty() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    pending.iter().for_each(|id| {
                        settler.settle(id);
                    });
                    return;
                }
            }
        });

        let waiting = handler(&ledger).with_confirmation(ConfirmationPolicy::WaitForSettlement {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        });
        let (result, flow) = call(waiting, &server).await;
        assert_eq!(result.unwrap().status(), 200);
        assert_eq!(flow.status, FlowStatus::Completed);
        assert!(ledger.pending_transfers().is_empty());
        assert_eq!(ledger.submission_count(), 1);
    }

    #[test]
    fn default_policy_waits_for_settlement() {
        assert_eq!(
            ConfirmationPolicy::default(),
            ConfirmationPolicy::WaitForSettlement {
                timeout: DEFAULT_SETTLEMENT_TIMEOUT,
                poll_interval: DEFAULT_SETTLEMENT_POLL_INTERVAL,
            }
        );
    }

    #[tokio::test]
    async fn challenge_on_another_network_fails_before_signing() {
        let ledger = InMemoryLedger::new();
        ledger.fund(PAYER, "1".parse().unwrap());
        let server = challenging_server(200).await;

        let statuses = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = statuses.clone();
        let tracker = FlowTracker::with_observer(Arc::new(move |flow: &PaymentFlow| {
            seen.lock().unwrap().push(flow.status)
        }));
        let elsewhere = PaymentHandler::new(Wallet::connected(PAYER, "other-net", ledger.clone()))
            .with_pricing(pricing());
        let (result, flow) = call_tracked(elsewhere, &server, tracker).await;
        assert!(result.is_err());
        assert_eq!(flow.status, FlowStatus::Error);
        assert_eq!(
            flow.error.as_deref(),
            Some("Wrong network: wallet is on other-net, test-net required")
        );
        assert_eq!(
            *statuses.lock().unwrap(),
            vec![FlowStatus::Requesting, FlowStatus::PaymentRequired, FlowStatus::Error]
        );
        assert_eq!(ledger.submission_count(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn free_endpoint_completes_without_payment() {
        let ledger = InMemoryLedger::new();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let (result, flow) = call(handler(&ledger), &server).await;
        assert_eq!(result.unwrap().status(), 200);
        assert_eq!(flow.status, FlowStatus::Completed);
        assert_eq!(ledger.submission_count(), 0);
    }
}
