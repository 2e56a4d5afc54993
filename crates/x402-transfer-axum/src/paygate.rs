//! Per-request payment gate.
//!
//! The gate:
//! - extracts the proof from the `X-Payment` header, or the `payment` query parameter
//! - verifies it against the route's [`PriceSpec`]
//! - answers `402 Payment Required` for absent and rejected proofs alike
//! - admits the call, hands the [`PaymentReceipt`] to the handler through request
//!   extensions, and embeds it into JSON responses
//! - records one [`TransactionLogEntry`] per served paid call
//!
//! Rejection reasons are logged, never returned to the caller.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use futures_util::FutureExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::Serialize;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower::Service;
use x402_transfer_types::ledger::LedgerClient;
use x402_transfer_types::price::PriceSpec;
use x402_transfer_types::proto::{
    ChallengePayment, ErrorResponse, PAYMENT_HEADER, PAYMENT_QUERY_PARAM,
    PAYMENT_RESPONSE_HEADER, PaymentRequired,
};
use x402_transfer_types::receipt::PaymentReceipt;

use crate::transaction_log::{TransactionLog, TransactionLogEntry};
use crate::verifier::{RejectReason, Verifier, VerifierError};

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Field of a JSON response body that carries the receipt.
pub const RECEIPT_FIELD: &str = "payment";

#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error("Payment rejected: {0}")]
    Rejected(RejectReason),
    #[error(transparent)]
    Verifier(#[from] VerifierError),
    #[error("Paid handler failed: {0}")]
    Handler(String),
}

impl PaygateError {
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            PaygateError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Gate state for one request.
pub struct Paygate<L> {
    pub verifier: Arc<Verifier<L>>,
    pub log: TransactionLog,
    pub price: Arc<PriceSpec>,
    /// Refuse a transfer that already paid for an earlier call.
    pub replay_protection: bool,
}

impl<L: LedgerClient> Paygate<L> {
    /// Handles a request, turning every failure into a response.
    ///
    /// Rejections become a `402` challenge; verifier and handler failures become
    /// a generic `500`.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.handle_request", skip_all, fields(uri = %req.uri()))
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.error_into_response(err)),
        }
    }

    /// Like [`Paygate::handle_request`], but hands failures back as [`PaygateError`].
    pub async fn handle_request_fallible<S>(
        &self,
        inner: S,
        mut req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let raw = extract_payment(&req);
        let result = self.verifier.verify(raw.as_deref(), &self.price).await?;
        let proof = match (result.accepted, result.proof) {
            (true, Some(proof)) => proof,
            _ => {
                return Err(PaygateError::Rejected(
                    result.reason.unwrap_or(RejectReason::MalformedProof),
                ));
            }
        };
        if self.replay_protection && !self.log.try_claim(&proof.transfer_id) {
            return Err(PaygateError::Rejected(RejectReason::ReplayedTransfer));
        }

        let receipt = PaymentReceipt::new(self.price.amount.clone(), proof, result.verified);
        req.extensions_mut().insert(receipt.clone());

        let response = match Self::call_inner(inner, req).await {
            Ok(response) if !response.status().is_server_error() => response,
            Ok(response) => {
                self.release(&receipt);
                return Err(PaygateError::Handler(format!(
                    "handler answered {}",
                    response.status()
                )));
            }
            Err(panic) => {
                self.release(&receipt);
                return Err(PaygateError::Handler(panic));
            }
        };

        self.log
            .record(TransactionLogEntry::from_receipt(
                &receipt,
                &self.price.description,
            ))
            .await;
        Ok(attach_receipt(response, &receipt).await)
    }

    /// Runs the handler, catching panics.
    async fn call_inner<S>(mut inner: S, req: Request) -> Result<Response, String>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let future = AssertUnwindSafe(inner.call(req)).catch_unwind();
        #[cfg(feature = "telemetry")]
        let future = future.instrument(tracing::info_span!("inner"));
        match future.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(infallible)) => match infallible {},
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }

    fn release(&self, receipt: &PaymentReceipt) {
        if self.replay_protection {
            self.log.release_claim(&receipt.transfer_id);
        }
    }

    /// The challenge body for this route.
    pub fn challenge(&self) -> ChallengePayment {
        let pricing = self.verifier.pricing();
        let currency = pricing
            .network(&self.price.network)
            .map(|network| network.currency.clone())
            .unwrap_or_default();
        let native_amount = pricing.native_amount(&self.price).ok();
        ChallengePayment::new(&self.price, &currency, native_amount)
    }

    pub fn error_into_response(&self, err: PaygateError) -> Response {
        match err {
            PaygateError::Rejected(RejectReason::MissingProof) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!("No payment attached, issuing challenge");
                json_response(
                    StatusCode::PAYMENT_REQUIRED,
                    &PaymentRequired::missing(self.challenge()),
                )
            }
            PaygateError::Rejected(reason) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(reason = %reason, "Payment rejected");
                #[cfg(not(feature = "telemetry"))]
                let _ = reason;
                json_response(
                    StatusCode::PAYMENT_REQUIRED,
                    &PaymentRequired::rejected(self.challenge()),
                )
            }
            other => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %other, "Paid request failed");
                #[cfg(not(feature = "telemetry"))]
                let _ = other;
                json_response(StatusCode::INTERNAL_SERVER_ERROR, &ErrorResponse::internal())
            }
        }
    }
}

/// Header first, then the query string.
///
/// A blank header defers to the query string. A header that is not UTF-8 is
/// still a presented value, just not a parseable one.
fn extract_payment(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(PAYMENT_HEADER) {
        let value = String::from_utf8_lossy(value.as_bytes());
        if !value.trim().is_empty() {
            return Some(value.into_owned());
        }
    }
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == PAYMENT_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// Adds the receipt header and, for JSON object bodies, the `payment` field.
///
/// A `payment` field already set by the handler is left alone.
async fn attach_receipt(response: Response, receipt: &PaymentReceipt) -> Response {
    let (mut parts, body) = response.into_parts();
    if let Ok(header) = receipt.to_header_value()
        && let Ok(value) = HeaderValue::from_str(&header)
    {
        parts.headers.insert(PAYMENT_RESPONSE_HEADER, value);
    }
    if !is_json(&parts.headers) {
        return Response::from_parts(parts, body);
    }
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return json_response(StatusCode::INTERNAL_SERVER_ERROR, &ErrorResponse::internal());
        }
    };
    let embedded = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(mut object)) if !object.contains_key(RECEIPT_FIELD) => {
            serde_json::to_value(receipt)
                .ok()
                .and_then(|value| {
                    object.insert(RECEIPT_FIELD.to_string(), value);
                    serde_json::to_vec(&object).ok()
                })
        }
        _ => None,
    };
    match embedded {
        Some(bytes) => {
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::X402Paywall;
    use crate::verifier::VerificationMode;
    use alloy_primitives::{Address, address};
    use axum::Json;
    use axum::Router;
    use axum::extract::Extension;
    use axum::routing::{get, post};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use x402_transfer_types::amount::NativeAmount;
    use x402_transfer_types::codec::PaymentCodec;
    use x402_transfer_types::ledger::{InMemoryLedger, LedgerError, TransferStatus};
    use x402_transfer_types::network::{NetworkInfo, NetworkRegistry};
    use x402_transfer_types::proof::{PaymentProof, TransferId};
    use x402_transfer_types::rates::{Pricing, RateTable};

    const PAYER: Address = address!("0x1111111111111111111111111111111111111111");
    const RECEIVER: Address = address!("0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e");

    fn pricing() -> Pricing {
        Pricing::new(
            NetworkRegistry::default().with_network(NetworkInfo::new("test-net", "TST", 18)),
            RateTable::default().with_rate("test-net", Decimal::from(1000)),
        )
    }

    fn spec() -> PriceSpec {
        PriceSpec::from_parts("$0.02".parse().unwrap(), "test-net", RECEIVER)
            .with_description("Summaries")
    }

    fn expected() -> NativeAmount {
        "0.00002".parse().unwrap()
    }

    async fn summary(Extension(receipt): Extension<PaymentReceipt>) -> Json<Value> {
        Json(json!({ "summary": "short", "paidWith": receipt.transfer_id }))
    }

    async fn boom() -> Json<Value> {
        panic!("handler exploded")
    }

    fn app(paywall: &X402Paywall<InMemoryLedger>) -> Router {
        Router::new()
            .route("/summary", post(summary).layer(paywall.with_price(spec())))
            .route("/boom", get(boom).layer(paywall.with_price(spec())))
    }

    fn strict_paywall(ledger: &InMemoryLedger) -> X402Paywall<InMemoryLedger> {
        X402Paywall::new(Verifier::new(ledger.clone(), VerificationMode::strict()).with_pricing(pricing()))
    }

    async fn pay(ledger: &InMemoryLedger) -> PaymentProof {
        ledger.fund(PAYER, "1".parse().unwrap());
        let id = ledger.submit_transfer(PAYER, RECEIVER, expected()).await.unwrap();
        PaymentProof::settled(id, PAYER, RECEIVER, expected(), "test-net".into())
    }

    fn paid_request(uri: &str, method: &str, proof: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(PAYMENT_HEADER, proof)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unpaid_calls_get_the_same_challenge() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let app = app(&paywall);
        let mut bodies = Vec::new();
        for _ in 0..3 {
            let request = http::Request::builder()
                .method("POST")
                .uri("/summary")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
            bodies.push(json_body(response).await);
        }
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
        let body = &bodies[0];
        assert_eq!(body["status"], "payment_required");
        assert_eq!(body["payment"]["amount"], "$0.02");
        assert_eq!(body["payment"]["currency"], "TST");
        assert_eq!(body["payment"]["nativeAmount"], "0.00002");
        assert_eq!(body["payment"]["description"], "Summaries");
        assert!(body["instruction"].is_string());
        assert!(paywall.transaction_log().is_empty().await);
    }

    #[tokio::test]
    async fn accepted_payment_reaches_handler_and_is_logged_once() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let proof = pay(&ledger).await;
        let encoded = PaymentCodec::encode(&proof);

        let response = app(&paywall)
            .oneshot(paid_request("/summary", "POST", &encoded))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let header = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let receipt = PaymentReceipt::from_header_value(&header).unwrap();
        assert!(receipt.verified);

        let body = json_body(response).await;
        assert_eq!(body["summary"], "short");
        assert_eq!(body["paidWith"], proof.transfer_id.as_str());
        assert_eq!(body["payment"]["verified"], true);
        assert_eq!(body["payment"]["txHash"], proof.transfer_id.as_str());

        let entries = paywall.transaction_log().list_recent().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to, RECEIVER);
        assert_eq!(entries[0].service_description, "Summaries");
    }

    #[tokio::test]
    async fn replayed_and_tampered_proofs_are_challenged() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let app = app(&paywall);
        let proof = pay(&ledger).await;
        let encoded = PaymentCodec::encode(&proof);

        let first = app.clone().oneshot(paid_request("/summary", "POST", &encoded)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let replay = app.clone().oneshot(paid_request("/summary", "POST", &encoded)).await.unwrap();
        assert_eq!(replay.status(), StatusCode::PAYMENT_REQUIRED);

        let mut tampered = proof.clone();
        tampered.value = "0.5".parse().unwrap();
        let response = app
            .oneshot(paid_request("/summary", "POST", &PaymentCodec::encode(&tampered)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invalid payment signature or transaction");
        assert!(body.get("instruction").is_none());
        assert!(body.get("reason").is_none());

        assert_eq!(paywall.transaction_log().len().await, 1);
    }

    fn gate<L: LedgerClient>(ledger: L) -> Paygate<L> {
        Paygate {
            verifier: Arc::new(Verifier::new(ledger, VerificationMode::strict()).with_pricing(pricing())),
            log: TransactionLog::new(),
            price: Arc::new(spec()),
            replay_protection: true,
        }
    }

    #[tokio::test]
    async fn rejections_carry_their_reason() {
        let ledger = InMemoryLedger::new();
        let gate = gate(ledger.clone());
        let handler = Router::new().route("/summary", post(summary));
        let proof = pay(&ledger).await;

        let mut tampered = proof.clone();
        tampered.value = "0.5".parse().unwrap();
        let err = gate
            .handle_request_fallible(
                handler.clone(),
                paid_request("/summary", "POST", &PaymentCodec::encode(&tampered)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::AmountMismatch));

        let encoded = PaymentCodec::encode(&proof);
        let first = gate
            .handle_request_fallible(handler.clone(), paid_request("/summary", "POST", &encoded))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let err = gate
            .handle_request_fallible(handler, paid_request("/summary", "POST", &encoded))
            .await
            .unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::ReplayedTransfer));
        assert_eq!(gate.log.len().await, 1);
    }

    struct BrokenLedger;

    impl LedgerClient for BrokenLedger {
        async fn get_balance(&self, _address: Address) -> Result<NativeAmount, LedgerError> {
            Err(LedgerError::Rpc("down".to_string()))
        }

        async fn submit_transfer(
            &self,
            _from: Address,
            _to: Address,
            _amount: NativeAmount,
        ) -> Result<TransferId, LedgerError> {
            Err(LedgerError::Rpc("down".to_string()))
        }

        async fn confirm_transfer(
            &self,
            _transfer_id: &TransferId,
        ) -> Result<Option<TransferStatus>, LedgerError> {
            Err(LedgerError::Rpc("down".to_string()))
        }
    }

    #[tokio::test]
    async fn ledger_failure_is_a_server_error_and_logs_nothing() {
        let paywall = X402Paywall::new(
            Verifier::new(BrokenLedger, VerificationMode::strict()).with_pricing(pricing()),
        );
        let app = Router::new().route("/summary", post(summary).layer(paywall.with_price(spec())));
        let proof = PaymentProof::settled(TransferId::random(), PAYER, RECEIVER, expected(), "test-net".into());

        let response = app
            .oneshot(paid_request("/summary", "POST", &PaymentCodec::encode(&proof)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(paywall.transaction_log().is_empty().await);

        let err = gate(BrokenLedger)
            .handle_request_fallible(
                Router::new().route("/summary", post(summary)),
                paid_request("/summary", "POST", &PaymentCodec::encode(&proof)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::Verifier(VerifierError::Ledger(_))));
        assert_eq!(err.reject_reason(), None);
    }

    #[tokio::test]
    async fn undecodable_header_is_a_rejected_proof() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let request = http::Request::builder()
            .method("POST")
            .uri("/summary")
            .header(PAYMENT_HEADER, HeaderValue::from_bytes(&[0xff, 0xfe, 0x80]).unwrap())
            .body(Body::empty())
            .unwrap();
        let response = app(&paywall).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invalid payment signature or transaction");
        assert!(body.get("instruction").is_none());
    }

    #[tokio::test]
    async fn blank_header_defers_to_query_parameter() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let proof = pay(&ledger).await;
        let request = http::Request::builder()
            .method("POST")
            .uri(format!("/summary?payment={}", PaymentCodec::encode(&proof)))
            .header(PAYMENT_HEADER, " ")
            .body(Body::empty())
            .unwrap();
        let response = app(&paywall).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(paywall.transaction_log().len().await, 1);
    }

    #[tokio::test]
    async fn query_parameter_carries_proof() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let proof = pay(&ledger).await;
        let uri = format!("/summary?payment={}", PaymentCodec::encode(&proof));
        let request = http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app(&paywall).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn permissive_mode_accepts_opaque_token() {
        let ledger = InMemoryLedger::new();
        let paywall = X402Paywall::new(
            Verifier::new(ledger, VerificationMode::Permissive).with_pricing(pricing()),
        );
        let response = app(&paywall)
            .oneshot(paid_request("/summary", "POST", "demo-signature"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["payment"]["verified"], false);
        assert_eq!(body["payment"]["transaction"]["mock"], true);
        assert_eq!(body["payment"]["txHash"], "demo-signature");
        assert!(
            paywall
                .transaction_log()
                .find_by_transfer_id(&TransferId::new("demo-signature"))
                .await
                .is_some()
        );

        let empty = app(&paywall)
            .oneshot(paid_request("/summary", "POST", ""))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(paywall.transaction_log().len().await, 1);
    }

    #[tokio::test]
    async fn handler_panic_is_a_server_error_and_frees_the_transfer() {
        let ledger = InMemoryLedger::new();
        let paywall = strict_paywall(&ledger);
        let proof = pay(&ledger).await;
        let encoded = PaymentCodec::encode(&proof);

        let response = app(&paywall)
            .oneshot(paid_request("/boom", "GET", &encoded))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(paywall.transaction_log().is_empty().await);

        let retry = app(&paywall)
            .oneshot(paid_request("/summary", "POST", &encoded))
            .await
            .unwrap();
        assert_eq!(retry.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_supplied_payment_field_is_kept() {
        let ledger = InMemoryLedger::new();
        let paywall = X402Paywall::new(
            Verifier::new(ledger, VerificationMode::Permissive).with_pricing(pricing()),
        );
        let app = Router::new().route(
            "/own",
            get(|| async { Json(json!({ "payment": "handled" })) }).layer(paywall.with_price(spec())),
        );
        let response = app.oneshot(paid_request("/own", "GET", "token")).await.unwrap();
        assert!(response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        assert_eq!(json_body(response).await["payment"], "handled");
    }
}
