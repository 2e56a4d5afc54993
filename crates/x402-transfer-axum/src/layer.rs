//! Axum middleware that puts routes behind an HTTP 402 paywall.
//!
//! Build one [`X402Paywall`] per application and derive a layer per paid route
//! with [`X402Paywall::with_price`]. All layers share the same verifier and
//! [`TransactionLog`].
//!
//! ```rust
//! use axum::{Json, Router, routing::post};
//! use serde_json::{Value, json};
//! use x402_transfer_axum::{VerificationMode, Verifier, X402Paywall};
//! use x402_transfer_types::ledger::InMemoryLedger;
//! use x402_transfer_types::price::PriceSpec;
//!
//! let paywall = X402Paywall::new(Verifier::new(InMemoryLedger::new(), VerificationMode::strict()));
//! let price = PriceSpec::new(
//!     "$0.01",
//!     "avalanche-fuji",
//!     "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e",
//! )
//! .unwrap()
//! .with_description("Agent-to-Agent Service Call");
//!
//! let app: Router = Router::new().route("/api/agent-call", post(call).layer(paywall.with_price(price)));
//!
//! async fn call() -> Json<Value> {
//!     Json(json!({ "success": true }))
//! }
//! ```
//!
//! Replay protection is on by default in strict mode and off in permissive mode;
//! see [`X402Paywall::with_replay_protection`].

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use x402_transfer_types::ledger::LedgerClient;
use x402_transfer_types::price::PriceSpec;

use crate::paygate::Paygate;
use crate::transaction_log::TransactionLog;
use crate::verifier::Verifier;

/// Shared paywall configuration.
#[derive(Debug)]
pub struct X402Paywall<L> {
    verifier: Arc<Verifier<L>>,
    log: TransactionLog,
    replay_protection: bool,
}

impl<L> Clone for X402Paywall<L> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            replay_protection: self.replay_protection,
        }
    }
}

impl<L> X402Paywall<L> {
    pub fn new(verifier: Verifier<L>) -> Self {
        let replay_protection = verifier.mode().is_strict();
        Self {
            verifier: Arc::new(verifier),
            log: TransactionLog::new(),
            replay_protection,
        }
    }

    /// Uses an existing log, e.g. one also read by listing endpoints.
    pub fn with_transaction_log(mut self, log: TransactionLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_replay_protection(mut self, enabled: bool) -> Self {
        self.replay_protection = enabled;
        self
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn verifier(&self) -> &Verifier<L> {
        &self.verifier
    }

    /// Layer charging `price` for every call to the wrapped route.
    pub fn with_price(&self, price: PriceSpec) -> PaywallLayer<L> {
        PaywallLayer {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            price: Arc::new(price),
            replay_protection: self.replay_protection,
        }
    }
}

#[derive(Debug)]
pub struct PaywallLayer<L> {
    verifier: Arc<Verifier<L>>,
    log: TransactionLog,
    price: Arc<PriceSpec>,
    replay_protection: bool,
}

impl<L> Clone for PaywallLayer<L> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            price: self.price.clone(),
            replay_protection: self.replay_protection,
        }
    }
}

impl<L> PaywallLayer<L> {
    pub fn price(&self) -> &PriceSpec {
        &self.price
    }
}

impl<S, L> Layer<S> for PaywallLayer<L>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaywallService<L>;

    fn layer(&self, inner: S) -> Self::Service {
        PaywallService {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            price: self.price.clone(),
            replay_protection: self.replay_protection,
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service enforcing payment in front of the wrapped handler.
pub struct PaywallService<L> {
    verifier: Arc<Verifier<L>>,
    log: TransactionLog,
    price: Arc<PriceSpec>,
    replay_protection: bool,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<L> Clone for PaywallService<L> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            price: self.price.clone(),
            replay_protection: self.replay_protection,
            inner: self.inner.clone(),
        }
    }
}

impl<L> Service<Request> for PaywallService<L>
where
    L: LedgerClient + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            verifier: self.verifier.clone(),
            log: self.log.clone(),
            price: self.price.clone(),
            replay_protection: self.replay_protection,
        };
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
