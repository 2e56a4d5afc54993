//! HTTP endpoints of the resource server.
//!
//! `POST /api/agent-call` is the only paid route. Everything else is free:
//! service discovery (`/`, `/api/info`), health, and read access to the
//! transaction log (`/api/transactions`, `/api/payment-status/{txHash}`).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;
use x402_transfer_axum::{TransactionLog, X402Paywall};
use x402_transfer_types::amount::NativeAmount;
use x402_transfer_types::ledger::LedgerClient;
use x402_transfer_types::price::PriceSpec;
use x402_transfer_types::proof::TransferId;
use x402_transfer_types::receipt::PaymentReceipt;
use x402_transfer_types::timestamp::UnixTimestamp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state of the free endpoints.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: String,
    pub price: PriceSpec,
    pub currency: String,
    pub native_amount: Option<NativeAmount>,
    pub log: TransactionLog,
}

impl AppState {
    /// Describes the paid route of `paywall`, sharing its log.
    pub fn new<L>(service: &str, price: PriceSpec, paywall: &X402Paywall<L>) -> Self {
        let pricing = paywall.verifier().pricing();
        let currency = pricing
            .network(&price.network)
            .map(|network| network.currency.clone())
            .unwrap_or_default();
        let native_amount = pricing.native_amount(&price).ok();
        Self {
            service: service.to_string(),
            price,
            currency,
            native_amount,
            log: paywall.transaction_log().clone(),
        }
    }
}

/// All routes, with `/api/agent-call` behind `paywall`.
pub fn routes<L>(paywall: &X402Paywall<L>, state: AppState) -> Router
where
    L: LedgerClient + 'static,
{
    let paid = paywall.with_price(state.price.clone());
    Router::new()
        .route("/", get(get_root))
        .route("/api/agent-call", post(post_agent_call).layer(paid))
        .route("/api/info", get(get_info))
        .route("/api/transactions", get(get_transactions))
        .route("/api/payment-status/{tx_hash}", get(get_payment_status))
        .route("/api/health", get(get_health))
        .fallback(not_found)
        .with_state(Arc::new(state))
}

/// Body of an agent call. Both fields are optional.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AgentCall {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// `POST /api/agent-call`: the paid agent-to-agent service.
///
/// The business logic is a stand-in: it echoes the call. The paywall has
/// already admitted the payment and adds the receipt to the response.
#[instrument(skip_all)]
pub async fn post_agent_call(
    State(state): State<Arc<AppState>>,
    Extension(receipt): Extension<PaymentReceipt>,
    body: Bytes,
) -> impl IntoResponse {
    let call: AgentCall = serde_json::from_slice(&body).unwrap_or_default();
    tracing::info!(
        tx_hash = %receipt.transfer_id,
        action = ?call.action,
        verified = receipt.verified,
        "Agent call"
    );
    Json(json!({
        "success": true,
        "data": {
            "action": call.action,
            "payload": call.payload,
            "result": "Agent service executed successfully",
            "timestamp": UnixTimestamp::now(),
        },
        "service": format!("{} - Agent Service", state.service),
    }))
}

/// `GET /api/info`: what this server sells and how to pay for it.
#[instrument(skip_all)]
pub async fn get_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.service,
        "version": VERSION,
        "description": "Pay-per-request agent services settled with x402 micropayments",
        "network": state.price.network,
        "endpoints": [{
            "path": "/api/agent-call",
            "method": "POST",
            "price": state.price.amount,
            "nativeAmount": state.native_amount,
            "description": state.price.description,
            "parameters": {
                "action": "string - Action to perform",
                "payload": "object - Data for the action",
            },
        }],
        "payment": {
            "currency": state.currency,
            "network": state.price.network,
            "receiverAddress": state.price.recipient_address,
            "protocol": "x402 (HTTP 402 Payment Required)",
        },
    }))
}

/// `GET /api/transactions`: admitted payments, newest first.
#[instrument(skip_all)]
pub async fn get_transactions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let transactions = state.log.list_recent().await;
    Json(json!({
        "success": true,
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

/// `GET /api/payment-status/{txHash}`: the log entry for a transfer.
#[instrument(skip_all, fields(tx_hash = %tx_hash))]
pub async fn get_payment_status(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
) -> impl IntoResponse {
    match state.log.find_by_transfer_id(&TransferId::new(tx_hash)).await {
        Some(entry) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": "found",
                "transaction": entry,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "status": "not_found",
                "message": "Transaction not found in payment logs",
            })),
        ),
    }
}

/// `GET /api/health`
pub async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": UnixTimestamp::now(),
        "service": state.service,
        "version": VERSION,
    }))
}

/// `GET /`
pub async fn get_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.service,
        "version": VERSION,
        "network": state.price.network,
        "endpoints": {
            "api": "/api",
            "health": "/api/health",
            "info": "/api/info",
            "transactions": "/api/transactions",
        },
    }))
}

pub async fn not_found(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": format!("Endpoint {} {} not found", method, uri.path()),
            "service": state.service,
            "availableEndpoints": [
                "GET /",
                "GET /api/info",
                "GET /api/health",
                "GET /api/transactions",
                "GET /api/payment-status/{txHash}",
                "POST /api/agent-call",
            ],
        })),
    )
}
