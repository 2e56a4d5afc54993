//! Pay-per-request HTTP 402 resource server entrypoint.
//!
//! Endpoints:
//! - `POST /api/agent-call` - Paid agent-to-agent call
//! - `GET /api/info` - Price, network and receiver of the paid route
//! - `GET /api/transactions` - Admitted payments, newest first
//! - `GET /api/payment-status/{txHash}` - Log entry of one transfer
//! - `GET /api/health` - Liveness
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` names the JSON configuration file
//! - `HOST`, `PORT` control binding address
//! - `OTEL_*` variables enable OTLP export of traces and metrics

use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower_http::cors;
use x402_transfer::config::Config;
use x402_transfer::ledger::ServerLedger;
use x402_transfer::sig_down::SigDown;
use x402_transfer::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let ledger = ServerLedger::from_config(&config)?;
    let paywall = x402_transfer::paywall(&config, ledger);

    let http_endpoints = x402_transfer::app(&config, &paywall)?
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;
    sig_down.shutdown().await;

    Ok(())
}
