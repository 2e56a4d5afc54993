//! Pay-per-request HTTP 402 resource server.
//!
//! Serves agent-to-agent calls behind an x402 paywall. A caller pays with a
//! direct value transfer on the configured ledger and presents the proof in the
//! `X-Payment` header; admitted payments are kept in an in-process
//! transaction log that the free endpoints expose.
//!
//! # Modules
//!
//! - [`config`] - JSON configuration with environment references
//! - [`handlers`] - HTTP routes
//! - [`ledger`] - The ledger selected by configuration
//! - [`sig_down`] - Graceful shutdown on SIGTERM and SIGINT
//! - [`telemetry`] - Logging, tracing and OTLP export
//!
//! The paywall itself lives in `x402-transfer-axum`, the paying client in
//! `x402-transfer-reqwest`.

pub mod config;
pub mod handlers;
pub mod ledger;
pub mod sig_down;
pub mod telemetry;

use axum::Router;
use x402_transfer_axum::{Verifier, X402Paywall};
use x402_transfer_types::ledger::LedgerClient;

use crate::config::{Config, ConfigError};
use crate::handlers::AppState;

/// The paywall described by `config`, checking proofs against `ledger`.
pub fn paywall<L: LedgerClient>(config: &Config, ledger: L) -> X402Paywall<L> {
    let verifier =
        Verifier::new(ledger, config.verification_mode()).with_pricing(config.pricing());
    let paywall = X402Paywall::new(verifier);
    match config.replay_protection() {
        Some(enabled) => paywall.with_replay_protection(enabled),
        None => paywall,
    }
}

/// All HTTP routes, without the tracing and CORS layers.
pub fn app<L: LedgerClient + 'static>(
    config: &Config,
    paywall: &X402Paywall<L>,
) -> Result<Router, ConfigError> {
    let price = config.price_spec()?;
    tracing::info!(
        price = %price.amount,
        network = %price.network,
        receiver = %price.recipient_address,
        "Paid route /api/agent-call"
    );
    let state = AppState::new(config.service(), price, paywall);
    Ok(handlers::routes(paywall, state))
}
