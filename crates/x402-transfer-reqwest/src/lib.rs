#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Reqwest middleware that pays HTTP 402 challenges with direct ledger transfers.
//!
//! [`PaymentHandler`] plugs into any `reqwest` client through
//! [`ReqwestWithPayments`]. When a request is answered with `402 Payment Required`,
//! it transfers the demanded amount from the [`Wallet`] to the receiver named in
//! the challenge and retries the request once with the payment proof attached.
//!
//! ```rust,no_run
//! use alloy_primitives::address;
//! use x402_transfer_reqwest::{PaymentHandler, ReqwestWithPayments, ReqwestWithPaymentsBuild, Wallet};
//! use x402_transfer_types::ledger::InMemoryLedger;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = Wallet::connected(
//!     address!("0x1111111111111111111111111111111111111111"),
//!     "avalanche-fuji",
//!     InMemoryLedger::new(),
//! );
//! let client = reqwest::Client::new()
//!     .with_payments(PaymentHandler::new(wallet).with_required_network("avalanche-fuji"))
//!     .build();
//! let response = client.post("http://localhost:3000/api/agent-call").send().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`PayerAgent`] wraps such a client and reports each call as a [`PaymentFlow`].
//!
//! ## Feature Flags
//!
//! - `telemetry` - Emits `tracing` spans and events for payments

mod agent;
mod builder;
pub mod flow;
mod middleware;
mod wallet;

pub use agent::*;
pub use builder::*;
pub use flow::{FlowObserver, FlowStatus, FlowTracker, PaymentFlow};
pub use middleware::*;
pub use wallet::*;
