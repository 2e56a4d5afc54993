#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) ledger for pay-per-request HTTP 402 transfers.
//!
//! [`Eip155Ledger`] implements [`LedgerClient`](x402_transfer_types::ledger::LedgerClient)
//! over an EVM JSON-RPC node using `alloy`. Avalanche C-Chain and Fuji work out of the
//! box; any other EVM chain can be added to the
//! [`NetworkRegistry`](x402_transfer_types::network::NetworkRegistry).
//!
//! ## Feature Flags
//!
//! - `telemetry` - Emits `tracing` spans for every RPC round-trip

pub mod config;
pub mod ledger;

pub use config::{Eip155LedgerConfig, EvmPrivateKey};
pub use ledger::{Eip155Ledger, Eip155LedgerError, TRANSFER_GAS_LIMIT};
