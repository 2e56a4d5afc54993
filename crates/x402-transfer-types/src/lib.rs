#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for pay-per-request HTTP 402 transfers.
//!
//! A server marks an endpoint as paid with a [`price::PriceSpec`]. A caller that
//! hits it without paying receives a [`proto::PaymentRequired`] challenge, moves
//! value on a ledger through a [`ledger::LedgerClient`], and retries with a
//! [`proof::PaymentProof`] encoded by [`codec::PaymentCodec`]. Once the server
//! accepts the proof it issues a [`receipt::PaymentReceipt`].
//!
//! # Modules
//!
//! - [`amount`] - Advertised prices and native-unit amounts
//! - [`codec`] - Transport encoding for proofs
//! - [`config`] - Environment-aware configuration values
//! - [`ledger`] - Ledger client interface and an in-memory ledger
//! - [`network`] - Settlement network registry
//! - [`price`] - What a route costs and who gets paid
//! - [`proof`] - Payment proofs and transfer identifiers
//! - [`proto`] - Challenge and error bodies, header names
//! - [`rates`] - USD rate sources and conversion
//! - [`receipt`] - Receipts of admitted payments
//! - [`timestamp`] - Unix timestamps
//! - [`util`] - Base64, literal strings, money amount parsing
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod codec;
pub mod config;
pub mod ledger;
pub mod network;
pub mod price;
pub mod proof;
pub mod proto;
pub mod rates;
pub mod receipt;
pub mod timestamp;
pub mod util;
