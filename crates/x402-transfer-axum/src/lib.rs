//! Axum middleware for pay-per-request routes settled by direct ledger transfers.
//!
//! A route wrapped by an [`X402Paywall`] layer answers `402 Payment Required` with
//! a challenge until the caller attaches a payment proof that the [`Verifier`]
//! accepts. Admitted calls see the [`PaymentReceipt`](x402_transfer_types::receipt::PaymentReceipt)
//! as a request extension, get it embedded into JSON responses, and leave one
//! entry in the shared [`TransactionLog`].
//!
//! See [`layer`] for a complete example.
//!
//! ## Feature Flags
//!
//! - `telemetry` - Logs challenges, rejections and admissions with `tracing`

pub mod layer;
pub mod paygate;
pub mod transaction_log;
pub mod verifier;

pub use layer::{PaywallLayer, PaywallService, X402Paywall};
pub use paygate::{Paygate, PaygateError};
pub use transaction_log::{TransactionLog, TransactionLogEntry};
pub use verifier::{
    DEFAULT_CONFIRMATION_TIMEOUT, RejectReason, VerificationMode, VerificationResult, Verifier,
    VerifierError,
};
