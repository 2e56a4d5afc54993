//! Decides whether a presented payment satisfies a route's price.
//!
//! Two modes exist, selected when the paywall is built:
//!
//! - [`VerificationMode::Strict`]: the proof must parse, pay the right recipient
//!   the exact converted amount, and be confirmed by the ledger as a settled
//!   transfer from the claimed sender. Mock proofs are refused outright.
//! - [`VerificationMode::Permissive`]: for demos without ledger access. No ledger
//!   round-trip. A parseable proof still has to pay the right recipient the right
//!   amount; any other non-empty value is accepted as an opaque mock token.
//!
//! In both modes a proof naming another network than the route's is
//! `unconfirmed_transfer`: the route's ledger cannot vouch for it.

use alloy_primitives::Address;
use serde::Serialize;
use std::fmt;
use std::fmt::Display;
use std::time::Duration;
use x402_transfer_types::codec::{PaymentCodec, ProofDecodeError};
use x402_transfer_types::ledger::{LedgerClient, LedgerError};
use x402_transfer_types::price::{PriceError, PriceSpec};
use x402_transfer_types::proof::{PaymentProof, TransferId};
use x402_transfer_types::rates::Pricing;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Default bound on the ledger confirmation lookup in strict mode.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    Strict { confirmation_timeout: Duration },
    Permissive,
}

impl Default for VerificationMode {
    fn default() -> Self {
        Self::strict()
    }
}

impl VerificationMode {
    pub fn strict() -> Self {
        Self::Strict {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict { .. })
    }
}

/// Why a proof was rejected. Logged server-side, never sent to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingProof,
    MalformedProof,
    RecipientMismatch,
    AmountMismatch,
    UnconfirmedTransfer,
    SenderMismatch,
    /// The transfer already paid for an earlier admission.
    ReplayedTransfer,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingProof => "missing_proof",
            RejectReason::MalformedProof => "malformed_proof",
            RejectReason::RecipientMismatch => "recipient_mismatch",
            RejectReason::AmountMismatch => "amount_mismatch",
            RejectReason::UnconfirmedTransfer => "unconfirmed_transfer",
            RejectReason::SenderMismatch => "sender_mismatch",
            RejectReason::ReplayedTransfer => "replayed_transfer",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one verification. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub accepted: bool,
    pub proof: Option<PaymentProof>,
    pub reason: Option<RejectReason>,
    /// Whether the ledger confirmed the transfer, as opposed to acceptance on trust.
    pub verified: bool,
}

impl VerificationResult {
    pub fn accept(proof: PaymentProof, verified: bool) -> Self {
        Self {
            accepted: true,
            proof: Some(proof),
            reason: None,
            verified,
        }
    }

    pub fn reject(reason: RejectReason, proof: Option<PaymentProof>) -> Self {
        Self {
            accepted: false,
            proof,
            reason: Some(reason),
            verified: false,
        }
    }
}

/// Failures that are not the caller's fault. Surface as a server error.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("Ledger lookup failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Route price cannot be converted: {0}")]
    Pricing(#[from] PriceError),
}

/// Applies a [`VerificationMode`] using a ledger and the pricing tables.
#[derive(Debug, Clone)]
pub struct Verifier<L> {
    ledger: L,
    pricing: Pricing,
    mode: VerificationMode,
}

impl<L> Verifier<L> {
    pub fn new(ledger: L, mode: VerificationMode) -> Self {
        #[cfg(feature = "telemetry")]
        if !mode.is_strict() {
            tracing::warn!(
                "Permissive payment verification enabled: proofs are accepted without ledger confirmation"
            );
        }
        Self {
            ledger,
            pricing: Pricing::default(),
            mode,
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<L: LedgerClient> Verifier<L> {
    /// Verifies the raw transport value of a proof against `spec`.
    ///
    /// Rejections are ordinary results. `Err` is reserved for ledger failures and
    /// misconfigured prices.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.verify", skip_all, fields(network = %spec.network, strict = self.mode.is_strict()))
    )]
    pub async fn verify(
        &self,
        raw: Option<&str>,
        spec: &PriceSpec,
    ) -> Result<VerificationResult, VerifierError> {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(VerificationResult::reject(RejectReason::MissingProof, None)),
        };
        let expected = self.pricing.native_amount(spec)?;
        let decoded = PaymentCodec::decode(raw);

        match self.mode {
            VerificationMode::Strict {
                confirmation_timeout,
            } => {
                let proof = match decoded {
                    Ok(proof) => proof,
                    Err(_) => {
                        return Ok(VerificationResult::reject(
                            RejectReason::MalformedProof,
                            None,
                        ));
                    }
                };
                if proof.is_mock {
                    return Ok(VerificationResult::reject(
                        RejectReason::UnconfirmedTransfer,
                        Some(proof),
                    ));
                }
                if let Some(reason) = check_terms(&proof, spec, &expected) {
                    return Ok(VerificationResult::reject(reason, Some(proof)));
                }
                let lookup = tokio::time::timeout(
                    confirmation_timeout,
                    self.ledger.confirm_transfer(&proof.transfer_id),
                )
                .await;
                let status = match lookup {
                    Err(_elapsed) => {
                        #[cfg(feature = "telemetry")]
                        tracing::info!(transfer_id = %proof.transfer_id, "Ledger confirmation timed out");
                        None
                    }
                    Ok(result) => result?,
                };
                let status = match status {
                    Some(status) if status.settled => status,
                    _ => {
                        return Ok(VerificationResult::reject(
                            RejectReason::UnconfirmedTransfer,
                            Some(proof),
                        ));
                    }
                };
                if status.to != spec.recipient_address {
                    return Ok(VerificationResult::reject(
                        RejectReason::RecipientMismatch,
                        Some(proof),
                    ));
                }
                if status.value != expected {
                    return Ok(VerificationResult::reject(
                        RejectReason::AmountMismatch,
                        Some(proof),
                    ));
                }
                if status.from != proof.from {
                    return Ok(VerificationResult::reject(
                        RejectReason::SenderMismatch,
                        Some(proof),
                    ));
                }
                Ok(VerificationResult::accept(proof, true))
            }
            VerificationMode::Permissive => match decoded {
                Ok(proof) => match check_terms(&proof, spec, &expected) {
                    Some(reason) => Ok(VerificationResult::reject(reason, Some(proof))),
                    None => Ok(VerificationResult::accept(proof, false)),
                },
                Err(ProofDecodeError::Empty) => {
                    Ok(VerificationResult::reject(RejectReason::MissingProof, None))
                }
                Err(ProofDecodeError::NotStructured) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!("Accepting opaque payment token in permissive mode");
                    let mut placeholder = PaymentProof::mock(
                        Address::ZERO,
                        spec.recipient_address,
                        expected,
                        spec.network.clone(),
                    );
                    placeholder.transfer_id = TransferId::new(raw);
                    Ok(VerificationResult::accept(placeholder, false))
                }
            },
        }
    }
}

/// Network, recipient, then amount. Address comparison is byte-wise, so hex case
/// never matters.
fn check_terms(
    proof: &PaymentProof,
    spec: &PriceSpec,
    expected: &x402_transfer_types::amount::NativeAmount,
) -> Option<RejectReason> {
    if proof.network != spec.network {
        Some(RejectReason::UnconfirmedTransfer)
    } else if proof.to != spec.recipient_address {
        Some(RejectReason::RecipientMismatch)
    } else if &proof.value != expected {
        Some(RejectReason::AmountMismatch)
    } else {
        None
    }
}
