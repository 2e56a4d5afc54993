//! Transport encoding for [`PaymentProof`].
//!
//! A proof travels as base64url (no padding) of its JSON form, which is safe both
//! in an `X-Payment` header and in a `?payment=` query parameter. Decoding also
//! accepts standard base64 and raw JSON. Anything else is reported as
//! [`ProofDecodeError::NotStructured`] rather than an error the caller must
//! propagate: permissive verification treats such values as opaque mock tokens.

use crate::proof::PaymentProof;
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofDecodeError {
    #[error("Payment value is empty")]
    Empty,
    #[error("Payment value is not a structured proof")]
    NotStructured,
}

/// Encoder and decoder for the payment transport string.
pub struct PaymentCodec;

impl PaymentCodec {
    /// Encodes the proof exactly as given. Same input, same output.
    pub fn encode(proof: &PaymentProof) -> String {
        // Serializing a struct of strings and bools cannot fail.
        let json = serde_json::to_vec(proof).unwrap_or_default();
        Base64Bytes::encode(json).to_string()
    }

    /// Sets the proof's timestamp to now, then encodes it.
    pub fn encode_now(proof: &mut PaymentProof) -> String {
        proof.timestamp = UnixTimestamp::now();
        Self::encode(proof)
    }

    pub fn decode(raw: &str) -> Result<PaymentProof, ProofDecodeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProofDecodeError::Empty);
        }
        if raw.starts_with('{') {
            return serde_json::from_str(raw).map_err(|_| ProofDecodeError::NotStructured);
        }
        let json = Base64Bytes::from(raw)
            .decode()
            .map_err(|_| ProofDecodeError::NotStructured)?;
        serde_json::from_slice(&json).map_err(|_| ProofDecodeError::NotStructured)
    }
}
