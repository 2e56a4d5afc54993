//! Payment proofs presented by a payer.

use alloy_primitives::Address;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

use crate::amount::NativeAmount;
use crate::network::NetworkId;
use crate::timestamp::UnixTimestamp;

/// Ledger-assigned identifier of a transfer, typically a transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// A random `0x`-prefixed 32-byte hex identifier.
    pub fn random() -> Self {
        Self(random_hex_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison for hex hashes coming from different sources.
    pub fn matches(&self, other: &TransferId) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl From<&str> for TransferId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `0x` followed by 64 random hex digits.
pub fn random_hex_id() -> String {
    let bytes: [u8; 32] = rng().random();
    format!("0x{}", hex::encode(bytes))
}

/// Evidence that a transfer was made.
///
/// Real proofs are built by [`PaymentProof::settled`] right after the payer's
/// transfer is submitted. Placeholders for demo deployments come only from
/// [`PaymentProof::mock`] and always carry `mock: true`, so a strict verifier can
/// refuse them without looking further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    #[serde(rename = "txHash", alias = "transferId")]
    pub transfer_id: TransferId,
    pub from: Address,
    pub to: Address,
    pub value: NativeAmount,
    pub network: NetworkId,
    pub timestamp: UnixTimestamp,
    #[serde(rename = "mock", alias = "isMock", default)]
    pub is_mock: bool,
}

impl PaymentProof {
    /// Proof for a transfer the ledger accepted.
    pub fn settled(
        transfer_id: TransferId,
        from: Address,
        to: Address,
        value: NativeAmount,
        network: NetworkId,
    ) -> Self {
        Self {
            transfer_id,
            from,
            to,
            value,
            network,
            timestamp: UnixTimestamp::now(),
            is_mock: false,
        }
    }

    /// Placeholder proof that no ledger will ever confirm.
    ///
    /// Gets a fresh random transfer identifier.
    pub fn mock(from: Address, to: Address, value: NativeAmount, network: NetworkId) -> Self {
        Self {
            transfer_id: TransferId::random(),
            from,
            to,
            value,
            network,
            timestamp: UnixTimestamp::now(),
            is_mock: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn random_ids_are_32_bytes_of_hex() {
        let id = TransferId::random();
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().starts_with("0x"));
        assert_ne!(id, TransferId::random());
    }

    #[test]
    fn accepts_legacy_field_aliases() {
        let json = r#"{
            "transferId": "0xabc",
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "value": "0.00002",
            "network": "avalanche-fuji",
            "timestamp": 1700000000,
            "isMock": true
        }"#;
        let proof: PaymentProof = serde_json::from_str(json).unwrap();
        assert_eq!(proof.transfer_id, TransferId::from("0xabc"));
        assert_eq!(proof.to, address!("0x0000000000000000000000000000000000000002"));
        assert!(proof.is_mock);
    }

    #[test]
    fn mock_flag_defaults_to_false() {
        let proof = PaymentProof::settled(
            TransferId::from("0x01"),
            Address::ZERO,
            Address::ZERO,
            "1".parse().unwrap(),
            NetworkId::from("test-net"),
        );
        let mut json = serde_json::to_value(&proof).unwrap();
        json.as_object_mut().unwrap().remove("mock");
        let back: PaymentProof = serde_json::from_value(json).unwrap();
        assert!(!back.is_mock);
        assert_eq!(back, proof);
    }
}
