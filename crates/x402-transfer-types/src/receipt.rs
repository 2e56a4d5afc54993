//! Receipt of an admitted payment.

use serde::{Deserialize, Serialize};

use crate::amount::Price;
use crate::network::NetworkId;
use crate::proof::{PaymentProof, TransferId};
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

/// What the paywall hands to the business handler and embeds in its response.
///
/// `verified` is true only when the ledger confirmed the transfer; receipts
/// issued in permissive mode are accepted on trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub amount: Price,
    pub network: NetworkId,
    pub timestamp: UnixTimestamp,
    #[serde(rename = "txHash", alias = "transferId")]
    pub transfer_id: TransferId,
    pub transaction: PaymentProof,
    pub verified: bool,
}

impl PaymentReceipt {
    pub fn new(amount: Price, proof: PaymentProof, verified: bool) -> Self {
        Self {
            amount,
            network: proof.network.clone(),
            timestamp: UnixTimestamp::now(),
            transfer_id: proof.transfer_id.clone(),
            transaction: proof,
            verified,
        }
    }

    /// Base64 JSON form used for the `X-Payment-Response` header.
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    pub fn from_header_value(value: &str) -> Option<Self> {
        let json = Base64Bytes::from(value).decode().ok()?;
        serde_json::from_slice(&json).ok()
    }
}
