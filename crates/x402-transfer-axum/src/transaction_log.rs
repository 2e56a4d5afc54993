//! Append-only audit trail of admitted payments.
//!
//! One [`TransactionLog`] is shared by every paid route of a process (it is
//! cheap to clone). Entries are never updated or evicted; retention is the
//! process lifetime.

use alloy_primitives::Address;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use x402_transfer_types::amount::Price;
use x402_transfer_types::network::NetworkId;
use x402_transfer_types::proof::{TransferId, random_hex_id};
use x402_transfer_types::receipt::PaymentReceipt;
use x402_transfer_types::timestamp::UnixTimestamp;

/// Record of one admitted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLogEntry {
    /// Locally generated, distinct from `transfer_id`.
    pub id: String,
    pub timestamp: UnixTimestamp,
    #[serde(rename = "service")]
    pub service_description: String,
    pub amount: Price,
    #[serde(rename = "txHash")]
    pub transfer_id: TransferId,
    pub from: Address,
    pub to: Address,
    pub network: NetworkId,
    pub verified: bool,
}

impl TransactionLogEntry {
    pub fn from_receipt(receipt: &PaymentReceipt, service_description: &str) -> Self {
        Self {
            id: random_hex_id(),
            timestamp: receipt.timestamp,
            service_description: service_description.to_string(),
            amount: receipt.amount.clone(),
            transfer_id: receipt.transfer_id.clone(),
            from: receipt.transaction.from,
            to: receipt.transaction.to,
            network: receipt.network.clone(),
            verified: receipt.verified,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    inner: Arc<TransactionLogInner>,
}

#[derive(Debug, Default)]
struct TransactionLogInner {
    entries: RwLock<Vec<TransactionLogEntry>>,
    claimed: DashSet<TransferId>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. No deduplication: callers record each admission once.
    pub async fn record(&self, entry: TransactionLogEntry) {
        #[cfg(feature = "telemetry")]
        tracing::info!(
            id = %entry.id,
            transfer_id = %entry.transfer_id,
            amount = %entry.amount,
            verified = entry.verified,
            "Payment recorded"
        );
        self.inner.entries.write().await.push(entry);
    }

    /// Most recent entry for a transfer, if any.
    pub async fn find_by_transfer_id(&self, transfer_id: &TransferId) -> Option<TransactionLogEntry> {
        let entries = self.inner.entries.read().await;
        entries
            .iter()
            .rev()
            .find(|entry| entry.transfer_id.matches(transfer_id))
            .cloned()
    }

    /// All entries, newest first.
    pub async fn list_recent(&self) -> Vec<TransactionLogEntry> {
        let mut entries = self.inner.entries.read().await.clone();
        entries.reverse();
        // Stable: entries sharing a second keep newest-append-first order.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Marks a transfer as spent. Returns false if it was already claimed.
    ///
    /// Atomic: of two concurrent claims for the same transfer exactly one wins.
    pub fn try_claim(&self, transfer_id: &TransferId) -> bool {
        let key = TransferId::new(transfer_id.as_str().to_ascii_lowercase());
        self.inner.claimed.insert(key)
    }

    /// Makes a claimed transfer spendable again.
    pub fn release_claim(&self, transfer_id: &TransferId) {
        let key = TransferId::new(transfer_id.as_str().to_ascii_lowercase());
        self.inner.claimed.remove(&key);
    }
}
