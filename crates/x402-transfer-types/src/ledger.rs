//! Interface to a balance-bearing settlement network.
//!
//! The protocol only needs three things from a ledger: a balance, a way to move
//! value from A to B, and a later answer to "did transfer X settle, and between
//! whom". [`LedgerClient`] captures exactly that. [`InMemoryLedger`] implements it
//! in process for tests and demo deployments.

use alloy_primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::amount::NativeAmount;
use crate::proof::TransferId;

/// Status of a transfer as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub from: Address,
    pub to: Address,
    pub value: NativeAmount,
    pub settled: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("No signer available for {0}")]
    UnknownSigner(Address),
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds {
        required: NativeAmount,
        available: NativeAmount,
    },
    #[error("Transfer rejected: {0}")]
    Rejected(String),
    #[error("Ledger RPC failure: {0}")]
    Rpc(String),
}

/// A network that moves value and answers whether a transfer settled.
pub trait LedgerClient: Send + Sync {
    /// Current balance of `address` in the native unit.
    fn get_balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<NativeAmount, LedgerError>> + Send;

    /// Submits a transfer signed by `from`. The returned identifier may still be pending.
    fn submit_transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> impl Future<Output = Result<TransferId, LedgerError>> + Send;

    /// Looks a transfer up. `Ok(None)` means the ledger does not know it.
    fn confirm_transfer(
        &self,
        transfer_id: &TransferId,
    ) -> impl Future<Output = Result<Option<TransferStatus>, LedgerError>> + Send;
}

impl<T: LedgerClient> LedgerClient for Arc<T> {
    fn get_balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<NativeAmount, LedgerError>> + Send {
        (**self).get_balance(address)
    }

    fn submit_transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> impl Future<Output = Result<TransferId, LedgerError>> + Send {
        (**self).submit_transfer(from, to, amount)
    }

    fn confirm_transfer(
        &self,
        transfer_id: &TransferId,
    ) -> impl Future<Output = Result<Option<TransferStatus>, LedgerError>> + Send {
        (**self).confirm_transfer(transfer_id)
    }
}

/// Process-local ledger shared by cloning.
///
/// Transfers settle immediately unless [`InMemoryLedger::with_manual_settlement`]
/// is used, in which case they stay pending until [`InMemoryLedger::settle`].
/// Submission can be forced to fail with [`InMemoryLedger::fail_submissions`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<InMemoryLedgerInner>,
}

#[derive(Debug, Default)]
struct InMemoryLedgerInner {
    balances: DashMap<Address, NativeAmount>,
    transfers: DashMap<TransferId, TransferStatus>,
    submissions: AtomicUsize,
    manual_settlement: AtomicBool,
    fail_submissions: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manual_settlement(self) -> Self {
        self.inner.manual_settlement.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.inner.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Credits `amount` to `address`.
    pub fn fund(&self, address: Address, amount: NativeAmount) {
        let mut balance = self.inner.balances.entry(address).or_default();
        *balance = *balance + amount;
    }

    /// Marks a pending transfer as settled. Returns false for unknown transfers.
    pub fn settle(&self, transfer_id: &TransferId) -> bool {
        match self.inner.transfers.get_mut(transfer_id) {
            Some(mut status) => {
                status.settled = true;
                true
            }
            None => false,
        }
    }

    /// Transfers submitted but not settled yet.
    pub fn pending_transfers(&self) -> Vec<TransferId> {
        self.inner
            .transfers
            .iter()
            .filter(|entry| !entry.value().settled)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of submission attempts seen so far, failed ones included.
    pub fn submission_count(&self) -> usize {
        self.inner.submissions.load(Ordering::SeqCst)
    }

    pub fn balance_of(&self, address: &Address) -> NativeAmount {
        self.inner
            .balances
            .get(address)
            .map(|balance| *balance)
            .unwrap_or_default()
    }
}

impl LedgerClient for InMemoryLedger {
    async fn get_balance(&self, address: Address) -> Result<NativeAmount, LedgerError> {
        Ok(self.balance_of(&address))
    }

    async fn submit_transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> Result<TransferId, LedgerError> {
        self.inner.submissions.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_submissions.load(Ordering::SeqCst) {
            return Err(LedgerError::Rpc("submission disabled".to_string()));
        }
        {
            let mut balance = self.inner.balances.entry(from).or_default();
            if *balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available: *balance,
                });
            }
            let remaining = balance.as_decimal() - amount.as_decimal();
            *balance = NativeAmount::new(remaining).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        }
        self.fund(to, amount);
        let transfer_id = TransferId::random();
        let settled = !self.inner.manual_settlement.load(Ordering::SeqCst);
        self.inner.transfers.insert(
            transfer_id.clone(),
            TransferStatus {
                from,
                to,
                value: amount,
                settled,
            },
        );
        #[cfg(feature = "telemetry")]
        tracing::debug!(%transfer_id, %from, %to, %amount, settled, "In-memory transfer recorded");
        Ok(transfer_id)
    }

    async fn confirm_transfer(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        Ok(self
            .inner
            .transfers
            .get(transfer_id)
            .map(|status| status.clone()))
    }
}
