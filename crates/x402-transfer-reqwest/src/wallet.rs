use alloy_primitives::Address;
use x402_transfer_types::amount::NativeAmount;
use x402_transfer_types::ledger::{LedgerClient, LedgerError, TransferStatus};
use x402_transfer_types::network::NetworkId;
use x402_transfer_types::proof::TransferId;

/// The payer's account on a settlement network.
///
/// Key management lives behind the [`LedgerClient`]; the wallet only knows which
/// address it pays from and which network it is on.
#[derive(Debug, Clone)]
pub struct Wallet<L> {
    address: Option<Address>,
    network: NetworkId,
    ledger: L,
}

impl<L> Wallet<L> {
    pub fn connected<N: Into<NetworkId>>(address: Address, network: N, ledger: L) -> Self {
        Self {
            address: Some(address),
            network: network.into(),
            ledger,
        }
    }

    /// A wallet without an account. Every paid call fails its preconditions.
    pub fn disconnected<N: Into<NetworkId>>(network: N, ledger: L) -> Self {
        Self {
            address: None,
            network: network.into(),
            ledger,
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<L: LedgerClient> Wallet<L> {
    pub async fn balance(&self, address: Address) -> Result<NativeAmount, LedgerError> {
        self.ledger.get_balance(address).await
    }

    pub async fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> Result<TransferId, LedgerError> {
        self.ledger.submit_transfer(from, to, amount).await
    }

    pub async fn transfer_status(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        self.ledger.confirm_transfer(transfer_id).await
    }
}
