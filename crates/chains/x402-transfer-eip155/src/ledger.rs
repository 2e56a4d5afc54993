//! [`LedgerClient`] over an EVM JSON-RPC node.
//!
//! Transfers are plain native-value transactions (21000 gas). A transfer
//! identifier is the transaction hash; it counts as settled once a successful
//! receipt exists.

use alloy_consensus::Transaction as _;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::sync::Arc;
use url::Url;
use x402_transfer_types::amount::NativeAmount;
use x402_transfer_types::ledger::{LedgerClient, LedgerError, TransferStatus};
use x402_transfer_types::network::{KnownNetworks, NetworkInfo, NetworkRegistry};
use x402_transfer_types::proof::TransferId;

use crate::config::{Eip155LedgerConfig, EvmPrivateKey};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

#[derive(Debug, thiserror::Error)]
pub enum Eip155LedgerError {
    #[error("Unknown network {0}")]
    UnknownNetwork(String),
    #[error("No RPC endpoint configured for {0}")]
    MissingRpc(String),
    #[error("Invalid signer key: {0}")]
    InvalidSigner(String),
}

/// Ledger backed by an EVM chain.
#[derive(Debug, Clone)]
pub struct Eip155Ledger {
    provider: DynProvider,
    network: Arc<NetworkInfo>,
    signers: Arc<Vec<Address>>,
}

impl Eip155Ledger {
    /// Connects without signers. Balances and confirmations only.
    pub fn read_only(rpc: Url, network: NetworkInfo) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc).erased();
        Self {
            provider,
            network: Arc::new(network),
            signers: Arc::new(Vec::new()),
        }
    }

    /// Connects with signers able to submit transfers from their addresses.
    pub fn with_signers(
        rpc: Url,
        network: NetworkInfo,
        keys: &[EvmPrivateKey],
    ) -> Result<Self, Eip155LedgerError> {
        let signers = keys
            .iter()
            .map(|key| {
                PrivateKeySigner::from_bytes(key.as_b256())
                    .map(|signer| signer.with_chain_id(network.chain_id))
                    .map_err(|e| Eip155LedgerError::InvalidSigner(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut iter = signers.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Self::read_only(rpc, network));
        };
        let mut addresses = vec![first.address()];
        let mut wallet = EthereumWallet::from(first);
        for signer in iter {
            addresses.push(signer.address());
            wallet.register_signer(signer);
        }
        #[cfg(feature = "telemetry")]
        tracing::info!(network = %network.id, signers = ?addresses, "Using EVM ledger");
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc)
            .erased();
        Ok(Self {
            provider,
            network: Arc::new(network),
            signers: Arc::new(addresses),
        })
    }

    /// Builds a ledger from configuration, filling the RPC endpoint from the
    /// known networks when omitted.
    pub fn from_config(
        config: &Eip155LedgerConfig,
        networks: &NetworkRegistry,
    ) -> Result<Self, Eip155LedgerError> {
        let network = networks
            .get(&config.network)
            .cloned()
            .ok_or_else(|| Eip155LedgerError::UnknownNetwork(config.network.to_string()))?;
        let rpc = match &config.rpc {
            Some(rpc) => rpc.inner().clone(),
            None => KnownNetworks::default_rpc(&config.network)
                .ok_or_else(|| Eip155LedgerError::MissingRpc(config.network.to_string()))?,
        };
        let keys = config
            .signers
            .iter()
            .map(|key| *key.inner())
            .collect::<Vec<_>>();
        Self::with_signers(rpc, network, &keys)
    }

    pub fn network(&self) -> &NetworkInfo {
        &self.network
    }

    pub fn signer_addresses(&self) -> &[Address] {
        &self.signers
    }
}

fn rpc_error<E: std::fmt::Display>(error: E) -> LedgerError {
    LedgerError::Rpc(error.to_string())
}

impl LedgerClient for Eip155Ledger {
    #[cfg_attr(feature = "telemetry", instrument(name = "eip155.get_balance", skip(self), err))]
    async fn get_balance(&self, address: Address) -> Result<NativeAmount, LedgerError> {
        let wei = self.provider.get_balance(address).await.map_err(rpc_error)?;
        NativeAmount::from_base_units(wei, self.network.decimals)
            .map_err(|e| LedgerError::Rejected(e.to_string()))
    }

    #[cfg_attr(feature = "telemetry", instrument(name = "eip155.submit_transfer", skip(self), err))]
    async fn submit_transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> Result<TransferId, LedgerError> {
        if !self.signers.contains(&from) {
            return Err(LedgerError::UnknownSigner(from));
        }
        let value = amount
            .to_base_units(self.network.decimals)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value)
            .with_gas_limit(TRANSFER_GAS_LIMIT);
        let pending = self.provider.send_transaction(tx).await.map_err(rpc_error)?;
        let transfer_id = TransferId::new(pending.tx_hash().to_string());
        #[cfg(feature = "telemetry")]
        tracing::info!(%transfer_id, explorer = ?self.network.explorer_url(transfer_id.as_str()), "Transfer submitted");
        Ok(transfer_id)
    }

    #[cfg_attr(feature = "telemetry", instrument(name = "eip155.confirm_transfer", skip(self), err))]
    async fn confirm_transfer(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        let Ok(hash) = transfer_id.as_str().parse::<B256>() else {
            return Ok(None);
        };
        let Some(tx) = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_error)?
        else {
            return Ok(None);
        };
        let value = NativeAmount::from_base_units(tx.value(), self.network.decimals)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?;
        let status = match receipt {
            Some(receipt) => TransferStatus {
                from: receipt.from,
                to: receipt.to.unwrap_or_default(),
                value,
                settled: receipt.status(),
            },
            None => TransferStatus {
                from: tx.inner.signer(),
                to: tx.to().unwrap_or_default(),
                value,
                settled: false,
            },
        };
        Ok(Some(status))
    }
}
