//! The ledger selected by configuration.

use alloy_primitives::Address;
use x402_transfer_eip155::Eip155Ledger;
use x402_transfer_types::amount::NativeAmount;
use x402_transfer_types::ledger::{InMemoryLedger, LedgerClient, LedgerError, TransferStatus};
use x402_transfer_types::proof::TransferId;

use crate::config::{Config, ConfigError, LedgerConfig};

#[derive(Debug, Clone)]
pub enum ServerLedger {
    Eip155(Eip155Ledger),
    InMemory(InMemoryLedger),
}

impl ServerLedger {
    /// Builds the configured ledger. An EVM ledger must be on the network the
    /// route is priced in.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match config.ledger() {
            LedgerConfig::Eip155(ledger) => {
                if &ledger.network != config.network() {
                    return Err(ConfigError::LedgerNetworkMismatch {
                        route: config.network().clone(),
                        ledger: ledger.network.clone(),
                    });
                }
                let ledger = Eip155Ledger::from_config(ledger, &config.network_registry())?;
                Ok(ServerLedger::Eip155(ledger))
            }
            LedgerConfig::InMemory { balances } => {
                let ledger = InMemoryLedger::new();
                for (address, amount) in balances {
                    ledger.fund(*address, *amount);
                }
                tracing::warn!("Using an in-memory ledger: only transfers made through this process can be confirmed");
                Ok(ServerLedger::InMemory(ledger))
            }
        }
    }
}

impl LedgerClient for ServerLedger {
    async fn get_balance(&self, address: Address) -> Result<NativeAmount, LedgerError> {
        match self {
            ServerLedger::Eip155(ledger) => ledger.get_balance(address).await,
            ServerLedger::InMemory(ledger) => ledger.get_balance(address).await,
        }
    }

    async fn submit_transfer(
        &self,
        from: Address,
        to: Address,
        amount: NativeAmount,
    ) -> Result<TransferId, LedgerError> {
        match self {
            ServerLedger::Eip155(ledger) => ledger.submit_transfer(from, to, amount).await,
            ServerLedger::InMemory(ledger) => ledger.submit_transfer(from, to, amount).await,
        }
    }

    async fn confirm_transfer(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<TransferStatus>, LedgerError> {
        match self {
            ServerLedger::Eip155(ledger) => ledger.confirm_transfer(transfer_id).await,
            ServerLedger::InMemory(ledger) => ledger.confirm_transfer(transfer_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(network: &str, ledger: serde_json::Value) -> Config {
        serde_json::from_value(json!({
            "receiver": "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e",
            "network": network,
            "ledger": ledger,
        }))
        .unwrap()
    }

    #[test]
    fn evm_ledger_must_match_the_priced_network() {
        let mismatched = config("avalanche", json!({ "type": "eip155", "network": "avalanche-fuji" }));
        let err = ServerLedger::from_config(&mismatched).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::LedgerNetworkMismatch { ref route, ref ledger }
                if route.as_str() == "avalanche" && ledger.as_str() == "avalanche-fuji"
        ));
    }

    #[test]
    fn in_memory_ledger_is_funded_from_config() {
        let config = config(
            "avalanche-fuji",
            json!({
                "type": "in-memory",
                "balances": { "0x1111111111111111111111111111111111111111": "1.5" }
            }),
        );
        let ServerLedger::InMemory(ledger) = ServerLedger::from_config(&config).unwrap() else {
            panic!("expected in-memory ledger");
        };
        let payer: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        assert_eq!(ledger.balance_of(&payer).to_string(), "1.5");
    }
}
