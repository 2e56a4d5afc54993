//! Registry of settlement networks.
//!
//! A network is identified by a short name such as `avalanche-fuji`. Its
//! [`NetworkInfo`] records the native currency, the decimals used by the ledger
//! and the balance buffer a payer keeps aside for gas.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use url::Url;

use crate::amount::NativeAmount;

/// Identifier of a settlement network, e.g. `avalanche-fuji`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static description of a settlement network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub id: NetworkId,
    pub name: String,
    /// EIP-155 chain id, when the network is an EVM chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Symbol of the native currency, e.g. `AVAX`.
    pub currency: String,
    pub decimals: u32,
    /// Amount a payer must hold on top of the price to cover the transfer fee.
    #[serde(default = "network_defaults::gas_buffer")]
    pub gas_buffer: NativeAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<Url>,
}

mod network_defaults {
    use super::*;

    /// 0.001 in the native unit.
    pub fn gas_buffer() -> NativeAmount {
        NativeAmount::new(Decimal::new(1, 3)).unwrap_or_default()
    }
}

impl NetworkInfo {
    /// A network with the default gas buffer and no explorer.
    pub fn new<I: Into<NetworkId>>(id: I, currency: &str, decimals: u32) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            chain_id: None,
            currency: currency.to_string(),
            decimals,
            gas_buffer: network_defaults::gas_buffer(),
            explorer: None,
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_gas_buffer(mut self, gas_buffer: NativeAmount) -> Self {
        self.gas_buffer = gas_buffer;
        self
    }

    /// Explorer link for a transfer, when the network has an explorer.
    pub fn explorer_url(&self, transfer_id: &str) -> Option<Url> {
        let explorer = self.explorer.as_ref()?;
        explorer.join(&format!("tx/{transfer_id}")).ok()
    }
}

/// Avalanche networks known out of the box.
pub struct KnownNetworks;

impl KnownNetworks {
    pub const AVALANCHE_FUJI: &'static str = "avalanche-fuji";
    pub const AVALANCHE: &'static str = "avalanche";

    pub fn avalanche_fuji() -> NetworkInfo {
        let mut info = NetworkInfo::new(Self::AVALANCHE_FUJI, "AVAX", 18).with_chain_id(43113);
        info.name = "Avalanche Fuji Testnet".to_string();
        info.explorer = Url::parse("https://testnet.snowtrace.io/").ok();
        info
    }

    pub fn avalanche() -> NetworkInfo {
        let mut info = NetworkInfo::new(Self::AVALANCHE, "AVAX", 18).with_chain_id(43114);
        info.name = "Avalanche C-Chain".to_string();
        info.explorer = Url::parse("https://snowtrace.io/").ok();
        info
    }

    /// Public RPC endpoint for a known network.
    pub fn default_rpc(network: &NetworkId) -> Option<Url> {
        let url = match network.as_str() {
            Self::AVALANCHE_FUJI => "https://api.avax-test.network/ext/bc/C/rpc",
            Self::AVALANCHE => "https://api.avax.network/ext/bc/C/rpc",
            _ => return None,
        };
        Url::parse(url).ok()
    }
}

/// Network lookup table.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: HashMap<NetworkId, NetworkInfo>,
}

impl Default for NetworkRegistry {
    /// Registry preloaded with [`KnownNetworks`].
    fn default() -> Self {
        Self::empty()
            .with_network(KnownNetworks::avalanche_fuji())
            .with_network(KnownNetworks::avalanche())
    }
}

impl NetworkRegistry {
    pub fn empty() -> Self {
        Self {
            networks: HashMap::new(),
        }
    }

    /// Adds or replaces a network.
    pub fn with_network(mut self, info: NetworkInfo) -> Self {
        self.networks.insert(info.id.clone(), info);
        self
    }

    pub fn get(&self, id: &NetworkId) -> Option<&NetworkInfo> {
        self.networks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkInfo> {
        self.networks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_networks_are_registered() {
        let registry = NetworkRegistry::default();
        let fuji = registry.get(&NetworkId::from("avalanche-fuji")).unwrap();
        assert_eq!(fuji.chain_id, Some(43113));
        assert_eq!(fuji.currency, "AVAX");
        assert_eq!(fuji.gas_buffer.to_string(), "0.001");
        assert_eq!(
            fuji.explorer_url("0xabc").unwrap().as_str(),
            "https://testnet.snowtrace.io/tx/0xabc"
        );
        assert!(registry.get(&NetworkId::from("test-net")).is_none());
    }
}
