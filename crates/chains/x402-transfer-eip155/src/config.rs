use alloy_primitives::B256;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use url::Url;
use x402_transfer_types::config::LiteralOrEnv;
use x402_transfer_types::network::NetworkId;

/// Connection settings for an EVM ledger.
///
/// ```json
/// {
///   "network": "avalanche-fuji",
///   "rpc": "$AVALANCHE_RPC_URL",
///   "signers": ["${PAYER_PRIVATE_KEY}"]
/// }
/// ```
///
/// `rpc` may be omitted for networks with a known public endpoint. Without
/// signers the ledger is read-only, which is all a verifying server needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Eip155LedgerConfig {
    pub network: NetworkId,
    #[serde(default)]
    pub rpc: Option<LiteralOrEnv<Url>>,
    #[serde(default)]
    pub signers: Vec<LiteralOrEnv<EvmPrivateKey>>,
}

/// A validated 32-byte EVM private key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Debug for EvmPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvmPrivateKey(<redacted>)")
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid evm private key: {e}"))
    }
}
