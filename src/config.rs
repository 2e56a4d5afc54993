//! Configuration of the resource server.
//!
//! Read from the JSON file named by `--config` or `$CONFIG` (default
//! `config.json`). Values that hold secrets or deployment details may reference
//! environment variables as `$VAR` or `${VAR}`:
//!
//! ```json
//! {
//!   "port": 3004,
//!   "receiver": "$RECEIVER_ADDRESS",
//!   "network": "avalanche-fuji",
//!   "price": "$0.01",
//!   "verification": { "mode": "strict", "confirmation_timeout_secs": 10 },
//!   "ledger": { "type": "eip155", "network": "avalanche-fuji", "rpc": "$AVALANCHE_RPC_URL" }
//! }
//! ```

use alloy_primitives::Address;
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use x402_transfer_axum::VerificationMode;
use x402_transfer_eip155::{Eip155LedgerConfig, Eip155LedgerError};
use x402_transfer_types::amount::{NativeAmount, Price};
use x402_transfer_types::config::LiteralOrEnv;
use x402_transfer_types::network::{NetworkId, NetworkInfo, NetworkRegistry};
use x402_transfer_types::price::{PriceError, PriceSpec};
use x402_transfer_types::rates::{Pricing, RateTable};

/// CLI arguments for the resource server.
#[derive(Parser, Debug)]
#[command(name = "x402-transfer")]
#[command(about = "Pay-per-request HTTP 402 resource server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid price: {0}")]
    Price(#[from] PriceError),
    #[error("Invalid ledger: {0}")]
    Ledger(#[from] Eip155LedgerError),
    #[error("Ledger network {ledger} does not match the priced network {route}")]
    LedgerNetworkMismatch { route: NetworkId, ledger: NetworkId },
}

/// Server configuration.
///
/// `host` and `port` fall back to `$HOST` and `$PORT`, then to `0.0.0.0:3004`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_service")]
    service: String,
    receiver: LiteralOrEnv<Address>,
    #[serde(default = "config_defaults::default_network")]
    network: NetworkId,
    /// Defaults to `$0.01`.
    #[serde(default)]
    price: Option<Price>,
    #[serde(default = "config_defaults::default_description")]
    description: String,
    #[serde(default)]
    verification: VerificationConfig,
    /// Overrides the mode's default replay protection.
    #[serde(default)]
    replay_protection: Option<bool>,
    #[serde(default)]
    ledger: LedgerConfig,
    /// Networks added to the built-in Avalanche ones.
    #[serde(default)]
    networks: Vec<NetworkInfo>,
    /// USD per native unit, on top of the demo rates.
    #[serde(default)]
    rates: HashMap<NetworkId, Decimal>,
}

/// How payment proofs are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VerificationConfig {
    Strict {
        #[serde(default = "config_defaults::default_confirmation_timeout_secs")]
        confirmation_timeout_secs: u64,
    },
    Permissive,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        VerificationConfig::Strict {
            confirmation_timeout_secs: config_defaults::default_confirmation_timeout_secs(),
        }
    }
}

impl From<VerificationConfig> for VerificationMode {
    fn from(value: VerificationConfig) -> Self {
        match value {
            VerificationConfig::Strict {
                confirmation_timeout_secs,
            } => VerificationMode::Strict {
                confirmation_timeout: Duration::from_secs(confirmation_timeout_secs),
            },
            VerificationConfig::Permissive => VerificationMode::Permissive,
        }
    }
}

/// Where transfers are confirmed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LedgerConfig {
    /// An EVM chain reached over JSON-RPC.
    Eip155(Eip155LedgerConfig),
    /// A process-local ledger, for demos and tests.
    InMemory {
        #[serde(default)]
        balances: HashMap<Address, NativeAmount>,
    },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::InMemory {
            balances: HashMap::new(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};
    use x402_transfer_types::network::{KnownNetworks, NetworkId};

    pub const DEFAULT_PORT: u16 = 3004;
    pub const DEFAULT_PRICE: &str = "$0.01";
    pub const DEFAULT_SERVICE: &str = "Universal Agent Wallet";
    pub const DEFAULT_DESCRIPTION: &str = "Agent-to-Agent Service Call";

    /// `$PORT`, else 3004.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST`, else 0.0.0.0.
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn default_service() -> String {
        DEFAULT_SERVICE.to_string()
    }

    pub fn default_network() -> NetworkId {
        NetworkId::from(KnownNetworks::AVALANCHE_FUJI)
    }

    pub fn default_description() -> String {
        DEFAULT_DESCRIPTION.to_string()
    }

    pub fn default_confirmation_timeout_secs() -> u64 {
        10
    }
}

impl Config {
    /// Loads the file named on the command line.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn receiver(&self) -> Address {
        *self.receiver.inner()
    }

    pub fn network(&self) -> &NetworkId {
        &self.network
    }

    pub fn verification_mode(&self) -> VerificationMode {
        self.verification.into()
    }

    pub fn replay_protection(&self) -> Option<bool> {
        self.replay_protection
    }

    pub fn ledger(&self) -> &LedgerConfig {
        &self.ledger
    }

    pub fn network_registry(&self) -> NetworkRegistry {
        self.networks
            .iter()
            .cloned()
            .fold(NetworkRegistry::default(), NetworkRegistry::with_network)
    }

    pub fn pricing(&self) -> Pricing {
        let rates = self
            .rates
            .iter()
            .fold(RateTable::demo(), |table, (network, rate)| {
                table.with_rate(network.clone(), *rate)
            });
        Pricing::new(self.network_registry(), rates)
    }

    /// Price of the paid agent-call route. Fails if it cannot be converted
    /// into the network's native unit.
    pub fn price_spec(&self) -> Result<PriceSpec, ConfigError> {
        let price = match &self.price {
            Some(price) => price.clone(),
            None => config_defaults::DEFAULT_PRICE
                .parse::<Price>()
                .map_err(PriceError::from)?,
        };
        let spec = PriceSpec::from_parts(price, self.network.clone(), self.receiver())
            .with_description(self.description.clone());
        self.pricing().native_amount(&spec)?;
        Ok(spec)
    }
}
