//! Price of a protected route.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::amount::{AmountError, Price};
use crate::network::NetworkId;
use crate::util::MoneyAmountParseError;

/// Errors raised while building a [`PriceSpec`] or converting it to a native amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("Invalid price: {0}")]
    InvalidAmount(#[from] MoneyAmountParseError),
    #[error("Invalid recipient address {address}: {reason}")]
    InvalidRecipient { address: String, reason: String },
    #[error("Unknown network {0}")]
    UnknownNetwork(NetworkId),
    #[error("No USD rate configured for network {0}")]
    MissingRate(NetworkId),
    #[error("Price is in {price} but network {network} settles in {currency}")]
    CurrencyMismatch {
        price: String,
        network: NetworkId,
        currency: String,
    },
    #[error("Price converts to zero on network {0}")]
    ZeroAmount(NetworkId),
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// What a protected endpoint costs and who gets paid.
///
/// Built once when the route is registered. The amount is always positive and the
/// recipient always a well-formed address, since both are checked here.
///
/// ```
/// use x402_transfer_types::price::PriceSpec;
///
/// let spec = PriceSpec::new("$0.02", "avalanche-fuji", "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e")
///     .unwrap()
///     .with_description("Agent-to-Agent Service Call");
/// assert_eq!(spec.amount.to_string(), "$0.02");
///
/// assert!(PriceSpec::new("$0", "avalanche-fuji", "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e").is_err());
/// assert!(PriceSpec::new("$0.02", "avalanche-fuji", "0xRECV").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSpec {
    pub amount: Price,
    pub network: NetworkId,
    pub description: String,
    pub recipient_address: Address,
}

impl PriceSpec {
    /// Parses the amount and the recipient address.
    pub fn new<N: Into<NetworkId>>(
        amount: &str,
        network: N,
        recipient_address: &str,
    ) -> Result<Self, PriceError> {
        let amount = amount.parse::<Price>()?;
        let recipient_address =
            recipient_address
                .parse::<Address>()
                .map_err(|e| PriceError::InvalidRecipient {
                    address: recipient_address.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Self::from_parts(amount, network, recipient_address))
    }

    pub fn from_parts<N: Into<NetworkId>>(
        amount: Price,
        network: N,
        recipient_address: Address,
    ) -> Self {
        Self {
            amount,
            network: network.into(),
            description: String::new(),
            recipient_address,
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_parsing_is_case_insensitive() {
        let lower = PriceSpec::new("$0.01", "test-net", "0x742d35cc6634c0532925a3b844bc9e7595f5bb0e")
            .unwrap();
        let upper = PriceSpec::new("$0.01", "test-net", "0x742D35CC6634C0532925A3B844BC9E7595F5BB0E")
            .unwrap();
        assert_eq!(lower.recipient_address, upper.recipient_address);
    }

    #[test]
    fn serializes_camel_case() {
        let spec = PriceSpec::new("0.5 AVAX", "avalanche", "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e")
            .unwrap()
            .with_description("Premium");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["amount"], "0.5 AVAX");
        assert_eq!(json["network"], "avalanche");
        assert_eq!(json["description"], "Premium");
        assert!(json["recipientAddress"].is_string());
    }
}
