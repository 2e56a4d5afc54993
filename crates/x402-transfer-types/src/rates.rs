//! USD to native-unit conversion.
//!
//! Rates are keyed by network. [`RateTable`] is the static implementation of
//! [`RateSource`]; a live price feed can implement the trait itself, for example
//! by refreshing a shared table in the background. Lookups stay synchronous so
//! conversion never waits on the network inside a request.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::amount::{NativeAmount, Price};
use crate::network::{KnownNetworks, NetworkId, NetworkInfo, NetworkRegistry};
use crate::price::{PriceError, PriceSpec};

/// Supplies USD-per-native-unit rates.
pub trait RateSource: Send + Sync {
    /// USD value of one native unit on `network`.
    fn usd_rate(&self, network: &NetworkId) -> Option<Decimal>;
}

impl<T: RateSource + ?Sized> RateSource for Arc<T> {
    fn usd_rate(&self, network: &NetworkId) -> Option<Decimal> {
        (**self).usd_rate(network)
    }
}

/// Fixed rates per network.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<NetworkId, Decimal>,
}

impl RateTable {
    /// Demo rates: 1000 USD per AVAX on Fuji and 50 USD per AVAX on mainnet.
    pub fn demo() -> Self {
        Self::default()
            .with_rate(KnownNetworks::AVALANCHE_FUJI, Decimal::from(1000))
            .with_rate(KnownNetworks::AVALANCHE, Decimal::from(50))
    }

    pub fn with_rate<N: Into<NetworkId>>(mut self, network: N, usd_per_unit: Decimal) -> Self {
        self.rates.insert(network.into(), usd_per_unit);
        self
    }
}

impl RateSource for RateTable {
    fn usd_rate(&self, network: &NetworkId) -> Option<Decimal> {
        self.rates
            .get(network)
            .copied()
            .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
    }
}

/// Networks plus rates: everything needed to turn a [`PriceSpec`] into the exact
/// amount a payer transfers and a verifier expects.
///
/// Both sides of the protocol call [`Pricing::native_amount`], so a correct payer
/// always produces a value that matches the verifier's expectation exactly.
#[derive(Clone)]
pub struct Pricing {
    networks: Arc<NetworkRegistry>,
    rates: Arc<dyn RateSource>,
}

impl Default for Pricing {
    fn default() -> Self {
        Self::new(NetworkRegistry::default(), RateTable::demo())
    }
}

impl std::fmt::Debug for Pricing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pricing")
            .field("networks", &self.networks)
            .finish_non_exhaustive()
    }
}

impl Pricing {
    pub fn new<R: RateSource + 'static>(networks: NetworkRegistry, rates: R) -> Self {
        Self {
            networks: Arc::new(networks),
            rates: Arc::new(rates),
        }
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    pub fn network(&self, id: &NetworkId) -> Result<&NetworkInfo, PriceError> {
        self.networks
            .get(id)
            .ok_or_else(|| PriceError::UnknownNetwork(id.clone()))
    }

    /// Converts `price` into the native unit of `network`.
    ///
    /// USD prices are divided by the network rate; every result is truncated toward
    /// zero at the network's decimal precision.
    pub fn convert(&self, price: &Price, network: &NetworkId) -> Result<NativeAmount, PriceError> {
        let info = self.network(network)?;
        let amount = match price {
            Price::Usd(usd) => {
                let rate = self
                    .rates
                    .usd_rate(network)
                    .ok_or_else(|| PriceError::MissingRate(network.clone()))?;
                let native = usd
                    .as_decimal()
                    .checked_div(rate)
                    .ok_or_else(|| PriceError::MissingRate(network.clone()))?;
                NativeAmount::new(native)?
            }
            Price::Native { amount, symbol } => {
                if !symbol.eq_ignore_ascii_case(&info.currency) {
                    return Err(PriceError::CurrencyMismatch {
                        price: symbol.clone(),
                        network: network.clone(),
                        currency: info.currency.clone(),
                    });
                }
                NativeAmount::from(*amount)
            }
        };
        let amount = amount.truncate(info.decimals);
        if amount.is_zero() {
            return Err(PriceError::ZeroAmount(network.clone()));
        }
        Ok(amount)
    }

    /// The exact amount a proof must carry to satisfy `spec`.
    pub fn native_amount(&self, spec: &PriceSpec) -> Result<NativeAmount, PriceError> {
        self.convert(&spec.amount, &spec.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> Pricing {
        let networks = NetworkRegistry::default().with_network(NetworkInfo::new("test-net", "TST", 6));
        let rates = RateTable::demo().with_rate("test-net", Decimal::from(3));
        Pricing::new(networks, rates)
    }

    #[test]
    fn usd_converts_through_rate() {
        let pricing = pricing();
        let fuji = NetworkId::from("avalanche-fuji");
        let native = pricing.convert(&"$0.02".parse().unwrap(), &fuji).unwrap();
        assert_eq!(native.to_string(), "0.00002");
        let mainnet = NetworkId::from("avalanche");
        let native = pricing.convert(&"$0.01".parse().unwrap(), &mainnet).unwrap();
        assert_eq!(native.to_string(), "0.0002");
    }

    #[test]
    fn conversion_truncates_at_network_precision() {
        let pricing = pricing();
        let native = pricing
            .convert(&"$1".parse().unwrap(), &NetworkId::from("test-net"))
            .unwrap();
        assert_eq!(native.to_string(), "0.333333");
    }

    #[test]
    fn native_price_must_match_network_currency() {
        let pricing = pricing();
        let fuji = NetworkId::from("avalanche-fuji");
        let ok = pricing.convert(&"0.5 AVAX".parse().unwrap(), &fuji).unwrap();
        assert_eq!(ok.to_string(), "0.5");
        let err = pricing.convert(&"0.5 ETH".parse().unwrap(), &fuji).unwrap_err();
        assert!(matches!(err, PriceError::CurrencyMismatch { .. }));
    }

    #[test]
    fn unknown_network_and_missing_rate_fail() {
        let pricing = pricing();
        let err = pricing
            .convert(&"$1".parse().unwrap(), &NetworkId::from("nowhere"))
            .unwrap_err();
        assert_eq!(err, PriceError::UnknownNetwork(NetworkId::from("nowhere")));

        let no_rates = Pricing::new(NetworkRegistry::default(), RateTable::default());
        let err = no_rates
            .convert(&"$1".parse().unwrap(), &NetworkId::from("avalanche"))
            .unwrap_err();
        assert_eq!(err, PriceError::MissingRate(NetworkId::from("avalanche")));
    }

    #[test]
    fn too_small_price_is_rejected() {
        let pricing = pricing();
        let err = pricing
            .convert(&"0.0000001".parse().unwrap(), &NetworkId::from("test-net"))
            .unwrap_err();
        assert_eq!(err, PriceError::ZeroAmount(NetworkId::from("test-net")));
    }
}
