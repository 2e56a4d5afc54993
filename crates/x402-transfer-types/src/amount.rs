//! Prices and native-unit amounts.
//!
//! A [`Price`] is what a protected route advertises: either a USD figure that is
//! converted through the rate table, or an amount already expressed in the
//! settlement network's native unit. A [`NativeAmount`] is what actually moves on
//! the ledger and what a proof claims was transferred.

use alloy_primitives::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::fmt::Display;
use std::ops::Add;
use std::str::FromStr;

use crate::util::{MoneyAmount, MoneyAmountParseError};

/// Errors produced when converting between decimal amounts and ledger base units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    InvalidFormat(String),
    #[error("Negative amount is not allowed")]
    Negative,
    #[error("Amount does not fit into {decimals} decimals")]
    Overflow { decimals: u32 },
}

/// A non-negative amount in a network's native unit, e.g. `0.00002` AVAX.
///
/// Equality is numeric: `0.020` equals `0.02`. Carried on the wire as a decimal string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct NativeAmount(Decimal);

impl NativeAmount {
    pub const ZERO: NativeAmount = NativeAmount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(value.normalize()))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Truncates toward zero to the given number of decimal places.
    pub fn truncate(&self, decimals: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
                .normalize(),
        )
    }

    /// Converts into integer base units, e.g. wei for an 18-decimal network.
    ///
    /// Digits beyond `decimals` are truncated.
    pub fn to_base_units(&self, decimals: u32) -> Result<U256, AmountError> {
        let truncated = self.truncate(decimals).0;
        let mantissa = u128::try_from(truncated.mantissa()).map_err(|_| AmountError::Negative)?;
        let exponent = decimals - truncated.scale();
        U256::from(10u8)
            .checked_pow(U256::from(exponent))
            .and_then(|factor| U256::from(mantissa).checked_mul(factor))
            .ok_or(AmountError::Overflow { decimals })
    }

    /// Converts integer base units back into a decimal amount.
    pub fn from_base_units(value: U256, decimals: u32) -> Result<Self, AmountError> {
        let overflow = AmountError::Overflow { decimals };
        let units = u128::try_from(value)
            .ok()
            .and_then(|units| i128::try_from(units).ok())
            .ok_or(overflow.clone())?;
        let decimal = Decimal::try_from_i128_with_scale(units, decimals).map_err(|_| overflow)?;
        Ok(Self(decimal.normalize()))
    }
}

impl Add for NativeAmount {
    type Output = NativeAmount;

    fn add(self, rhs: Self) -> Self::Output {
        NativeAmount((self.0 + rhs.0).normalize())
    }
}

impl FromStr for NativeAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map_err(|_| AmountError::InvalidFormat(s.to_string()))?;
        Self::new(decimal)
    }
}

impl From<MoneyAmount> for NativeAmount {
    fn from(value: MoneyAmount) -> Self {
        NativeAmount(value.as_decimal().normalize())
    }
}

impl Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// The advertised price of a protected route.
///
/// Parsed from `"$0.02"` or `"0.02 USD"` (USD), `"0.001 AVAX"` (native unit).
/// A bare number is read as USD.
///
/// ```
/// use x402_transfer_types::amount::Price;
///
/// let usd: Price = "$0.02".parse().unwrap();
/// assert_eq!(usd.to_string(), "$0.02");
///
/// let native: Price = "0.001 avax".parse().unwrap();
/// assert_eq!(native.to_string(), "0.001 AVAX");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum Price {
    Usd(MoneyAmount),
    Native { amount: MoneyAmount, symbol: String },
}

impl Price {
    pub fn usd<A: TryInto<MoneyAmount, Error = MoneyAmountParseError>>(
        amount: A,
    ) -> Result<Self, MoneyAmountParseError> {
        Ok(Price::Usd(amount.try_into()?))
    }

    pub fn native<A: TryInto<MoneyAmount, Error = MoneyAmountParseError>>(
        amount: A,
        symbol: &str,
    ) -> Result<Self, MoneyAmountParseError> {
        Ok(Price::Native {
            amount: amount.try_into()?,
            symbol: symbol.to_ascii_uppercase(),
        })
    }

    pub fn amount(&self) -> MoneyAmount {
        match self {
            Price::Usd(amount) => *amount,
            Price::Native { amount, .. } => *amount,
        }
    }
}

impl FromStr for Price {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let symbol: String = s
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let amount = MoneyAmount::parse(s)?;
        if s.starts_with('$') || symbol.is_empty() || symbol.eq_ignore_ascii_case("USD") {
            Ok(Price::Usd(amount))
        } else {
            Ok(Price::Native {
                amount,
                symbol: symbol.to_ascii_uppercase(),
            })
        }
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Usd(amount) => write!(f, "${amount}"),
            Price::Native { amount, symbol } => write!(f, "{amount} {symbol}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_ignores_trailing_zeros() {
        let a: NativeAmount = "0.020".parse().unwrap();
        let b: NativeAmount = "0.02".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "0.020000000000000001".parse().unwrap());
    }

    #[test]
    fn base_units_at_eighteen_decimals() {
        let amount: NativeAmount = "0.00002".parse().unwrap();
        let wei = amount.to_base_units(18).unwrap();
        assert_eq!(wei, U256::from(20_000_000_000_000u64));
        assert_eq!(NativeAmount::from_base_units(wei, 18).unwrap(), amount);
    }

    #[test]
    fn base_units_truncate_extra_digits() {
        let amount: NativeAmount = "1.2345".parse().unwrap();
        assert_eq!(amount.to_base_units(2).unwrap(), U256::from(123u8));
    }

    #[test]
    fn price_parsing_picks_currency() {
        assert_eq!("0.01".parse::<Price>().unwrap(), Price::usd("0.01").unwrap());
        assert_eq!("0.01 USD".parse::<Price>().unwrap(), Price::usd("0.01").unwrap());
        assert_eq!(
            "0.5 AVAX".parse::<Price>().unwrap(),
            Price::native("0.5", "avax").unwrap()
        );
        assert!("$0".parse::<Price>().is_err());
    }

    #[test]
    fn price_serializes_as_string() {
        let price: Price = "$0.02".parse().unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"$0.02\"");
    }
}
