//! Human-readable currency amount parsing.
//!
//! [`MoneyAmount`] turns strings such as `"$0.02"`, `"1,000.50"` or `"0.001 AVAX"`
//! into a strictly positive decimal. Currency symbols, unit suffixes, thousand
//! separators and whitespace are stripped before parsing.
//!
//! ```rust
//! use x402_transfer_types::util::MoneyAmount;
//!
//! let amount = MoneyAmount::parse("$10.50").unwrap();
//! assert_eq!(amount.scale(), 2);
//! assert_eq!(amount.mantissa(), 1050);
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A parsed, strictly positive monetary amount with its original precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    /// Number of decimal places in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The value as an unsigned integer without the decimal point, `"12.34"` gives `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

/// Errors that can occur when parsing a monetary amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error(
        "Amount must be between {} and {}",
        constants::MIN_STR,
        constants::MAX_STR
    )]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000000000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
    pub static NOT_NUMERIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));
}

impl MoneyAmount {
    /// Parses a human-readable currency string.
    ///
    /// Zero is rejected as out of range: every amount this type carries is a price
    /// somebody has to pay.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = constants::NOT_NUMERIC.replace_all(input, "");
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        Self::try_from(parsed)
    }
}

impl TryFrom<Decimal> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if value < *constants::MIN || value > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(value))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::from_str(value)
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::OutOfRange)?;
        Self::try_from(decimal)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_symbols_and_separators() {
        assert_eq!(MoneyAmount::parse("$1,000.50").unwrap().to_string(), "1000.5");
        assert_eq!(MoneyAmount::parse("0.001 AVAX").unwrap().to_string(), "0.001");
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert_eq!(
            MoneyAmount::parse("$0").unwrap_err(),
            MoneyAmountParseError::OutOfRange
        );
        assert_eq!(
            MoneyAmount::parse("-1").unwrap_err(),
            MoneyAmountParseError::Negative
        );
        assert_eq!(
            MoneyAmount::parse("free").unwrap_err(),
            MoneyAmountParseError::InvalidFormat
        );
    }
}
