//! Helper types shared by the payment crates.
//!
//! - [`b64`] - Base64 encoding/decoding used by the proof codec and receipt header
//! - [`lit_str`] - Compile-time string literal types
//! - [`money_amount`] - Human-readable currency amount parsing

pub mod b64;
pub mod lit_str;
pub mod money_amount;

pub use b64::*;
pub use money_amount::{MoneyAmount, MoneyAmountParseError};
