//! Configuration primitives shared by the server and the ledger adapters.
//!
//! The [`LiteralOrEnv`] wrapper lets a configuration value be written either
//! literally or as a reference to an environment variable, which keeps signer
//! keys and RPC credentials out of configuration files:
//!
//! ```json
//! {
//!   "receiver": "0x742d35Cc6634C0532925a3b844Bc9e7595f5bB0e",
//!   "rpc": "$AVALANCHE_RPC_URL",
//!   "signer": "${PAYER_PRIVATE_KEY}"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

/// A value resolved from a literal, `$VAR` or `${VAR}` during deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(braced)
        } else {
            let var_name = s.strip_prefix('$')?;
            let is_name = !var_name.is_empty()
                && var_name.chars().all(|c| c.is_alphanumeric() || c == '_');
            is_name.then_some(var_name)
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = match Self::parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?,
            None => s,
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_env_var_syntax() {
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$RPC_URL"), Some("RPC_URL"));
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("${RPC_URL}"), Some("RPC_URL"));
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$not-a-var"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("0xabc"), None);
    }

    #[test]
    fn literal_values_parse_through() {
        let value: LiteralOrEnv<u64> = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(*value, 42);
    }
}
