//! Unix timestamps carried in proofs, receipts and log entries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// Seconds since the Unix epoch.
///
/// Serialized as a stringified integer so JavaScript callers never lose precision.
/// Deserialization also accepts a bare JSON number.
///
/// ```
/// use x402_transfer_types::timestamp::UnixTimestamp;
///
/// let ts: UnixTimestamp = serde_json::from_str("\"1699999999\"").unwrap();
/// assert_eq!(ts.as_secs(), 1699999999);
/// assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            String(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(secs) => Ok(UnixTimestamp(secs)),
            Raw::String(s) => s.parse::<u64>().map(UnixTimestamp).map_err(|_| {
                serde::de::Error::custom("timestamp must be a non-negative integer")
            }),
        }
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}
