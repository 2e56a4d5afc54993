//! Base64 encoding and decoding utilities.
//!
//! Proofs travel in a request header or in a query parameter, so [`Base64Bytes`]
//! encodes with the URL-safe alphabet without padding. Decoding is lenient and
//! accepts both the standard and the URL-safe alphabet, padded or not.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64-encoded byte data.
///
/// # Example
///
/// ```rust
/// use x402_transfer_types::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(b"hello world?");
/// assert_eq!(encoded.to_string(), "aGVsbG8gd29ybGQ_");
///
/// let decoded = encoded.decode().unwrap();
/// assert_eq!(decoded, b"hello world?");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// Trailing `=` padding is ignored, and both alphabets are tried.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let mut input: &[u8] = self.0.as_ref();
        while let [rest @ .., b'='] = input {
            input = rest;
        }
        URL_SAFE_NO_PAD
            .decode(input)
            .or_else(|_| STANDARD_NO_PAD.decode(input))
    }

    /// Encodes raw binary data into URL-safe, unpadded base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = URL_SAFE_NO_PAD.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(value: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(value.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_standard_padded_input() {
        let standard = base64::engine::general_purpose::STANDARD.encode(b"\xfb\xff payload");
        assert!(standard.contains('+') || standard.contains('/') || standard.ends_with('='));
        let decoded = Base64Bytes::from(standard.as_str()).decode().unwrap();
        assert_eq!(decoded, b"\xfb\xff payload");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Base64Bytes::from("not base64 at all!").decode().is_err());
    }
}
