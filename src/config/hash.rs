//! Configuration fingerprinting.
//!
//! A fingerprint is the identity of one exact rendered configuration. It is
//! used as a resource-name and label component, so it is short, fixed-width
//! lowercase hex.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of hex characters in a fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// Fixed-width digest of a rendered configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the full SHA-256 digest of `bytes` as lowercase hex.
    #[must_use]
    pub fn digest(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Computes the fingerprint of `bytes`.
    ///
    /// This is the leading [`FINGERPRINT_LEN`] characters of [`Self::digest`].
    #[must_use]
    pub fn fingerprint(&self, bytes: &[u8]) -> Fingerprint {
        let mut digest = self.digest(bytes);
        digest.truncate(FINGERPRINT_LEN);
        Fingerprint(digest)
    }

    /// Compares two digests without short-circuiting on the first mismatch.
    #[must_use]
    pub fn digests_match(digest1: &str, digest2: &str) -> bool {
        if digest1.len() != digest2.len() {
            return false;
        }

        digest1
            .bytes()
            .zip(digest2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Fingerprint {
    /// Parses and validates a fingerprint string.
    ///
    /// # Errors
    ///
    /// Returns an error unless `value` is exactly [`FINGERPRINT_LEN`]
    /// lowercase hex characters.
    pub fn parse(value: &str) -> std::result::Result<Self, ValidationError> {
        if value.len() != FINGERPRINT_LEN {
            return Err(ValidationError::InvalidFingerprint {
                value: value.to_string(),
                reason: format!("expected {FINGERPRINT_LEN} characters, found {}", value.len()),
            });
        }

        if !value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(ValidationError::InvalidFingerprint {
                value: value.to_string(),
                reason: String::from("only lowercase hex characters are allowed"),
            });
        }

        Ok(Self(value.to_string()))
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ValidationError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let hasher = ConfigHasher::new();

        let fp1 = hasher.fingerprint(b"[SERVICE]\n    Flush  1\n");
        let fp2 = hasher.fingerprint(b"[SERVICE]\n    Flush  1\n");

        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_different_bytes_different_fingerprint() {
        let hasher = ConfigHasher::new();

        let fp1 = hasher.fingerprint(b"[SERVICE]\n    Flush  1\n");
        let fp2 = hasher.fingerprint(b"[SERVICE]\n    Flush  2\n");

        assert_ne!(fp1, fp2);
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = ConfigHasher::new().fingerprint(b"anything");

        assert_eq!(fp.as_str().len(), FINGERPRINT_LEN);
        assert!(Fingerprint::parse(fp.as_str()).is_ok());
    }

    #[test]
    fn test_fingerprint_is_digest_prefix() {
        let hasher = ConfigHasher::new();
        let digest = hasher.digest(b"abc");

        assert_eq!(digest.len(), 64);
        assert!(digest.starts_with(hasher.fingerprint(b"abc").as_str()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Fingerprint::parse("abc").is_err());
        assert!(Fingerprint::parse("0123456789ABCDEF").is_err());
        assert!(Fingerprint::parse("0123456789abcdeg").is_err());
        assert!(Fingerprint::parse("0123456789abcdef").is_ok());
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let json = serde_json::to_string(&Fingerprint::parse("0123456789abcdef").unwrap()).unwrap();
        assert_eq!(json, "\"0123456789abcdef\"");

        let bad: std::result::Result<Fingerprint, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_digests_match() {
        assert!(ConfigHasher::digests_match("abc123", "abc123"));
        assert!(!ConfigHasher::digests_match("abc123", "abc124"));
        assert!(!ConfigHasher::digests_match("abc123", "abc12"));
    }
}
