use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit sha256 digest, used throughout the engine to address cells,
/// blocks, and package records by content.
#[derive(
    BorshSerialize, BorshDeserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct CryptoHash(pub [u8; 32]);

impl CryptoHash {
    pub const ZERO: CryptoHash = CryptoHash([0u8; 32]);

    pub fn hash_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        CryptoHash(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for CryptoHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] =
            bytes.try_into().map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(CryptoHash(arr))
    }
}

impl From<[u8; 32]> for CryptoHash {
    fn from(value: [u8; 32]) -> Self {
        CryptoHash(value)
    }
}

impl AsRef<[u8]> for CryptoHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for CryptoHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CryptoHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CryptoHash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = CryptoHash::hash_bytes(b"hello");
        let b = CryptoHash::hash_bytes(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, CryptoHash::hash_bytes(b"world"));
    }

    #[test]
    fn round_trips_through_hex() {
        let h = CryptoHash::hash_bytes(b"round-trip");
        let s = h.to_string();
        assert_eq!(h, s.parse().unwrap());
    }
}
