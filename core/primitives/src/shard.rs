use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::hash::CryptoHash;

/// Shard prefix encoding used throughout the archive: a 64-bit value whose
/// lowest set bit marks the end of the prefix (GLOSSARY: "Shard prefix").
/// `MASTERCHAIN` is the maximal prefix and is reserved for the masterchain,
/// which always covers the entire address space of workchain `-1`.
#[derive(
    BorshSerialize,
    BorshDeserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Serialize,
    Deserialize,
)]
pub struct ShardPrefix(pub u64);

impl ShardPrefix {
    /// Covers the full address space; used for the masterchain and for any
    /// workchain that has not yet been split.
    pub const MASTERCHAIN: ShardPrefix = ShardPrefix(1u64 << 63);

    pub fn new(raw: u64) -> Self {
        ShardPrefix(raw)
    }

    /// Number of significant bits in the prefix, i.e. the position of the
    /// lowest set bit counted from the top.
    pub fn prefix_len(self) -> u32 {
        if self.0 == 0 {
            return 0;
        }
        63 - self.0.trailing_zeros()
    }

    /// Whether `account_prefix` (a full 64-bit account id, or a shorter
    /// account id padded with the same marker bit convention) falls inside
    /// this shard.
    pub fn contains(self, account_prefix: u64) -> bool {
        if self.0 == 0 {
            return true;
        }
        let len = self.prefix_len();
        if len == 0 {
            return true;
        }
        let mask = !0u64 << (64 - len);
        (account_prefix & mask) == (self.0 & mask)
    }

    /// Whether `self` is a (non-strict) ancestor shard of `other`, i.e. every
    /// account covered by `other` is also covered by `self`.
    pub fn is_ancestor_of(self, other: ShardPrefix) -> bool {
        if self == other {
            return true;
        }
        let my_len = self.prefix_len();
        let other_len = other.prefix_len();
        if my_len > other_len {
            return false;
        }
        if my_len == 0 {
            return true;
        }
        let mask = !0u64 << (64 - my_len);
        (self.0 & mask) == (other.0 & mask)
    }

    /// The marker bit: the single set bit whose position encodes the prefix
    /// length (GLOSSARY: "lowest set bit marks the end of the prefix").
    fn marker(self) -> u64 {
        1u64 << self.0.trailing_zeros()
    }

    /// Splits this shard into its left (prefix bit 0) and right (prefix bit
    /// 1) children, one level deeper.
    pub fn split(self) -> (ShardPrefix, ShardPrefix) {
        let half = self.marker() >> 1;
        (ShardPrefix(self.0 - half), ShardPrefix(self.0 + half))
    }

    /// Merges two sibling shards into their common parent. Returns `None` if
    /// `self` and `sibling` are not in fact siblings produced by the same
    /// [`split`](Self::split).
    pub fn merge(self, sibling: ShardPrefix) -> Option<ShardPrefix> {
        if self.0 == 0 || sibling.0 == 0 {
            return None;
        }
        let step = self.marker();
        if step != sibling.marker() {
            return None;
        }
        let (lo, hi) = if self.0 < sibling.0 { (self, sibling) } else { (sibling, self) };
        if hi.0.wrapping_sub(lo.0) != 2 * step {
            return None;
        }
        Some(ShardPrefix(lo.0 + step))
    }

    pub fn is_masterchain(self) -> bool {
        self == Self::MASTERCHAIN
    }
}

/// Packed into a shard-hashes dict leaf's `data` (§4.8 "shard-info-in-state
/// proof"): the top block of the shard this leaf describes, plus that
/// block's state root so a reader can hop from the masterchain's shard
/// config straight into the shard's own state without a second fetch.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardDescrFields {
    pub seqno: u32,
    pub root_hash: CryptoHash,
    pub file_hash: CryptoHash,
    pub state_root_hash: CryptoHash,
}

impl ShardDescrFields {
    pub fn pack(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ShardDescrFields encoding never fails")
    }

    pub fn unpack(bytes: &[u8]) -> std::io::Result<Self> {
        BorshDeserialize::try_from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masterchain_contains_everything() {
        assert!(ShardPrefix::MASTERCHAIN.contains(0));
        assert!(ShardPrefix::MASTERCHAIN.contains(u64::MAX));
    }

    #[test]
    fn split_then_merge_roundtrips() {
        let (left, right) = ShardPrefix::MASTERCHAIN.split();
        assert_ne!(left, right);
        assert_eq!(left.merge(right), Some(ShardPrefix::MASTERCHAIN));
    }

    #[test]
    fn split_children_are_contained_in_parent() {
        let (left, right) = ShardPrefix::MASTERCHAIN.split();
        assert!(ShardPrefix::MASTERCHAIN.is_ancestor_of(left));
        assert!(ShardPrefix::MASTERCHAIN.is_ancestor_of(right));
        assert!(!left.is_ancestor_of(right));
    }
}
