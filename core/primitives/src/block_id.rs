use std::cmp::Ordering;
use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::hash::CryptoHash;
use crate::shard::ShardPrefix;

/// Identifies a masterchain or workchain block: `(workchain, shard_prefix,
/// seqno, root_hash, file_hash)` (DATA MODEL §3). `workchain == MASTERCHAIN_ID`
/// denotes the masterchain, whose shard is always [`ShardPrefix::MASTERCHAIN`].
pub const MASTERCHAIN_ID: i32 = -1;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub workchain: i32,
    pub shard: ShardPrefix,
    pub seqno: u32,
    pub root_hash: CryptoHash,
    pub file_hash: CryptoHash,
}

impl BlockId {
    pub fn is_masterchain(&self) -> bool {
        self.workchain == MASTERCHAIN_ID
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {:016x}, {}):{}:{}",
            self.workchain, self.shard.0, self.seqno, self.root_hash, self.file_hash
        )
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Total order `(workchain, shard, seqno, root_hash, file_hash)`: this keys
/// `BTreeMap`-based catalogs directly (§9 "cyclic graphs / back-pointers" —
/// edges are stored as ids, not pointers, and looked up through this order).
impl PartialOrd for BlockId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.workchain
            .cmp(&other.workchain)
            .then_with(|| self.shard.cmp(&other.shard))
            .then_with(|| self.seqno.cmp(&other.seqno))
            .then_with(|| self.root_hash.cmp(&other.root_hash))
            .then_with(|| self.file_hash.cmp(&other.file_hash))
    }
}

/// The `(shard, seqno)` half of a [`BlockId`], sufficient to route a lookup
/// to the right archive slice before the full id is known.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ShardSeqno {
    pub workchain: i32,
    pub shard: ShardPrefix,
    pub seqno: u32,
}

impl From<BlockId> for ShardSeqno {
    fn from(id: BlockId) -> Self {
        ShardSeqno { workchain: id.workchain, shard: id.shard, seqno: id.seqno }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seqno: u32) -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno,
            root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
            file_hash: CryptoHash::hash_bytes(&(seqno + 1).to_le_bytes()),
        }
    }

    #[test]
    fn orders_primarily_by_seqno_within_a_shard() {
        assert!(id(1) < id(2));
        assert!(id(2) < id(3));
    }
}
