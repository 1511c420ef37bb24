use borsh::{BorshDeserialize, BorshSerialize};

use archive_primitives::{BlockId, ShardPrefix};

/// What a slice is for (§3 "Archive catalog"). A key slice mirrors only
/// proofs/proof-links of key blocks; a temp slice buffers handles not yet
/// moved to a permanent slice.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum SliceKind {
    Perm,
    Key,
    Temp,
}

/// Per-shard summary inside one slice (§3 "Archive-slice"): `last_*` must be
/// monotone non-decreasing as entries are appended.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct ShardDescriptor {
    pub first_idx: u32,
    pub last_idx: u32,
    pub last_seqno: u32,
    pub last_lt: u64,
    pub last_ts: u32,
}

/// One append to a shard's entry list: enough to answer
/// `get_block_by_{lt,seqno,unix_time}` without touching the package.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ShardEntry {
    pub block_id: BlockId,
    pub lt: u64,
    pub unix_time: u32,
    /// Masterchain seqno this entry was added under; `truncate` uses this,
    /// not `block_id.seqno`, since a shard's own seqno is unrelated to the
    /// masterchain ref that anchors it in this slice (§4.4 `truncate`).
    pub owning_mc_seqno: u32,
}

/// Every shard ever registered in this slice, so a lookup knows which
/// descriptors to consult (§4.4 "First use of a shard registers it in the
/// shard list").
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct ShardList {
    pub shards: Vec<ShardPrefix>,
}

/// Authoritative on-disk length (and, for sliced perm archives, a version
/// counter bumped on every mutating commit) of one sub-package.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct SubSliceStatus {
    pub package_len: u64,
    pub version: u64,
}

pub(crate) fn descriptor_key(shard: ShardPrefix) -> Vec<u8> {
    borsh::to_vec(&shard).expect("ShardPrefix borsh encoding cannot fail")
}

pub(crate) fn entry_key(shard: ShardPrefix, idx: u32) -> Vec<u8> {
    let mut buf = borsh::to_vec(&shard).expect("ShardPrefix borsh encoding cannot fail");
    buf.extend_from_slice(&idx.to_be_bytes());
    buf
}

pub(crate) fn entry_prefix(shard: ShardPrefix) -> Vec<u8> {
    borsh::to_vec(&shard).expect("ShardPrefix borsh encoding cannot fail")
}

pub(crate) const SHARD_LIST_KEY: &[u8] = b"shard_list";

pub(crate) fn handle_key(id: &BlockId) -> Vec<u8> {
    borsh::to_vec(id).expect("BlockId borsh encoding cannot fail")
}

pub(crate) fn file_offset_key(hash: &archive_primitives::CryptoHash) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

pub(crate) fn sub_slice_status_key(sub_idx: u32) -> Vec<u8> {
    sub_idx.to_be_bytes().to_vec()
}
