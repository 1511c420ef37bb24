//! Simplified in-engine block cell layout (§4.8 "unpacks `BlockInfo`,
//! optionally keeps state-update, value-flow, extra ... subtrees"). The
//! archive engine never re-derives consensus from a block, so it only
//! needs enough of the on-disk cell shape to locate the handful of
//! subtrees the proof and lite-query layers read — not a full TL-B
//! decoder for the block schema (§1 non-goal: no wire-format VM).
//!
//! A block's root cell carries exactly the refs named in [`BlockRootRef`];
//! `info`'s own first ref, when present, is the previous block's signature
//! set (carried inline so key-block signature proofs need no extra fetch).
//! The `extra` cell carries the refs named in [`ExtraRef`].

use borsh::{BorshDeserialize, BorshSerialize};

use crate::hash::CryptoHash;
use crate::shard::ShardPrefix;

/// Index into a block root cell's `refs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum BlockRootRef {
    Info = 0,
    ValueFlow = 1,
    StateUpdate = 2,
    Extra = 3,
}

/// Index into a block's `extra` cell's `refs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ExtraRef {
    ShardHashes = 0,
    Config = 1,
    /// Nested cell holding the refs named by [`AccountBlocksRef`]; kept one
    /// level deeper so `extra` itself stays within four refs.
    AccountBlocksAndQueues = 2,
    Libraries = 3,
}

/// Index into the nested `AccountBlocksAndQueues` cell's `refs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum AccountBlocksRef {
    /// `account_blocks`: per-account dict of per-account `transactions` dicts.
    AccountBlocks = 0,
    OutMsgQueue = 1,
    DispatchQueue = 2,
}

/// Index into a block's `info` cell's `refs`; the only ref an info cell
/// carries is the optional previous-block signature set (present on every
/// block except the very first of a shard, and on masterchain blocks
/// carries the validator-set signatures used by proof-chain forward links).
pub const INFO_REF_PREV_SIGNATURES: usize = 0;

/// The decoded header fields a proof/query needs (§4.8 "unpacks `BlockInfo`").
/// Packed into the info cell's `data` via borsh; this is a port-internal
/// encoding, not the protocol's bit-level `BlockInfo` TL-B layout.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockInfoFields {
    pub version: u32,
    pub not_master: bool,
    pub after_merge: bool,
    pub before_split: bool,
    pub after_split: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub key_block: bool,
    pub seqno: u32,
    pub shard: ShardPrefix,
    pub gen_utime: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub gen_validator_list_hash_short: u32,
    pub gen_catchain_seqno: u32,
    pub min_ref_mc_seqno: u32,
    pub prev_key_block_seqno: u32,
    pub vert_seqno: u32,
}

impl BlockInfoFields {
    pub fn pack(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("BlockInfoFields encoding never fails")
    }

    pub fn unpack(bytes: &[u8]) -> std::io::Result<Self> {
        BorshDeserialize::try_from_slice(bytes)
    }
}

/// Fields describing one validator-set signer over a masterchain block's
/// `(root_hash, file_hash)`, used by proof-chain forward links.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockSignature {
    pub validator_id_short: CryptoHash,
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_info_fields_round_trip_through_pack() {
        let fields = BlockInfoFields {
            version: 0,
            not_master: false,
            after_merge: false,
            before_split: false,
            after_split: false,
            want_split: false,
            want_merge: false,
            key_block: true,
            seqno: 42,
            shard: ShardPrefix::MASTERCHAIN,
            gen_utime: 1_700_000_000,
            start_lt: 100,
            end_lt: 200,
            gen_validator_list_hash_short: 7,
            gen_catchain_seqno: 3,
            min_ref_mc_seqno: 41,
            prev_key_block_seqno: 10,
            vert_seqno: 0,
        };
        let packed = fields.pack();
        assert_eq!(BlockInfoFields::unpack(&packed).unwrap(), fields);
    }
}
