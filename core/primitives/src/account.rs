//! Account/transaction record fields carried alongside the dictionary
//! leaves the proof engine reveals (§4.8 "account-state proof", "transaction
//! proof"). The account/transaction bodies themselves are opaque to the
//! archive engine; only the bookkeeping fields needed to walk the
//! transaction chain or report a response shape are decoded here.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::hash::CryptoHash;

/// Packed into a `ShardAccounts` leaf cell's `data`; the account's own
/// state (code/data/balance/libraries) lives opaquely in that leaf's first
/// ref (§4.9 "prunned" variant strips parts of exactly that subtree).
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountRecordFields {
    pub last_trans_lt: u64,
    pub last_trans_hash: CryptoHash,
}

impl AccountRecordFields {
    pub fn pack(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("AccountRecordFields encoding never fails")
    }

    pub fn unpack(bytes: &[u8]) -> std::io::Result<Self> {
        BorshDeserialize::try_from_slice(bytes)
    }
}

/// Packed into an `account_blocks/transactions` leaf cell's `data`; the
/// transaction's own contents live opaquely in that leaf's first ref.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionRecordFields {
    pub lt: u64,
    pub prev_trans_lt: u64,
    pub prev_trans_hash: CryptoHash,
}

impl TransactionRecordFields {
    pub fn pack(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("TransactionRecordFields encoding never fails")
    }

    pub fn unpack(bytes: &[u8]) -> std::io::Result<Self> {
        BorshDeserialize::try_from_slice(bytes)
    }
}
