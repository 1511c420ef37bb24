//! Account-state proof (§4.8): dictionary lookup in `ShardAccounts` by
//! 256-bit account address, returning `{account_cell, last_trans_lt,
//! last_trans_hash}` or a non-existence proof.

use archive_primitives::{AccountRecordFields, CryptoHash, StateRootRef};

use crate::dict::{self, DictPath};
use crate::errors::{ProofError, ProofResult};
use crate::merkle::{build_spine_proof, merge_proofs, CellSource, MerkleProof};

pub const ACCOUNTS_DICT_DEPTH: u16 = 256;

/// Ref index, within a `ShardAccounts` leaf cell, of the account's own
/// opaque state (code/data/balance/libraries).
pub const ACCOUNT_LEAF_REF_STATE: usize = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountStateHit {
    pub fields: AccountRecordFields,
    pub account_state_hash: CryptoHash,
}

/// Looks up `address` (a 256-bit account id) in the state root's
/// `ShardAccounts` dictionary and builds a proof covering the path,
/// whether or not the account is present.
pub fn account_state_proof(
    source: &dyn CellSource,
    state_root_hash: CryptoHash,
    address: [u8; 32],
) -> ProofResult<(MerkleProof, Option<AccountStateHit>)> {
    let accounts_root = {
        let root = source.get_cell(state_root_hash)?;
        *root
            .refs
            .get(StateRootRef::Accounts as usize)
            .ok_or_else(|| ProofError::MalformedBlock("state root is missing accounts ref".into()))?
    };

    let key = DictPath::from_bytes(&address, 256);
    let hit = dict::lookup_exact(source, accounts_root, ACCOUNTS_DICT_DEPTH, &key)?;

    let resolved = match &hit {
        Some((_, leaf)) => {
            let fields = AccountRecordFields::unpack(&leaf.data)
                .map_err(|e| ProofError::MalformedBlock(format!("undecodable account record: {e}")))?;
            let account_state_hash = *leaf
                .refs
                .get(ACCOUNT_LEAF_REF_STATE)
                .ok_or_else(|| ProofError::MalformedBlock("account leaf is missing its state ref".into()))?;
            Some(AccountStateHit { fields, account_state_hash })
        }
        None => None,
    };

    let dict_proof = dict::prove(source, accounts_root, ACCOUNTS_DICT_DEPTH, &hit, &key)?;
    let spine = build_spine_proof(source, state_root_hash, &[StateRootRef::Accounts as usize])?;
    Ok((merge_proofs(spine, dict_proof), resolved))
}

/// Strips an already-built account proof down to the "prunned" variant
/// (§4.9 `get_account_state_prunned`): keeps the leaf's bookkeeping fields
/// (balance lives in the opaque state cell and is intentionally left
/// revealed) but prunes the account state subtree itself so code/data/libs
/// are not disclosed, by re-rooting a fresh proof at the account leaf with
/// its state ref pruned unconditionally.
pub fn prune_account_state_subtree(
    source: &dyn CellSource,
    account_leaf_hash: CryptoHash,
) -> ProofResult<MerkleProof> {
    crate::merkle::build_proof(source, account_leaf_hash, |path| path.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use archive_primitives::Cell;

    use super::*;

    fn fixture(addr: [u8; 32], present: bool) -> (CryptoHash, HashMap<CryptoHash, Cell>, [u8; 32]) {
        let mut store = HashMap::new();
        let mut entries = BTreeMap::new();

        if present {
            let state = Cell::new_ordinary(vec![0xAB], 8, vec![]);
            store.insert(state.hash(), state.clone());
            let fields = AccountRecordFields { last_trans_lt: 77, last_trans_hash: CryptoHash::ZERO };
            let leaf = Cell::new_ordinary(fields.pack(), 0, vec![state.hash()]);
            entries.insert(DictPath::from_bytes(&addr, 256), leaf);
        }

        let accounts_root = dict::build(&entries, 256, &mut |c| {
            store.insert(c.hash(), c);
        });

        let mc_extra = Cell::new_ordinary(vec![], 0, vec![]);
        store.insert(mc_extra.hash(), mc_extra.clone());
        let state_root = Cell::new_ordinary(vec![], 0, vec![accounts_root.hash(), mc_extra.hash()]);
        store.insert(state_root.hash(), state_root.clone());

        (state_root.hash(), store, addr)
    }

    #[test]
    fn finds_a_present_account_and_its_bookkeeping_fields() {
        let addr = [7u8; 32];
        let (root, store, addr) = fixture(addr, true);
        let (proof, hit) = account_state_proof(&store, root, addr).unwrap();
        proof.verify(root).unwrap();
        let hit = hit.unwrap();
        assert_eq!(hit.fields.last_trans_lt, 77);
    }

    #[test]
    fn proves_absence_of_an_unknown_account() {
        let addr = [9u8; 32];
        let (root, store, addr) = fixture(addr, false);
        let (proof, hit) = account_state_proof(&store, root, addr).unwrap();
        proof.verify(root).unwrap();
        assert!(hit.is_none());
    }
}
