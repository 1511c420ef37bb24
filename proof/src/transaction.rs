//! Transaction proof (§4.8): locates a transaction in a block's
//! `account_blocks / transactions` dictionaries by exact `(address, lt)`
//! and returns a proof covering that path.

use archive_primitives::{AccountBlocksRef, BlockRootRef, CryptoHash, ExtraRef, TransactionRecordFields};

use crate::dict::{self, DictPath};
use crate::errors::{ProofError, ProofResult};
use crate::merkle::{build_spine_proof, merge_proofs, CellSource, MerkleProof};

pub const ACCOUNT_BLOCKS_DICT_DEPTH: u16 = 256;
pub const TRANSACTIONS_DICT_DEPTH: u16 = 64;

/// Ref index, within an `account_blocks` leaf cell, of that account's
/// per-lt `transactions` dictionary root.
const ACCOUNT_BLOCKS_LEAF_REF_TRANSACTIONS: usize = 0;
/// Ref index, within a `transactions` leaf cell, of the transaction's own
/// opaque body.
const TRANSACTIONS_LEAF_REF_BODY: usize = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionHit {
    pub fields: TransactionRecordFields,
    pub transaction_hash: CryptoHash,
}

/// Finds the transaction at exactly `(address, lt)` within `block_root_hash`,
/// returning a proof of presence or of documented absence.
pub fn transaction_proof(
    source: &dyn CellSource,
    block_root_hash: CryptoHash,
    address: [u8; 32],
    lt: u64,
) -> ProofResult<(MerkleProof, Option<TransactionHit>)> {
    let account_blocks_root = account_blocks_root(source, block_root_hash)?;

    let addr_key = DictPath::from_bytes(&address, 256);
    let account_hit = dict::lookup_exact(source, account_blocks_root, ACCOUNT_BLOCKS_DICT_DEPTH, &addr_key)?;
    let account_blocks_spine = [
        BlockRootRef::Extra as usize,
        ExtraRef::AccountBlocksAndQueues as usize,
        AccountBlocksRef::AccountBlocks as usize,
    ];

    let account_blocks_dict_proof = dict::prove(
        source,
        account_blocks_root,
        ACCOUNT_BLOCKS_DICT_DEPTH,
        &account_hit,
        &addr_key,
    )?;
    let spine = build_spine_proof(source, block_root_hash, &account_blocks_spine)?;
    let mut proof = merge_proofs(spine, account_blocks_dict_proof);

    let Some((_, account_leaf)) = account_hit else {
        return Ok((proof, None));
    };
    let transactions_root = *account_leaf
        .refs
        .get(ACCOUNT_BLOCKS_LEAF_REF_TRANSACTIONS)
        .ok_or_else(|| ProofError::MalformedBlock("account_blocks leaf is missing its transactions ref".into()))?;

    let lt_key = DictPath::from_u64(lt, TRANSACTIONS_DICT_DEPTH as u8);
    let tx_hit = dict::lookup_exact(source, transactions_root, TRANSACTIONS_DICT_DEPTH, &lt_key)?;
    let tx_dict_proof = dict::prove(source, transactions_root, TRANSACTIONS_DICT_DEPTH, &tx_hit, &lt_key)?;
    proof = merge_proofs(proof, tx_dict_proof);

    let resolved = match tx_hit {
        Some((_, leaf)) => {
            let fields = TransactionRecordFields::unpack(&leaf.data)
                .map_err(|e| ProofError::MalformedBlock(format!("undecodable transaction record: {e}")))?;
            let transaction_hash = *leaf
                .refs
                .get(TRANSACTIONS_LEAF_REF_BODY)
                .ok_or_else(|| ProofError::MalformedBlock("transaction leaf is missing its body ref".into()))?;
            Some(TransactionHit { fields, transaction_hash })
        }
        None => None,
    };

    Ok((proof, resolved))
}

fn account_blocks_root(source: &dyn CellSource, block_root_hash: CryptoHash) -> ProofResult<CryptoHash> {
    let root = source.get_cell(block_root_hash)?;
    let extra_hash = *root
        .refs
        .get(BlockRootRef::Extra as usize)
        .ok_or_else(|| ProofError::MalformedBlock("block root is missing extra".into()))?;
    let extra = source.get_cell(extra_hash)?;
    let queues_hash = *extra
        .refs
        .get(ExtraRef::AccountBlocksAndQueues as usize)
        .ok_or_else(|| ProofError::MalformedBlock("extra is missing account-blocks-and-queues".into()))?;
    let queues = source.get_cell(queues_hash)?;
    queues
        .refs
        .get(AccountBlocksRef::AccountBlocks as usize)
        .copied()
        .ok_or_else(|| ProofError::MalformedBlock("account-blocks-and-queues is missing account_blocks".into()))
}

/// Walks a single step backwards along an account's transaction chain
/// (§4.9 `get_transactions`: "follows `prev_trans_lt/hash`"), given the
/// transaction currently in hand.
pub fn previous_transaction(fields: &TransactionRecordFields) -> Option<(u64, CryptoHash)> {
    if fields.prev_trans_lt == 0 {
        None
    } else {
        Some((fields.prev_trans_lt, fields.prev_trans_hash))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use archive_primitives::Cell;

    use super::*;

    fn fixture(addr: [u8; 32], lt: u64) -> (CryptoHash, HashMap<CryptoHash, Cell>) {
        let mut store = HashMap::new();

        let body = Cell::new_ordinary(vec![0xCC], 8, vec![]);
        store.insert(body.hash(), body.clone());
        let tx_fields =
            TransactionRecordFields { lt, prev_trans_lt: 0, prev_trans_hash: CryptoHash::ZERO };
        let tx_leaf = Cell::new_ordinary(tx_fields.pack(), 0, vec![body.hash()]);

        let mut tx_entries = BTreeMap::new();
        tx_entries.insert(DictPath::from_u64(lt, TRANSACTIONS_DICT_DEPTH as u8), tx_leaf);
        let transactions_root = dict::build(&tx_entries, TRANSACTIONS_DICT_DEPTH, &mut |c| {
            store.insert(c.hash(), c);
        });

        let account_leaf = Cell::new_ordinary(vec![], 0, vec![transactions_root.hash()]);
        let mut account_entries = BTreeMap::new();
        account_entries.insert(DictPath::from_bytes(&addr, 256), account_leaf);
        let account_blocks_root = dict::build(&account_entries, ACCOUNT_BLOCKS_DICT_DEPTH, &mut |c| {
            store.insert(c.hash(), c);
        });

        let out_msg_queue = Cell::new_ordinary(vec![], 0, vec![]);
        let dispatch_queue = Cell::new_ordinary(vec![], 0, vec![]);
        store.insert(out_msg_queue.hash(), out_msg_queue.clone());
        store.insert(dispatch_queue.hash(), dispatch_queue.clone());
        let queues = Cell::new_ordinary(
            vec![],
            0,
            vec![account_blocks_root.hash(), out_msg_queue.hash(), dispatch_queue.hash()],
        );
        store.insert(queues.hash(), queues.clone());

        let shard_hashes = Cell::new_ordinary(vec![], 0, vec![]);
        let config = Cell::new_ordinary(vec![], 0, vec![]);
        let libraries = Cell::new_ordinary(vec![], 0, vec![]);
        store.insert(shard_hashes.hash(), shard_hashes.clone());
        store.insert(config.hash(), config.clone());
        store.insert(libraries.hash(), libraries.clone());
        let extra = Cell::new_ordinary(
            vec![],
            0,
            vec![shard_hashes.hash(), config.hash(), queues.hash(), libraries.hash()],
        );
        store.insert(extra.hash(), extra.clone());

        let info = Cell::new_ordinary(vec![], 0, vec![]);
        let value_flow = Cell::new_ordinary(vec![], 0, vec![]);
        let state_update = Cell::new_ordinary(vec![], 0, vec![]);
        store.insert(info.hash(), info.clone());
        store.insert(value_flow.hash(), value_flow.clone());
        store.insert(state_update.hash(), state_update.clone());
        let root = Cell::new_ordinary(
            vec![],
            0,
            vec![info.hash(), value_flow.hash(), state_update.hash(), extra.hash()],
        );
        store.insert(root.hash(), root.clone());

        (root.hash(), store)
    }

    #[test]
    fn finds_a_present_transaction() {
        let addr = [3u8; 32];
        let (root, store) = fixture(addr, 555);
        let (proof, hit) = transaction_proof(&store, root, addr, 555).unwrap();
        proof.verify(root).unwrap();
        assert_eq!(hit.unwrap().fields.lt, 555);
    }

    #[test]
    fn proves_absence_of_an_unknown_lt() {
        let addr = [3u8; 32];
        let (root, store) = fixture(addr, 555);
        let (proof, hit) = transaction_proof(&store, root, addr, 999).unwrap();
        proof.verify(root).unwrap();
        assert!(hit.is_none());
    }
}
