//! Block-header, state-root-in-block, shard-info-in-state and
//! ancestor-block proofs (§4.8).

use archive_primitives::{
    BlockInfoFields, BlockRootRef, CryptoHash, ExtraRef, McExtraRef, OldBlocksAndStatsRef,
    ShardPrefix, INFO_REF_PREV_SIGNATURES,
};

use crate::dict::{self, DictHit, DictPath};
use crate::errors::{ProofError, ProofResult};
use crate::merkle::{build_path_proof, build_proof, build_spine_proof, merge_proofs, CellSource, MerkleProof};

/// Gates which optional subtrees a header proof reveals, mirroring §4.8's
/// "query mode bitmask".
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderProofMode {
    pub prev_signatures: bool,
    pub value_flow: bool,
    pub state_update: bool,
    pub shard_hashes: bool,
}

/// Root-hash-only virtualization of a block cell: always reveals `info`
/// (so the caller gets decoded header fields back), optionally reveals
/// `value_flow`/`state_update`/`extra.shard_hashes`/`info.prev_signatures`
/// per `mode`.
pub fn block_header_proof(
    source: &dyn CellSource,
    block_root_hash: CryptoHash,
    mode: HeaderProofMode,
) -> ProofResult<(MerkleProof, BlockInfoFields)> {
    let root = source.get_cell(block_root_hash)?;
    let info_hash = *root
        .refs
        .get(BlockRootRef::Info as usize)
        .ok_or_else(|| ProofError::MalformedBlock("block root is missing the info ref".into()))?;
    let info_cell = source.get_cell(info_hash)?;
    let fields = BlockInfoFields::unpack(&info_cell.data)
        .map_err(|e| ProofError::MalformedBlock(format!("undecodable BlockInfo: {e}")))?;

    let needs_extra = mode.shard_hashes;
    let proof = build_proof(source, block_root_hash, move |path| match path {
        [i] if *i == BlockRootRef::Info as usize => true,
        [i] if *i == BlockRootRef::ValueFlow as usize => mode.value_flow,
        [i] if *i == BlockRootRef::StateUpdate as usize => mode.state_update,
        [i] if *i == BlockRootRef::Extra as usize => needs_extra,
        [i, j] if *i == BlockRootRef::Info as usize && *j == INFO_REF_PREV_SIGNATURES => {
            mode.prev_signatures
        }
        [i, j] if *i == BlockRootRef::Extra as usize && *j == ExtraRef::ShardHashes as usize => {
            mode.shard_hashes
        }
        _ => false,
    })?;
    Ok((proof, fields))
}

const STATE_UPDATE_NEW_ROOT_REF: usize = 1;

/// Reads the root hash a block's `state_update` cell targets, without
/// proving anything about it — used wherever a caller needs the actual
/// state root *value* rather than a proof (e.g. to dereference the state
/// and keep working), such as the masterchain proof-chain's backward
/// links in [`crate::chain`].
pub fn state_root_hash_of_block(source: &dyn CellSource, block_root_hash: CryptoHash) -> ProofResult<CryptoHash> {
    let root = source.get_cell(block_root_hash)?;
    let state_update_hash = *root
        .refs
        .get(BlockRootRef::StateUpdate as usize)
        .ok_or_else(|| ProofError::MalformedBlock("block root is missing state_update".into()))?;
    let state_update = source.get_cell(state_update_hash)?;
    state_update
        .refs
        .get(STATE_UPDATE_NEW_ROOT_REF)
        .copied()
        .ok_or_else(|| ProofError::MalformedBlock("state_update is missing its new-root ref".into()))
}

/// Proves that the block's `state_update` cell targets `claimed_state_root`
/// (hash-compare only, no verification of the update's validity per §4.8).
pub fn state_root_in_block_proof(
    source: &dyn CellSource,
    block_root_hash: CryptoHash,
    claimed_state_root: CryptoHash,
) -> ProofResult<MerkleProof> {
    let new_root = state_root_hash_of_block(source, block_root_hash)?;
    if new_root != claimed_state_root {
        return Err(ProofError::RootMismatch { got: new_root, want: claimed_state_root });
    }
    build_path_proof(source, block_root_hash, &[BlockRootRef::StateUpdate as usize, STATE_UPDATE_NEW_ROOT_REF])
}

/// Depth, in bits, of the shard-hashes dictionary key (a [`ShardPrefix`]'s
/// raw bit pattern, workchain-qualified lookups are handled by the caller
/// picking the right per-workchain subtree before calling in).
pub const SHARD_HASHES_DICT_DEPTH: u16 = 64;

/// Proves the presence (or documented absence) of a shard-hash record for
/// `shard` in a masterchain state's shard-hashes dictionary (§4.8
/// "nearest-key dictionary lookup with an `exact?` flag").
pub fn shard_info_in_state_proof(
    source: &dyn CellSource,
    state_root_hash: CryptoHash,
    shard: ShardPrefix,
    exact: bool,
) -> ProofResult<(MerkleProof, DictHit)> {
    let dict_root = mc_extra_child_hash(source, state_root_hash, McExtraRef::ShardHashes)?;
    let key = DictPath::from_u64(shard.0, 64);
    let hit = if exact {
        dict::lookup_exact(source, dict_root, SHARD_HASHES_DICT_DEPTH, &key)?
    } else {
        dict::lookup_successor(source, dict_root, SHARD_HASHES_DICT_DEPTH, &key)?
    };
    let dict_proof = dict::prove(source, dict_root, SHARD_HASHES_DICT_DEPTH, &hit, &key)?;
    let full = stitch_mc_extra_proof(source, state_root_hash, McExtraRef::ShardHashes, dict_proof)?;
    Ok((full, hit))
}

/// Proves, via `old_mc_blocks_info`, that `(seqno, root_hash, file_hash)`
/// was a previously observed masterchain block (§4.8 "ancestor-block proof").
pub fn ancestor_block_proof(
    source: &dyn CellSource,
    state_root_hash: CryptoHash,
    seqno: u32,
) -> ProofResult<(MerkleProof, DictHit)> {
    let mc_extra_hash = state_child_hash(source, state_root_hash)?;
    let mc_extra = source.get_cell(mc_extra_hash)?;
    let stats_hash = *mc_extra
        .refs
        .get(McExtraRef::OldBlocksAndStats as usize)
        .ok_or_else(|| ProofError::MalformedBlock("mc_extra is missing old-blocks-and-stats".into()))?;
    let stats = source.get_cell(stats_hash)?;
    let old_blocks_hash = *stats
        .refs
        .get(OldBlocksAndStatsRef::OldMcBlocks as usize)
        .ok_or_else(|| ProofError::MalformedBlock("old-blocks-and-stats is missing old_mc_blocks".into()))?;

    const OLD_BLOCKS_DICT_DEPTH: u16 = 32;
    let key = DictPath::from_u64(seqno as u64, 32);
    let hit = dict::lookup_exact(source, old_blocks_hash, OLD_BLOCKS_DICT_DEPTH, &key)?;
    let dict_proof = dict::prove(source, old_blocks_hash, OLD_BLOCKS_DICT_DEPTH, &hit, &key)?;

    let path = [
        archive_primitives::StateRootRef::McExtra as usize,
        McExtraRef::OldBlocksAndStats as usize,
        OldBlocksAndStatsRef::OldMcBlocks as usize,
    ];
    let spine = build_spine_proof(source, state_root_hash, &path)?;
    Ok((merge_proofs(spine, dict_proof), hit))
}

fn state_child_hash(source: &dyn CellSource, state_root_hash: CryptoHash) -> ProofResult<CryptoHash> {
    let root = source.get_cell(state_root_hash)?;
    root.refs
        .get(archive_primitives::StateRootRef::McExtra as usize)
        .copied()
        .ok_or_else(|| ProofError::MalformedBlock("state root is missing mc_extra (not a masterchain state?)".into()))
}

fn mc_extra_child_hash(
    source: &dyn CellSource,
    state_root_hash: CryptoHash,
    which: McExtraRef,
) -> ProofResult<CryptoHash> {
    let mc_extra_hash = state_child_hash(source, state_root_hash)?;
    let mc_extra = source.get_cell(mc_extra_hash)?;
    mc_extra
        .refs
        .get(which as usize)
        .copied()
        .ok_or_else(|| ProofError::MalformedBlock(format!("mc_extra is missing ref {which:?}")))
}

/// Builds the spine proof from the state root down to `which`'s dictionary
/// root and splices in the dictionary-internal proof built separately,
/// since [`build_path_proof`] only knows about direct-ref paths.
fn stitch_mc_extra_proof(
    source: &dyn CellSource,
    state_root_hash: CryptoHash,
    which: McExtraRef,
    dict_proof: MerkleProof,
) -> ProofResult<MerkleProof> {
    let path = [archive_primitives::StateRootRef::McExtra as usize, which as usize];
    let spine = build_spine_proof(source, state_root_hash, &path)?;
    Ok(merge_proofs(spine, dict_proof))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use archive_primitives::{Cell, StateRootRef};

    use super::*;

    fn leaf_cell(tag: u8) -> Cell {
        Cell::new_ordinary(vec![tag], 8, vec![])
    }

    fn build_masterchain_state_fixture() -> (CryptoHash, HashMap<CryptoHash, Cell>, CryptoHash, CryptoHash) {
        let mut store = HashMap::new();

        let mut shard_entries = BTreeMap::new();
        shard_entries.insert(DictPath::from_u64(5, 64), leaf_cell(5));
        let shard_hashes_root = dict::build(&shard_entries, 64, &mut |c| {
            store.insert(c.hash(), c);
        });

        let config = leaf_cell(1);
        store.insert(config.hash(), config.clone());

        let mut old_blocks = BTreeMap::new();
        old_blocks.insert(DictPath::from_u64(9, 32), leaf_cell(9));
        let old_blocks_root = dict::build(&old_blocks, 32, &mut |c| {
            store.insert(c.hash(), c);
        });

        let validator_stats = leaf_cell(2);
        let creator_stats = leaf_cell(3);
        let out_msg_queue_info = leaf_cell(4);
        store.insert(validator_stats.hash(), validator_stats.clone());
        store.insert(creator_stats.hash(), creator_stats.clone());
        store.insert(out_msg_queue_info.hash(), out_msg_queue_info.clone());

        let stats_cell = Cell::new_ordinary(
            vec![],
            0,
            vec![old_blocks_root.hash(), validator_stats.hash(), creator_stats.hash(), out_msg_queue_info.hash()],
        );
        store.insert(stats_cell.hash(), stats_cell.clone());

        let libraries = leaf_cell(6);
        store.insert(libraries.hash(), libraries.clone());

        let mc_extra = Cell::new_ordinary(
            vec![],
            0,
            vec![shard_hashes_root.hash(), config.hash(), stats_cell.hash(), libraries.hash()],
        );
        store.insert(mc_extra.hash(), mc_extra.clone());

        let accounts = leaf_cell(0);
        store.insert(accounts.hash(), accounts.clone());

        let state_root = Cell::new_ordinary(vec![], 0, vec![accounts.hash(), mc_extra.hash()]);
        store.insert(state_root.hash(), state_root.clone());

        let _ = StateRootRef::Accounts;
        (state_root.hash(), store, shard_hashes_root.hash(), old_blocks_root.hash())
    }

    #[test]
    fn shard_info_proof_finds_present_shard() {
        let (root, store, _shard_root, _old_root) = build_masterchain_state_fixture();
        let (proof, hit) = shard_info_in_state_proof(&store, root, ShardPrefix::new(5), true).unwrap();
        assert!(hit.is_some());
        proof.verify(root).unwrap();
    }

    #[test]
    fn ancestor_block_proof_finds_known_seqno() {
        let (root, store, _shard_root, _old_root) = build_masterchain_state_fixture();
        let (proof, hit) = ancestor_block_proof(&store, root, 9).unwrap();
        assert!(hit.is_some());
        proof.verify(root).unwrap();
    }

    #[test]
    fn ancestor_block_proof_is_absent_for_unknown_seqno() {
        let (root, store, _shard_root, _old_root) = build_masterchain_state_fixture();
        let (proof, hit) = ancestor_block_proof(&store, root, 123).unwrap();
        assert!(hit.is_none());
        proof.verify(root).unwrap();
    }
}
