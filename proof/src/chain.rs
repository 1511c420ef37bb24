//! Proof-chain proof (§4.8): a sequence of "links" connecting two
//! masterchain blocks `from -> to`, each either a forward link (through a
//! key block's validator set and its signatures over the destination) or a
//! backward link (through a key block's state and an ancestor-block proof).
//!
//! The validator set and the seqno-to-root-hash/key-block mapping are not
//! things this crate can derive from cells alone — they come from the
//! surrounding node (chain state, validator-session subsystem), reached
//! here only through the `ChainCollaborator`/`ValidatorSetSource` trait
//! boundaries named in the external-interfaces notes.

use archive_primitives::{
    BlockId, BlockInfoFields, BlockSignature, CryptoHash, MASTERCHAIN_ID, ShardPrefix,
    INFO_REF_PREV_SIGNATURES,
};
use borsh::BorshDeserialize;

use crate::block::{self, HeaderProofMode};
use crate::errors::{ProofError, ProofResult};
use crate::merkle::{CellSource, MerkleProof};

/// One signer's weight in a validator set, as extracted from a key block's
/// configuration by the surrounding node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validator {
    pub id_short: CryptoHash,
    pub weight: u64,
}

/// Maps masterchain seqnos to block roots and walks key-block boundaries;
/// implemented by the surrounding node, not by this crate.
pub trait ChainCollaborator {
    fn block_root_hash(&self, seqno: u32) -> ProofResult<CryptoHash>;
    fn is_key_block(&self, seqno: u32) -> ProofResult<bool>;
    /// Smallest key-block seqno strictly greater than `after`, if any.
    fn next_key_block_seqno(&self, after: u32) -> ProofResult<Option<u32>>;
    /// Largest key-block seqno strictly less than `before`, if any (0 —
    /// the zerostate — counts as the universal predecessor key block).
    fn prev_key_block_seqno(&self, before: u32) -> ProofResult<Option<u32>>;
}

/// Supplies the validator set effective from a given key block; an
/// external collaborator because deriving it requires decoding config
/// params this engine treats as opaque.
pub trait ValidatorSetSource {
    fn validator_set(&self, key_block_seqno: u32) -> ProofResult<Vec<Validator>>;
}

#[derive(Clone, Debug)]
pub enum ChainLink {
    Forward {
        source_seqno: u32,
        dest_seqno: u32,
        header_proof: MerkleProof,
        dest_fields: BlockInfoFields,
        signatures: Vec<BlockSignature>,
    },
    Backward {
        source_key_seqno: u32,
        dest_seqno: u32,
        source_state_proof: MerkleProof,
        ancestor_proof: MerkleProof,
    },
}

#[derive(Clone, Debug)]
pub struct ProofChain {
    pub links: Vec<ChainLink>,
    pub complete: bool,
}

/// Chains never exceed this many links (§4.8).
pub const MAX_CHAIN_LINKS: u32 = 16;

fn mc_block_id(seqno: u32) -> BlockId {
    BlockId {
        workchain: MASTERCHAIN_ID,
        shard: ShardPrefix::MASTERCHAIN,
        seqno,
        root_hash: CryptoHash::ZERO,
        file_hash: CryptoHash::ZERO,
    }
}

/// Builds a proof chain `from -> to`: advances forward through key blocks
/// when `to` is ahead, backward through key blocks and ancestor-block
/// proofs when `to` is behind, stopping as soon as a link lands on `to`.
pub fn build_proof_chain(
    cells: &dyn CellSource,
    chain: &dyn ChainCollaborator,
    validators: &dyn ValidatorSetSource,
    from_seqno: u32,
    to_seqno: u32,
) -> ProofResult<ProofChain> {
    let _span = tracing::debug_span!("build_proof_chain", from_seqno, to_seqno).entered();
    let mut links = Vec::new();
    let mut cur = from_seqno;

    while cur != to_seqno {
        if links.len() as u32 >= MAX_CHAIN_LINKS {
            return Err(ProofError::ChainBudgetExceeded(MAX_CHAIN_LINKS));
        }
        if cur < to_seqno {
            links.push(forward_link(cells, chain, validators, cur, to_seqno)?);
        } else {
            links.push(backward_link(cells, chain, cur, to_seqno)?);
        }
        cur = match links.last().unwrap() {
            ChainLink::Forward { dest_seqno, .. } => *dest_seqno,
            ChainLink::Backward { dest_seqno, .. } => *dest_seqno,
        };
    }

    Ok(ProofChain { links, complete: cur == to_seqno })
}

fn forward_link(
    cells: &dyn CellSource,
    chain: &dyn ChainCollaborator,
    validators: &dyn ValidatorSetSource,
    cur: u32,
    to_seqno: u32,
) -> ProofResult<ChainLink> {
    if cur != 0 && !chain.is_key_block(cur)? {
        return Err(ProofError::NotAKeyBlock(mc_block_id(cur)));
    }
    let dest_seqno = match chain.next_key_block_seqno(cur)? {
        Some(k) if k < to_seqno => k,
        _ => to_seqno,
    };
    let dest_root = chain.block_root_hash(dest_seqno)?;
    let mode = HeaderProofMode { prev_signatures: true, ..Default::default() };
    let (header_proof, dest_fields) = block::block_header_proof(cells, dest_root, mode)?;

    let signatures = read_signatures(cells, dest_root)?;
    let validator_set = validators.validator_set(cur)?;
    let total_weight: u64 = validator_set.iter().map(|v| v.weight).sum();
    let covered = signing_weight(&validator_set, &signatures);
    let threshold = (total_weight * 2) / 3;
    if covered <= threshold {
        return Err(ProofError::InsufficientSignatureWeight { covered, threshold });
    }

    Ok(ChainLink::Forward { source_seqno: cur, dest_seqno, header_proof, dest_fields, signatures })
}

fn backward_link(
    cells: &dyn CellSource,
    chain: &dyn ChainCollaborator,
    cur: u32,
    to_seqno: u32,
) -> ProofResult<ChainLink> {
    let prev_key = chain.prev_key_block_seqno(cur)?.unwrap_or(0);
    let dest_seqno = if prev_key > to_seqno { prev_key } else { to_seqno };

    let key_root = chain.block_root_hash(cur)?;
    let state_root = block::state_root_hash_of_block(cells, key_root)?;
    let (ancestor_proof, hit) = block::ancestor_block_proof(cells, state_root, dest_seqno)?;
    if hit.is_none() {
        return Err(ProofError::Inconsistent(format!(
            "masterchain block {cur} does not carry {dest_seqno} in old_mc_blocks"
        )));
    }
    let source_state_proof = block::state_root_in_block_proof(cells, key_root, state_root)?;

    Ok(ChainLink::Backward { source_key_seqno: cur, dest_seqno, source_state_proof, ancestor_proof })
}

/// One hop of a shard-block predecessor walk (§4.9 `get_shard_block_proof`
/// / `lookup_block_with_proof`): proves `dest_root_hash`'s header (and
/// whatever signatures it carries), attributed to stepping forward from
/// `source_seqno`. Shaped like [`ChainLink::Forward`] because the evidence
/// is the same shape, but unlike [`forward_link`] this does not check
/// signature weight against a validator set — shard blocks are signed by
/// their own shard's rotating validator subset, which this crate has no
/// collaborator seam to resolve, so the link is evidentiary (it shows the
/// announced header) rather than weight-verified.
pub fn shard_predecessor_link(
    cells: &dyn CellSource,
    source_seqno: u32,
    dest_root_hash: CryptoHash,
) -> ProofResult<ChainLink> {
    let mode = HeaderProofMode { prev_signatures: true, ..Default::default() };
    let (header_proof, dest_fields) = block::block_header_proof(cells, dest_root_hash, mode)?;
    let signatures = read_signatures(cells, dest_root_hash)?;
    Ok(ChainLink::Forward { source_seqno, dest_seqno: dest_fields.seqno, header_proof, dest_fields, signatures })
}

fn read_signatures(cells: &dyn CellSource, block_root_hash: CryptoHash) -> ProofResult<Vec<BlockSignature>> {
    use archive_primitives::BlockRootRef;
    let root = cells.get_cell(block_root_hash)?;
    let info_hash = *root
        .refs
        .get(BlockRootRef::Info as usize)
        .ok_or_else(|| ProofError::MalformedBlock("block root is missing info".into()))?;
    let info = cells.get_cell(info_hash)?;
    let Some(sig_hash) = info.refs.get(INFO_REF_PREV_SIGNATURES).copied() else {
        return Ok(Vec::new());
    };
    let sig_cell = cells.get_cell(sig_hash)?;
    Vec::<BlockSignature>::try_from_slice(&sig_cell.data)
        .map_err(|e| ProofError::MalformedBlock(format!("undecodable signature set: {e}")))
}

fn signing_weight(validator_set: &[Validator], signatures: &[BlockSignature]) -> u64 {
    let signed: std::collections::HashSet<CryptoHash> =
        signatures.iter().map(|s| s.validator_id_short).collect();
    validator_set.iter().filter(|v| signed.contains(&v.id_short)).map(|v| v.weight).sum()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use archive_primitives::Cell;

    use super::*;

    struct Fixture {
        store: HashMap<CryptoHash, Cell>,
        roots: HashMap<u32, CryptoHash>,
        key_blocks: Vec<u32>,
    }

    impl Fixture {
        fn block_with_signatures(&mut self, seqno: u32, sigs: Vec<BlockSignature>) -> CryptoHash {
            let sig_bytes = borsh::to_vec(&sigs).unwrap();
            let sig_cell = Cell::new_ordinary(sig_bytes, 0, vec![]);
            self.store.insert(sig_cell.hash(), sig_cell.clone());
            let info = Cell::new_ordinary(
                BlockInfoFields {
                    version: 0,
                    not_master: false,
                    after_merge: false,
                    before_split: false,
                    after_split: false,
                    want_split: false,
                    want_merge: false,
                    key_block: true,
                    seqno,
                    shard: ShardPrefix::MASTERCHAIN,
                    gen_utime: seqno,
                    start_lt: 0,
                    end_lt: 0,
                    gen_validator_list_hash_short: 0,
                    gen_catchain_seqno: 0,
                    min_ref_mc_seqno: 0,
                    prev_key_block_seqno: 0,
                    vert_seqno: 0,
                }
                .pack(),
                0,
                vec![sig_cell.hash()],
            );
            self.store.insert(info.hash(), info.clone());
            let value_flow = Cell::new_ordinary(vec![], 0, vec![]);
            let state_update = Cell::new_ordinary(vec![], 0, vec![]);
            let shard_hashes = Cell::new_ordinary(vec![], 0, vec![]);
            let config = Cell::new_ordinary(vec![], 0, vec![]);
            let queues = Cell::new_ordinary(vec![], 0, vec![]);
            let libraries = Cell::new_ordinary(vec![], 0, vec![]);
            for c in [&value_flow, &state_update, &shard_hashes, &config, &queues, &libraries] {
                self.store.insert(c.hash(), c.clone());
            }
            let extra = Cell::new_ordinary(
                vec![],
                0,
                vec![shard_hashes.hash(), config.hash(), queues.hash(), libraries.hash()],
            );
            self.store.insert(extra.hash(), extra.clone());
            let root = Cell::new_ordinary(
                vec![],
                0,
                vec![info.hash(), value_flow.hash(), state_update.hash(), extra.hash()],
            );
            self.store.insert(root.hash(), root.clone());
            self.roots.insert(seqno, root.hash());
            root.hash()
        }
    }

    impl ChainCollaborator for Fixture {
        fn block_root_hash(&self, seqno: u32) -> ProofResult<CryptoHash> {
            self.roots.get(&seqno).copied().ok_or(ProofError::MissingCell(CryptoHash::ZERO))
        }
        fn is_key_block(&self, seqno: u32) -> ProofResult<bool> {
            Ok(self.key_blocks.contains(&seqno))
        }
        fn next_key_block_seqno(&self, after: u32) -> ProofResult<Option<u32>> {
            Ok(self.key_blocks.iter().copied().filter(|k| *k > after).min())
        }
        fn prev_key_block_seqno(&self, before: u32) -> ProofResult<Option<u32>> {
            Ok(self.key_blocks.iter().copied().filter(|k| *k < before).max())
        }
    }

    struct OneValidator(CryptoHash);
    impl ValidatorSetSource for OneValidator {
        fn validator_set(&self, _key_block_seqno: u32) -> ProofResult<Vec<Validator>> {
            Ok(vec![Validator { id_short: self.0, weight: 100 }])
        }
    }

    #[test]
    fn single_forward_link_with_sufficient_signatures_succeeds() {
        let signer = CryptoHash::hash_bytes(b"validator-0");
        let mut fixture = Fixture { store: HashMap::new(), roots: HashMap::new(), key_blocks: vec![0, 10] };
        fixture.block_with_signatures(0, vec![]);
        fixture.block_with_signatures(10, vec![BlockSignature { validator_id_short: signer, signature: vec![1, 2, 3] }]);

        let chain = build_proof_chain(&fixture.store, &fixture, &OneValidator(signer), 0, 10).unwrap();
        assert!(chain.complete);
        assert_eq!(chain.links.len(), 1);
        assert!(matches!(chain.links[0], ChainLink::Forward { .. }));
    }

    #[test]
    fn forward_link_rejects_insufficient_signature_weight() {
        let other = CryptoHash::hash_bytes(b"validator-1");
        let mut fixture = Fixture { store: HashMap::new(), roots: HashMap::new(), key_blocks: vec![0, 10] };
        fixture.block_with_signatures(0, vec![]);
        fixture.block_with_signatures(10, vec![]);

        let err = build_proof_chain(&fixture.store, &fixture, &OneValidator(other), 0, 10).unwrap_err();
        assert!(matches!(err, ProofError::InsufficientSignatureWeight { .. }));
    }
}
