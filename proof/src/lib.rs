//! Merkle proof engine (§4.8): builds minimal, independently-virtualizable
//! proofs over the archive's cell DAG — block headers, state roots inside
//! blocks, shard-info and ancestor-block records inside masterchain states,
//! account and transaction records, and chains of links between two
//! masterchain blocks.
//!
//! Every proof is a [`merkle::MerkleProof`]: a partial copy of a cell DAG
//! with elided subtrees replaced by pruned stand-ins. `verify` is the sole
//! trust boundary — a proof that doesn't come from this crate (or an
//! equivalent independent virtualizer) gets no special treatment.

pub mod account;
pub mod block;
pub mod chain;
pub mod dict;
pub mod errors;
pub mod merkle;
pub mod transaction;

pub use account::{account_state_proof, prune_account_state_subtree, AccountStateHit};
pub use block::{
    ancestor_block_proof, block_header_proof, shard_info_in_state_proof, state_root_hash_of_block,
    state_root_in_block_proof, HeaderProofMode,
};
pub use chain::{
    build_proof_chain, shard_predecessor_link, ChainCollaborator, ChainLink, ProofChain, Validator,
    ValidatorSetSource,
};
pub use dict::{lookup_exact, lookup_predecessor, lookup_successor, DictHit, DictPath};
pub use errors::{ProofError, ProofResult};
pub use merkle::{build_path_proof, build_proof, build_spine_proof, merge_proofs, CellSource, MerkleProof};
pub use transaction::{previous_transaction, transaction_proof, TransactionHit};
