//! Shared plumbing for the many §4.9 query flows that are, underneath,
//! "walk a fixed-depth dictionary nested a few refs below a state or block
//! root and prove the path" (shard-hashes, config params, global libraries,
//! creator stats, out-message-queue info, dispatch queues). Factored out
//! once instead of hand-rolled per flow.

use archive_primitives::CryptoHash;
use archive_proof::{
    build_spine_proof, dict, merge_proofs, CellSource, DictHit, DictPath, MerkleProof, ProofResult,
};

/// Looks up `key` in the dictionary rooted `spine` refs below `root_hash`
/// and returns a proof covering both the spine and the dictionary path.
pub fn lookup_and_prove(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    spine: &[usize],
    depth: u16,
    key: &DictPath,
    exact: bool,
) -> ProofResult<(MerkleProof, DictHit)> {
    let dict_root = resolve_path(source, root_hash, spine)?;
    let hit = if exact {
        dict::lookup_exact(source, dict_root, depth, key)?
    } else {
        dict::lookup_successor(source, dict_root, depth, key)?
    };
    let dict_proof = dict::prove(source, dict_root, depth, &hit, key)?;
    let spine_proof = build_spine_proof(source, root_hash, spine)?;
    Ok((merge_proofs(spine_proof, dict_proof), hit))
}

/// Like [`lookup_and_prove`], but resolves the largest key `<=` the query
/// instead of the smallest key `>=` it.
pub fn lookup_and_prove_predecessor(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    spine: &[usize],
    depth: u16,
    key: &DictPath,
) -> ProofResult<(MerkleProof, DictHit)> {
    let dict_root = resolve_path(source, root_hash, spine)?;
    let hit = dict::lookup_predecessor(source, dict_root, depth, key)?;
    let dict_proof = dict::prove(source, dict_root, depth, &hit, key)?;
    let spine_proof = build_spine_proof(source, root_hash, spine)?;
    Ok((merge_proofs(spine_proof, dict_proof), hit))
}

fn resolve_path(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    path: &[usize],
) -> ProofResult<CryptoHash> {
    let mut hash = root_hash;
    for &idx in path {
        let cell = source.get_cell(hash)?;
        hash = *cell.refs.get(idx).ok_or_else(|| {
            archive_proof::ProofError::MalformedBlock(format!("cell {hash} is missing ref {idx}"))
        })?;
    }
    Ok(hash)
}

/// Smallest path strictly greater than `path` in `path`'s own bit-width, or
/// `None` if `path` is already the all-ones maximum (iteration is done).
/// Used to walk a dictionary entry-by-entry via repeated
/// [`dict::lookup_successor`] calls, since the dictionary itself has no
/// built-in cursor.
pub fn next_path(path: &DictPath) -> Option<DictPath> {
    let mut bits = path.0.clone();
    for bit in bits.iter_mut().rev() {
        if !*bit {
            *bit = true;
            return Some(DictPath(bits));
        }
        *bit = false;
    }
    None
}

/// Largest path strictly less than `path`, or `None` if `path` is already
/// the all-zeros minimum. Mirror of [`next_path`], used for reverse-order
/// dictionary iteration (`list_block_transactions` with `reverse: true`).
pub fn prev_path(path: &DictPath) -> Option<DictPath> {
    let mut bits = path.0.clone();
    for bit in bits.iter_mut().rev() {
        if *bit {
            *bit = false;
            return Some(DictPath(bits));
        }
        *bit = true;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prev_path_borrows_across_all_clear_bits() {
        let p = DictPath::from_u64(0b100, 3);
        let n = prev_path(&p).unwrap();
        assert_eq!(n, DictPath::from_u64(0b011, 3));
    }

    #[test]
    fn prev_path_of_the_minimum_is_none() {
        let p = DictPath::from_u64(0, 3);
        assert!(prev_path(&p).is_none());
    }

    #[test]
    fn next_path_carries_across_all_set_bits() {
        let p = DictPath::from_u64(0b011, 3);
        let n = next_path(&p).unwrap();
        assert_eq!(n, DictPath::from_u64(0b100, 3));
    }

    #[test]
    fn next_path_of_the_maximum_is_none() {
        let p = DictPath::from_u64(0b111, 3);
        assert!(next_path(&p).is_none());
    }
}
