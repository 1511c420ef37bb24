//! Minimal Merkle-proof virtualization (§4.8, GLOSSARY "Merkle proof"):
//! a partial copy of a cell DAG where elided subtrees are replaced by
//! pruned-branch stand-ins carrying only a hash. A proof is sound exactly
//! when every cell it claims to include hashes to what its parent's ref
//! says it should, all the way up to a claimed root.

use std::collections::HashMap;

use archive_primitives::{Cell, CryptoHash};

use crate::errors::{ProofError, ProofResult};

/// Something that can resolve a cell by content hash: `archive_cells::CellStore`
/// in production, an in-memory fixture in tests.
pub trait CellSource {
    fn get_cell(&self, hash: CryptoHash) -> ProofResult<Cell>;
}

impl CellSource for archive_cells::CellStore {
    fn get_cell(&self, hash: CryptoHash) -> ProofResult<Cell> {
        Ok(self.load_cell(hash)?)
    }
}

impl CellSource for HashMap<CryptoHash, Cell> {
    fn get_cell(&self, hash: CryptoHash) -> ProofResult<Cell> {
        self.get(&hash).cloned().ok_or(ProofError::MissingCell(hash))
    }
}

/// A partial DAG: full bodies for every cell on a revealed path, pruned
/// stand-ins (`Cell::new_pruned`) for every subtree elided from it. `root`
/// is the hash the proof claims to be rooted at (§4.8 "every proof root
/// hash matches the referenced block's root hash").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub root: CryptoHash,
    pub cells: HashMap<CryptoHash, Cell>,
}

impl MerkleProof {
    /// Checks that `root` is present and that every non-pruned cell's refs
    /// resolve to another cell present in the map (full or pruned), with
    /// every cell's own `hash()` matching the key it is stored under
    /// (§8 property 5: "any bit-flip in the proof bytes causes rejection" —
    /// a tampered cell simply fails to appear under its own hash).
    pub fn verify(&self, claimed_root_hash: CryptoHash) -> ProofResult<()> {
        if self.root != claimed_root_hash {
            return Err(ProofError::RootMismatch { got: self.root, want: claimed_root_hash });
        }
        let mut visited = std::collections::HashSet::new();
        self.check(self.root, &mut visited)
    }

    fn check(&self, hash: CryptoHash, visited: &mut std::collections::HashSet<CryptoHash>) -> ProofResult<()> {
        if !visited.insert(hash) {
            return Ok(());
        }
        let cell = self
            .cells
            .get(&hash)
            .ok_or_else(|| ProofError::Inconsistent(format!("proof does not include cell {hash}")))?;
        if cell.hash() != hash {
            return Err(ProofError::Inconsistent(format!(
                "cell stored under {hash} actually hashes to {}",
                cell.hash()
            )));
        }
        if cell.is_pruned() {
            return Ok(());
        }
        for child in &cell.refs {
            self.check(*child, visited)?;
        }
        Ok(())
    }

    /// Number of cells included in full (i.e. not pruned); a cheap proxy
    /// for proof size in tests and logging.
    pub fn revealed_len(&self) -> usize {
        self.cells.values().filter(|c| !c.is_pruned()).count()
    }
}

/// Builds a proof of `root_hash` in which every cell accepted by `keep` is
/// expanded in full and recursed into, and every other cell is replaced by
/// a pruned stand-in. `keep` receives the path of ref-indices from the
/// root so callers can gate entire named subtrees (§4.8 "mode bitmask").
pub fn build_proof(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    mut keep: impl FnMut(&[usize]) -> bool,
) -> ProofResult<MerkleProof> {
    let mut cells = HashMap::new();
    let mut path = Vec::new();
    build_rec(source, root_hash, &mut keep, &mut path, &mut cells)?;
    let proof = MerkleProof { root: root_hash, cells };
    tracing::debug!(root = %root_hash, revealed = proof.revealed_len(), total = proof.cells.len(), "built merkle proof");
    Ok(proof)
}

fn build_rec(
    source: &dyn CellSource,
    hash: CryptoHash,
    keep: &mut impl FnMut(&[usize]) -> bool,
    path: &mut Vec<usize>,
    out: &mut HashMap<CryptoHash, Cell>,
) -> ProofResult<()> {
    if out.contains_key(&hash) {
        return Ok(());
    }
    if path.is_empty() || keep(path) {
        let cell = source.get_cell(hash)?;
        for (idx, child) in cell.refs.clone().into_iter().enumerate() {
            path.push(idx);
            build_rec(source, child, keep, path, out)?;
            path.pop();
        }
        out.insert(hash, cell);
    } else {
        let cell = source.get_cell(hash)?;
        out.insert(hash, Cell::new_pruned(hash, estimate_depth(&cell)));
    }
    Ok(())
}

/// Pruned-branch cells carry a depth hint purely for protocol fidelity;
/// this engine's `Cell::hash` does not depend on it (§4.2 cell.rs), so any
/// finite estimate is safe. Real depth would require a DFS of the elided
/// subtree, defeating the point of eliding it.
fn estimate_depth(cell: &Cell) -> u16 {
    if cell.refs.is_empty() {
        0
    } else {
        1
    }
}

/// Builds a proof that reveals only cells on the path named by `indices`
/// at each level (e.g. `[3, 0]` = root's 4th ref, then that cell's 1st
/// ref), pruning every sibling. The named cell itself is revealed (its data
/// is readable) but anything beyond it is pruned — a dictionary leaf that
/// happens to point at another subtree does not drag that subtree along.
/// Used by the dictionary-lookup proofs, which already know the exact path
/// to the entry they want to reveal.
pub fn build_path_proof(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    path: &[usize],
) -> ProofResult<MerkleProof> {
    build_proof(source, root_hash, |at| path.starts_with(at))
}

/// Like [`build_path_proof`], but stops one short of `path`'s last cell:
/// every ancestor is revealed so the verifier can walk down the spine, but
/// the cell `path` itself names is left pruned. Callers that already have
/// a separately built proof rooted at that cell (e.g. a dictionary-lookup
/// proof) merge it in with [`merge_proofs`] to get the full picture without
/// `build_proof` redundantly expanding the subtree a second time.
pub fn build_spine_proof(
    source: &dyn CellSource,
    root_hash: CryptoHash,
    path: &[usize],
) -> ProofResult<MerkleProof> {
    build_proof(source, root_hash, |at| at.len() < path.len() && path.starts_with(at))
}

/// Combines two proofs sharing the same root: `overlay`'s cells take
/// precedence, so a fully revealed cell in `overlay` replaces a pruned
/// stand-in for the same hash in `base`.
pub fn merge_proofs(base: MerkleProof, overlay: MerkleProof) -> MerkleProof {
    let mut cells = base.cells;
    for (hash, cell) in overlay.cells {
        cells.insert(hash, cell);
    }
    MerkleProof { root: base.root, cells }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u8) -> Cell {
        Cell::new_ordinary(vec![tag], 8, vec![])
    }

    #[test]
    fn full_reveal_round_trips_and_verifies() {
        let a = leaf(1);
        let b = leaf(2);
        let root = Cell::new_ordinary(vec![], 0, vec![a.hash(), b.hash()]);
        let mut store = HashMap::new();
        store.insert(a.hash(), a.clone());
        store.insert(b.hash(), b.clone());
        store.insert(root.hash(), root.clone());

        let proof = build_proof(&store, root.hash(), |_| true).unwrap();
        proof.verify(root.hash()).unwrap();
        assert_eq!(proof.revealed_len(), 3);
    }

    #[test]
    fn elided_sibling_still_verifies_but_is_pruned() {
        let a = leaf(1);
        let b = leaf(2);
        let root = Cell::new_ordinary(vec![], 0, vec![a.hash(), b.hash()]);
        let mut store = HashMap::new();
        store.insert(a.hash(), a.clone());
        store.insert(b.hash(), b.clone());
        store.insert(root.hash(), root.clone());

        let proof = build_path_proof(&store, root.hash(), &[0]).unwrap();
        proof.verify(root.hash()).unwrap();
        assert_eq!(proof.revealed_len(), 2); // root + a, b pruned
        assert!(proof.cells.get(&b.hash()).unwrap().is_pruned());
    }

    #[test]
    fn tampering_with_a_revealed_cell_breaks_verification() {
        let a = leaf(1);
        let root = Cell::new_ordinary(vec![], 0, vec![a.hash()]);
        let mut store = HashMap::new();
        store.insert(a.hash(), a.clone());
        store.insert(root.hash(), root.clone());
        let mut proof = build_proof(&store, root.hash(), |_| true).unwrap();

        let tampered = Cell::new_ordinary(vec![99], 8, vec![]);
        proof.cells.insert(a.hash(), tampered);
        assert!(proof.verify(root.hash()).is_err());
    }

    #[test]
    fn wrong_claimed_root_is_rejected() {
        let a = leaf(1);
        let root = Cell::new_ordinary(vec![], 0, vec![a.hash()]);
        let mut store = HashMap::new();
        store.insert(a.hash(), a.clone());
        store.insert(root.hash(), root.clone());
        let proof = build_proof(&store, root.hash(), |_| true).unwrap();
        assert!(proof.verify(CryptoHash::hash_bytes(b"not the root")).is_err());
    }
}
