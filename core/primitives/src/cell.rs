use borsh::{BorshDeserialize, BorshSerialize};

use crate::hash::CryptoHash;

/// Maximum number of child references a cell may carry (GLOSSARY: "Cell").
pub const MAX_REFS: usize = 4;
/// Maximum number of data bits a cell may carry.
pub const MAX_DATA_BITS: usize = 1023;

/// Marks a cell as carrying special (non-ordinary) semantics. Pruned cells
/// stand in for an elided subtree in a Merkle proof; library cells reference
/// shared code; merkle-proof/merkle-update cells wrap a state transition.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CellKind {
    #[default]
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

/// Immutable content-addressed DAG node (GLOSSARY: "Cell"). Two cells with
/// equal hash are, by construction, identical subtrees: the store never
/// needs to compare bodies, only hashes.
#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq, Debug)]
pub struct Cell {
    pub kind: CellKind,
    /// Raw bit-packed payload, at most [`MAX_DATA_BITS`] bits; the final byte
    /// may be partially used, with `bit_len` tracking the exact count.
    pub data: Vec<u8>,
    pub bit_len: u16,
    pub refs: Vec<CryptoHash>,
    /// Present only on pruned branches: the hash and depth the elided
    /// subtree would have proven, so a virtualizer can still compute the
    /// parent's hash without the subtree's bytes.
    pub pruned_hash: Option<CryptoHash>,
    pub pruned_depth: u16,
}

impl Cell {
    pub fn new_ordinary(data: Vec<u8>, bit_len: u16, refs: Vec<CryptoHash>) -> Self {
        Cell { kind: CellKind::Ordinary, data, bit_len, refs, pruned_hash: None, pruned_depth: 0 }
    }

    pub fn new_pruned(hash: CryptoHash, depth: u16) -> Self {
        Cell {
            kind: CellKind::PrunedBranch,
            data: Vec::new(),
            bit_len: 0,
            refs: Vec::new(),
            pruned_hash: Some(hash),
            pruned_depth: depth,
        }
    }

    pub fn is_pruned(&self) -> bool {
        matches!(self.kind, CellKind::PrunedBranch)
    }

    /// Content hash of this cell, computed over its canonical encoding.
    /// Equal bytes always hash to the same value, so the cell store can use
    /// this as the sole key into its DAG.
    pub fn hash(&self) -> CryptoHash {
        if let (CellKind::PrunedBranch, Some(h)) = (self.kind, self.pruned_hash) {
            return h;
        }
        let mut buf = Vec::with_capacity(2 + self.data.len() + self.refs.len() * 32);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.bit_len.to_le_bytes());
        buf.extend_from_slice(&self.data);
        for r in &self.refs {
            buf.extend_from_slice(r.as_bytes());
        }
        CryptoHash::hash_bytes(&buf)
    }

    pub fn is_special(&self) -> bool {
        !matches!(self.kind, CellKind::Ordinary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bodies_hash_equal() {
        let a = Cell::new_ordinary(vec![1, 2, 3], 24, vec![]);
        let b = Cell::new_ordinary(vec![1, 2, 3], 24, vec![]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn differing_refs_change_the_hash() {
        let a = Cell::new_ordinary(vec![1], 8, vec![CryptoHash::hash_bytes(b"x")]);
        let b = Cell::new_ordinary(vec![1], 8, vec![CryptoHash::hash_bytes(b"y")]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn pruned_branch_hash_is_the_carried_hash() {
        let target = CryptoHash::hash_bytes(b"elided-subtree");
        let pruned = Cell::new_pruned(target, 3);
        assert_eq!(pruned.hash(), target);
    }
}
