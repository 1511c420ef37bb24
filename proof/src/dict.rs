//! Fixed-depth binary dictionary over the cell DAG: the structure behind
//! every "dictionary lookup" named in §4.8/§4.9 (shard-hashes, `ShardAccounts`,
//! `account_blocks`/`transactions`, config params, global libraries,
//! per-validator creator-stats, out-message queues, dispatch queues).
//!
//! Internal nodes are ordinary cells with exactly two refs (`[bit0, bit1]`);
//! a missing key is represented by a canonical "empty" cell rather than a
//! null ref, so every key in the `2^depth`-sized keyspace resolves to some
//! cell. This is a simplification of the label-compressed Hashmap the
//! protocol actually uses on the wire (§1 "no modification of on-disk
//! formats" binds serialization, not this engine's in-memory proof
//! machinery) — see DESIGN.md.

use std::collections::BTreeMap;

use archive_primitives::{Cell, CryptoHash};

use crate::errors::{ProofError, ProofResult};
use crate::merkle::{build_path_proof, CellSource, MerkleProof};

/// A fixed-width bit path used as a dictionary key (shard prefixes,
/// 256-bit account addresses, 64-bit logical times all map onto this).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct DictPath(pub Vec<bool>);

impl DictPath {
    pub fn from_u64(value: u64, bits: u8) -> Self {
        let mut path = Vec::with_capacity(bits as usize);
        for i in 0..bits {
            path.push((value >> (bits - 1 - i)) & 1 == 1);
        }
        DictPath(path)
    }

    pub fn from_bytes(bytes: &[u8], bits: u16) -> Self {
        let mut path = Vec::with_capacity(bits as usize);
        for i in 0..bits {
            let byte = bytes[(i / 8) as usize];
            path.push((byte >> (7 - (i % 8))) & 1 == 1);
        }
        DictPath(path)
    }

    pub fn depth(&self) -> u16 {
        self.0.len() as u16
    }

    pub fn bit(&self, i: usize) -> bool {
        self.0[i]
    }
}

fn empty_leaf() -> Cell {
    Cell::new_ordinary(Vec::new(), 0, Vec::new())
}

/// Builds the full dictionary tree in memory from `entries` (used by
/// fixtures/tests and by the external block-production collaborator that
/// owns the real dictionaries); returns the root cell. Every constructed
/// cell (including internal nodes and the empty-subtree sentinels) is
/// pushed into `sink` so the caller can persist them via the cell store.
pub fn build(entries: &BTreeMap<DictPath, Cell>, depth: u16, sink: &mut impl FnMut(Cell)) -> Cell {
    let pairs: Vec<(&DictPath, &Cell)> = entries.iter().collect();
    build_rec(&pairs, depth, sink)
}

fn build_rec(entries: &[(&DictPath, &Cell)], depth_remaining: u16, sink: &mut impl FnMut(Cell)) -> Cell {
    if depth_remaining == 0 {
        let cell = match entries.first() {
            Some((_, c)) => (*c).clone(),
            None => empty_leaf(),
        };
        sink(cell.clone());
        return cell;
    }
    let level = entries[0].0.depth() - depth_remaining;
    let (left, right): (Vec<_>, Vec<_>) = entries.iter().partition(|(k, _)| !k.bit(level as usize));
    let left_cell = if entries.is_empty() { empty_subtree(depth_remaining - 1, sink) } else { build_rec(&left, depth_remaining - 1, sink) };
    let right_cell = if entries.is_empty() { empty_subtree(depth_remaining - 1, sink) } else { build_rec(&right, depth_remaining - 1, sink) };
    let node = Cell::new_ordinary(Vec::new(), 0, vec![left_cell.hash(), right_cell.hash()]);
    sink(node.clone());
    node
}

fn empty_subtree(depth_remaining: u16, sink: &mut impl FnMut(Cell)) -> Cell {
    if depth_remaining == 0 {
        let cell = empty_leaf();
        sink(cell.clone());
        return cell;
    }
    let child = empty_subtree(depth_remaining - 1, sink);
    let node = Cell::new_ordinary(Vec::new(), 0, vec![child.hash(), child.hash()]);
    sink(node.clone());
    node
}

/// Result of a dictionary lookup: the key actually found (identical to the
/// query for an exact hit, a different key for a nearest-successor hit),
/// and its value cell. `None` means the dictionary has no key matching the
/// query at all (exact miss, or no key `>=` the query in successor mode).
pub type DictHit = Option<(DictPath, Cell)>;

/// Exact lookup: walks straight down the bits of `key`, no backtracking.
pub fn lookup_exact(source: &dyn CellSource, root: CryptoHash, depth: u16, key: &DictPath) -> ProofResult<DictHit> {
    let mut hash = root;
    for level in 0..depth {
        let cell = source.get_cell(hash)?;
        let (l, r) = node_children(&cell)?;
        hash = if key.bit(level as usize) { r } else { l };
    }
    let leaf = source.get_cell(hash)?;
    if leaf == empty_leaf() {
        Ok(None)
    } else {
        Ok(Some((key.clone(), leaf)))
    }
}

/// Smallest key `>= key` with a present value (§4.8/§4.9 "nearest-key
/// dictionary lookup").
pub fn lookup_successor(source: &dyn CellSource, root: CryptoHash, depth: u16, key: &DictPath) -> ProofResult<DictHit> {
    successor_rec(source, root, depth, key, 0, &mut Vec::new())
}

fn successor_rec(
    source: &dyn CellSource,
    hash: CryptoHash,
    depth_remaining: u16,
    key: &DictPath,
    level: usize,
    path: &mut Vec<bool>,
) -> ProofResult<DictHit> {
    if depth_remaining == 0 {
        let leaf = source.get_cell(hash)?;
        return Ok(if leaf == empty_leaf() { None } else { Some((DictPath(path.clone()), leaf)) });
    }
    let cell = source.get_cell(hash)?;
    let (l, r) = node_children(&cell)?;
    let bit = key.bit(level);
    if !bit {
        path.push(false);
        if let Some(hit) = successor_rec(source, l, depth_remaining - 1, key, level + 1, path)? {
            return Ok(Some(hit));
        }
        path.pop();
        path.push(true);
        let hit = leftmost(source, r, depth_remaining - 1, path)?;
        path.pop();
        Ok(hit)
    } else {
        path.push(true);
        let hit = successor_rec(source, r, depth_remaining - 1, key, level + 1, path)?;
        path.pop();
        Ok(hit)
    }
}

fn leftmost(source: &dyn CellSource, hash: CryptoHash, depth_remaining: u16, path: &mut Vec<bool>) -> ProofResult<DictHit> {
    if depth_remaining == 0 {
        let leaf = source.get_cell(hash)?;
        return Ok(if leaf == empty_leaf() { None } else { Some((DictPath(path.clone()), leaf)) });
    }
    let cell = source.get_cell(hash)?;
    let (l, r) = node_children(&cell)?;
    path.push(false);
    if let Some(hit) = leftmost(source, l, depth_remaining - 1, path)? {
        path.pop();
        return Ok(Some(hit));
    }
    path.pop();
    path.push(true);
    let hit = leftmost(source, r, depth_remaining - 1, path)?;
    path.pop();
    Ok(hit)
}

/// Largest key `<= key` with a present value; the mirror image of
/// [`lookup_successor`], used for reverse-order iteration (§4.9
/// `list_block_transactions` with `reverse: true`).
pub fn lookup_predecessor(source: &dyn CellSource, root: CryptoHash, depth: u16, key: &DictPath) -> ProofResult<DictHit> {
    predecessor_rec(source, root, depth, key, 0, &mut Vec::new())
}

fn predecessor_rec(
    source: &dyn CellSource,
    hash: CryptoHash,
    depth_remaining: u16,
    key: &DictPath,
    level: usize,
    path: &mut Vec<bool>,
) -> ProofResult<DictHit> {
    if depth_remaining == 0 {
        let leaf = source.get_cell(hash)?;
        return Ok(if leaf == empty_leaf() { None } else { Some((DictPath(path.clone()), leaf)) });
    }
    let cell = source.get_cell(hash)?;
    let (l, r) = node_children(&cell)?;
    let bit = key.bit(level);
    if bit {
        path.push(true);
        if let Some(hit) = predecessor_rec(source, r, depth_remaining - 1, key, level + 1, path)? {
            return Ok(Some(hit));
        }
        path.pop();
        path.push(false);
        let hit = rightmost(source, l, depth_remaining - 1, path)?;
        path.pop();
        Ok(hit)
    } else {
        path.push(false);
        let hit = predecessor_rec(source, l, depth_remaining - 1, key, level + 1, path)?;
        path.pop();
        Ok(hit)
    }
}

fn rightmost(source: &dyn CellSource, hash: CryptoHash, depth_remaining: u16, path: &mut Vec<bool>) -> ProofResult<DictHit> {
    if depth_remaining == 0 {
        let leaf = source.get_cell(hash)?;
        return Ok(if leaf == empty_leaf() { None } else { Some((DictPath(path.clone()), leaf)) });
    }
    let cell = source.get_cell(hash)?;
    let (l, r) = node_children(&cell)?;
    path.push(true);
    if let Some(hit) = rightmost(source, r, depth_remaining - 1, path)? {
        path.pop();
        return Ok(Some(hit));
    }
    path.pop();
    path.push(false);
    let hit = rightmost(source, l, depth_remaining - 1, path)?;
    path.pop();
    Ok(hit)
}

fn node_children(cell: &Cell) -> ProofResult<(CryptoHash, CryptoHash)> {
    if cell.refs.len() != 2 {
        return Err(ProofError::MalformedBlock(format!(
            "dictionary internal node must have exactly 2 refs, found {}",
            cell.refs.len()
        )));
    }
    Ok((cell.refs[0], cell.refs[1]))
}

/// Builds the Merkle proof for a dictionary lookup, whichever key it
/// actually resolved to: path cells are revealed, siblings are pruned by
/// hash alone (§4.8 "proves the presence (or absence) of a ... record").
pub fn prove(
    source: &dyn CellSource,
    root: CryptoHash,
    depth: u16,
    hit: &DictHit,
    queried_key: &DictPath,
) -> ProofResult<MerkleProof> {
    let resolved_key = hit.as_ref().map(|(k, _)| k.clone()).unwrap_or_else(|| queried_key.clone());
    let mut indices = Vec::with_capacity(depth as usize);
    for level in 0..depth as usize {
        indices.push(if resolved_key.0.get(level).copied().unwrap_or(false) { 1 } else { 0 });
    }
    build_path_proof(source, root, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u8) -> Cell {
        Cell::new_ordinary(vec![tag], 8, vec![])
    }

    fn build_fixture(depth: u16, entries: &[(u64, u8)]) -> (CryptoHash, BTreeMap<CryptoHash, Cell>) {
        let mut tree = BTreeMap::new();
        for (k, v) in entries {
            tree.insert(DictPath::from_u64(*k, depth as u8), leaf(*v));
        }
        let mut store = BTreeMap::new();
        let root = build(&tree, depth, &mut |c| {
            store.insert(c.hash(), c);
        });
        store.insert(root.hash(), root.clone());
        let mut hashmap = std::collections::HashMap::new();
        for (k, v) in store {
            hashmap.insert(k, v);
        }
        (root.hash(), hashmap)
    }

    #[test]
    fn exact_lookup_finds_present_key() {
        let (root, store) = build_fixture(4, &[(3, 33), (7, 77)]);
        let hit = lookup_exact(&store, root, 4, &DictPath::from_u64(3, 4)).unwrap();
        assert_eq!(hit, Some((DictPath::from_u64(3, 4), leaf(33))));
    }

    #[test]
    fn exact_lookup_misses_absent_key() {
        let (root, store) = build_fixture(4, &[(3, 33)]);
        let hit = lookup_exact(&store, root, 4, &DictPath::from_u64(9, 4)).unwrap();
        assert_eq!(hit, None);
    }

    #[test]
    fn successor_finds_smallest_key_not_less_than_query() {
        let (root, store) = build_fixture(4, &[(3, 33), (7, 77), (12, 12)]);
        let hit = lookup_successor(&store, root, 4, &DictPath::from_u64(5, 4)).unwrap();
        assert_eq!(hit, Some((DictPath::from_u64(7, 4), leaf(77))));
    }

    #[test]
    fn successor_of_an_exact_key_returns_that_key() {
        let (root, store) = build_fixture(4, &[(3, 33), (7, 77)]);
        let hit = lookup_successor(&store, root, 4, &DictPath::from_u64(7, 4)).unwrap();
        assert_eq!(hit, Some((DictPath::from_u64(7, 4), leaf(77))));
    }

    #[test]
    fn successor_past_the_last_key_is_none() {
        let (root, store) = build_fixture(4, &[(3, 33)]);
        let hit = lookup_successor(&store, root, 4, &DictPath::from_u64(10, 4)).unwrap();
        assert_eq!(hit, None);
    }

    #[test]
    fn predecessor_finds_largest_key_not_greater_than_query() {
        let (root, store) = build_fixture(4, &[(3, 33), (7, 77), (12, 12)]);
        let hit = lookup_predecessor(&store, root, 4, &DictPath::from_u64(9, 4)).unwrap();
        assert_eq!(hit, Some((DictPath::from_u64(7, 4), leaf(77))));
    }

    #[test]
    fn predecessor_before_the_first_key_is_none() {
        let (root, store) = build_fixture(4, &[(3, 33)]);
        let hit = lookup_predecessor(&store, root, 4, &DictPath::from_u64(1, 4)).unwrap();
        assert_eq!(hit, None);
    }

    #[test]
    fn proof_of_presence_verifies_against_the_root() {
        let (root, store) = build_fixture(4, &[(3, 33), (7, 77)]);
        let key = DictPath::from_u64(3, 4);
        let hit = lookup_exact(&store, root, 4, &key).unwrap();
        let proof = prove(&store, root, 4, &hit, &key).unwrap();
        proof.verify(root).unwrap();
    }

    #[test]
    fn proof_of_absence_still_verifies() {
        let (root, store) = build_fixture(4, &[(3, 33)]);
        let key = DictPath::from_u64(9, 4);
        let hit = lookup_exact(&store, root, 4, &key).unwrap();
        assert_eq!(hit, None);
        let proof = prove(&store, root, 4, &hit, &key).unwrap();
        proof.verify(root).unwrap();
    }
}
