use std::collections::HashMap;
use std::sync::Arc;

use archive_cells::{CellStore, CellStoreConfig};
use archive_kv::MemoryDatabase;
use archive_primitives::{BlockId, Cell, CryptoHash, ShardPrefix, MASTERCHAIN_ID};

fn block_id(seqno: u32) -> BlockId {
    BlockId {
        workchain: MASTERCHAIN_ID,
        shard: ShardPrefix::MASTERCHAIN,
        seqno,
        root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
        file_hash: CryptoHash::hash_bytes(&(seqno + 7).to_le_bytes()),
    }
}

fn open_store() -> CellStore {
    let db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
    CellStore::open(db, CellStoreConfig::default()).unwrap()
}

#[test]
fn store_then_load_a_leaf_cell() {
    let store = open_store();
    let leaf = Cell::new_ordinary(vec![1, 2, 3], 24, vec![]);
    let persisted = store.store_cell(block_id(1), leaf.clone(), &HashMap::new()).unwrap();
    assert_eq!(persisted.hash(), leaf.hash());
    assert_eq!(store.load_cell(leaf.hash()).unwrap(), leaf);
}

#[test]
fn restoring_the_same_block_id_is_idempotent() {
    let store = open_store();
    let leaf = Cell::new_ordinary(vec![9], 8, vec![]);
    let id = block_id(2);
    let first = store.store_cell(id, leaf.clone(), &HashMap::new()).unwrap();
    let second = store.store_cell(id, leaf, &HashMap::new()).unwrap();
    assert_eq!(first.hash(), second.hash());
}

#[test]
fn shared_subtree_survives_gc_of_one_root_but_not_both() {
    let store = open_store();
    let leaf = Cell::new_ordinary(vec![5], 8, vec![]);
    let leaf_hash = leaf.hash();
    let mut bodies = HashMap::new();
    bodies.insert(leaf_hash, leaf);

    let parent_a = Cell::new_ordinary(vec![1], 8, vec![leaf_hash]);
    let parent_b = Cell::new_ordinary(vec![2], 8, vec![leaf_hash]);

    store.store_cell(block_id(1), parent_a, &bodies).unwrap();
    store.store_cell(block_id(2), parent_b, &bodies).unwrap();

    // Both roots reference the shared leaf; removing the oldest must not
    // delete it because the second root still holds a reference.
    let removed = store.gc_step(|_| true).unwrap();
    assert_eq!(removed, Some(block_id(1)));
    assert!(store.load_cell(leaf_hash).is_ok());

    let removed = store.gc_step(|_| true).unwrap();
    assert_eq!(removed, Some(block_id(2)));
    assert!(store.load_cell(leaf_hash).is_err());
}

#[test]
fn gc_on_empty_store_returns_none() {
    let store = open_store();
    assert_eq!(store.gc_step(|_| true).unwrap(), None);
}

#[test]
fn gc_declines_when_callback_refuses() {
    let store = open_store();
    let leaf = Cell::new_ordinary(vec![1], 8, vec![]);
    store.store_cell(block_id(1), leaf, &HashMap::new()).unwrap();
    assert_eq!(store.gc_step(|_| false).unwrap(), None);
}

#[test]
fn missing_child_body_is_fatal_corruption() {
    let store = open_store();
    let dangling_hash = CryptoHash::hash_bytes(b"never stored");
    let parent = Cell::new_ordinary(vec![1], 8, vec![dangling_hash]);
    assert!(store.store_cell(block_id(1), parent, &HashMap::new()).is_err());
}
