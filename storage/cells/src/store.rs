use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use std::sync::Arc;

use archive_kv::{Database, DBCol, GetResult, Transaction, WriteBatch};
use archive_primitives::{BlockId, Cell, CryptoHash};

use crate::config::CellStoreConfig;
use crate::errors::{CellError, CellResult};
use crate::metrics;
use crate::record::CellRecord;
use crate::roots::{entry_key, RootEntry, SENTINEL_KEY};

const MAX_COMMIT_RETRIES: u32 = 8;

/// Persists cells under their content hash and maintains the doubly-linked
/// root list described in §3 ("Cell DB entry") / §4.2.
pub struct CellStore {
    db: Arc<dyn Database>,
    config: CellStoreConfig,
    /// Rebound whenever the underlying database's durable state advances
    /// (§4.2 "Snapshotting"); outstanding read handles keep their own
    /// cloned `Box<dyn Snapshot>` so they see a consistent view even while
    /// this field moves on.
    snapshot: RwLock<Arc<Box<dyn archive_kv::Snapshot>>>,
}

impl CellStore {
    /// Opens a cell store over `db`, creating the sentinel root-list entry
    /// if this is a fresh database.
    pub fn open(db: Arc<dyn Database>, config: CellStoreConfig) -> CellResult<Self> {
        if matches!(db.get(DBCol::CellRoots, SENTINEL_KEY)?, GetResult::Missing) {
            let sentinel = RootEntry::sentinel(SENTINEL_KEY.to_vec(), SENTINEL_KEY.to_vec());
            let mut batch = WriteBatch::new();
            batch.put(DBCol::CellRoots, SENTINEL_KEY.to_vec(), sentinel.encode());
            db.write(batch)?;
        }
        let snapshot = db.snapshot()?;
        Ok(CellStore { db, config, snapshot: RwLock::new(Arc::new(snapshot)) })
    }

    pub fn config(&self) -> &CellStoreConfig {
        &self.config
    }

    /// Rebinds the read snapshot to the database's current durable state.
    /// Outstanding `Arc`-held snapshots from before the call remain valid
    /// for any reader still using them.
    pub fn rebind_snapshot(&self) -> CellResult<()> {
        let fresh = self.db.snapshot()?;
        *self.snapshot.write() = Arc::new(fresh);
        Ok(())
    }

    fn current_snapshot(&self) -> Arc<Box<dyn archive_kv::Snapshot>> {
        self.snapshot.read().clone()
    }

    /// Loads a cell by hash from the current read snapshot. Fails with
    /// [`CellError::NotFound`] if absent (§4.2 `load_cell`).
    pub fn load_cell(&self, hash: CryptoHash) -> CellResult<Cell> {
        let snap = self.current_snapshot();
        match snap.get(DBCol::Cells, &CellRecord::key(&hash))? {
            GetResult::Found(bytes) => Ok(CellRecord::decode(&hash, &bytes)?.cell),
            GetResult::Missing => Err(CellError::NotFound(hash)),
        }
    }

    /// Stores `cell` as the root for `block_id`, bumping the refcount of
    /// every cell transitively reachable from it by one (deduplicated per
    /// call, so a diamond-shaped shared subtree is only counted once). Cells
    /// not yet present in the store must have their bodies supplied in
    /// `bodies`; a reachable hash absent from both the store and `bodies`
    /// is data corruption and returns [`CellError::Corruption`] (§4.2
    /// Failure: "missing child refs in a stored DAG are fatal").
    ///
    /// If `block_id` already has a root, returns the existing root cell
    /// unchanged (idempotent restore of an already-known block).
    pub fn store_cell(
        &self,
        block_id: BlockId,
        cell: Cell,
        bodies: &HashMap<CryptoHash, Cell>,
    ) -> CellResult<Cell> {
        let root_hash = cell.hash();
        let entry_k = entry_key(&block_id);
        let _timer = metrics::STORE_CELL_DURATION.start_timer();

        for attempt in 0..MAX_COMMIT_RETRIES {
            let mut txn = Transaction::new(&*self.db);

            if let Some(bytes) = txn.get(DBCol::CellRoots, &entry_k)? {
                let existing = RootEntry::decode(&bytes)?;
                return self.load_cell(existing.root_hash);
            }

            let mut visited = HashSet::new();
            let mut new_cells = 0u64;
            bump_refcount_dfs(&mut txn, root_hash, &cell, bodies, &mut visited, &mut new_cells)?;

            link_new_root(&mut txn, block_id, &entry_k, root_hash)?;

            match txn.commit() {
                Ok(()) => {
                    self.rebind_snapshot()?;
                    metrics::ROOTS_STORED.inc();
                    metrics::CELLS_STORED.inc_by(new_cells);
                    tracing::debug!(target: "archive_cells", %block_id, %root_hash, "stored cell root");
                    return self.load_cell(root_hash);
                }
                Err(archive_kv::KvError::Conflict { .. }) => {
                    tracing::warn!(target: "archive_cells", attempt, %block_id, "store_cell retrying after conflict");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CellError::TooManyConflicts(MAX_COMMIT_RETRIES))
    }

    /// Picks the oldest root-list entry (the one right after the sentinel)
    /// and, if `may_delete` approves, decrements the refcount of its whole
    /// reachable subtree, deletes cells that reach zero, and unlinks the
    /// entry. Returns the deleted block id, or `None` if the list is empty
    /// or the callback declined (§4.2 GC).
    pub fn gc_step(
        &self,
        may_delete: impl FnOnce(&BlockId) -> bool,
    ) -> CellResult<Option<BlockId>> {
        for attempt in 0..MAX_COMMIT_RETRIES {
            let mut txn = Transaction::new(&*self.db);
            let sentinel_bytes = txn
                .get(DBCol::CellRoots, SENTINEL_KEY)?
                .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "missing sentinel".into()))?;
            let sentinel = RootEntry::decode(&sentinel_bytes)?;

            if sentinel.next_key == SENTINEL_KEY {
                return Ok(None); // list is empty
            }

            let oldest_bytes = txn
                .get(DBCol::CellRoots, &sentinel.next_key)?
                .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "dangling root list head".into()))?;
            let oldest = RootEntry::decode(&oldest_bytes)?;
            let block_id = oldest.block_id.expect("non-sentinel root entry always carries a block id");

            if !may_delete(&block_id) {
                return Ok(None);
            }

            let mut visited = HashSet::new();
            decrement_refcount_dfs(&mut txn, oldest.root_hash, &mut visited)?;
            unlink_root(&mut txn, &sentinel.next_key, &oldest)?;

            match txn.commit() {
                Ok(()) => {
                    self.rebind_snapshot()?;
                    metrics::ROOTS_GC_REMOVED.inc();
                    tracing::debug!(target: "archive_cells", %block_id, "gc removed root");
                    return Ok(Some(block_id));
                }
                Err(archive_kv::KvError::Conflict { .. }) => {
                    tracing::warn!(target: "archive_cells", attempt, "gc_step retrying after conflict");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CellError::TooManyConflicts(MAX_COMMIT_RETRIES))
    }

    /// Compares a cell's recorded depth against the configured compression
    /// cutoff and returns `true` if it should be enqueued for a background
    /// bag-of-cells rewrite pass (§4.2 "Optional migration").
    pub fn needs_boc_migration(&self, hash: CryptoHash, actual_depth: u16) -> CellResult<bool> {
        let snap = self.current_snapshot();
        let bytes = match snap.get(DBCol::Cells, &CellRecord::key(&hash))? {
            GetResult::Found(b) => b,
            GetResult::Missing => return Err(CellError::NotFound(hash)),
        };
        let record = CellRecord::decode(&hash, &bytes)?;
        let should_be_boc = actual_depth >= self.config.boc_depth_cutoff;
        Ok(should_be_boc != record.stored_as_boc)
    }
}

fn bump_refcount_dfs(
    txn: &mut Transaction<'_>,
    hash: CryptoHash,
    body_hint: &Cell,
    bodies: &HashMap<CryptoHash, Cell>,
    visited: &mut HashSet<CryptoHash>,
    new_cells: &mut u64,
) -> CellResult<()> {
    if !visited.insert(hash) {
        return Ok(());
    }
    let key = CellRecord::key(&hash);
    let refs = match txn.get(DBCol::Cells, &key)? {
        Some(bytes) => {
            let mut record = CellRecord::decode(&hash, &bytes)?;
            record.refcount += 1;
            let refs = record.cell.refs.clone();
            txn.put(DBCol::Cells, key, record.encode());
            refs
        }
        None => {
            let cell = bodies.get(&hash).unwrap_or(body_hint);
            if cell.hash() != hash {
                return Err(CellError::Corruption(hash, "missing child cell body".into()));
            }
            let record = CellRecord { refcount: 1, cell: cell.clone(), stored_as_boc: false };
            let refs = cell.refs.clone();
            txn.put(DBCol::Cells, key, record.encode());
            *new_cells += 1;
            refs
        }
    };
    for child in refs {
        bump_refcount_dfs(txn, child, body_hint, bodies, visited, new_cells)?;
    }
    Ok(())
}

fn decrement_refcount_dfs(
    txn: &mut Transaction<'_>,
    hash: CryptoHash,
    visited: &mut HashSet<CryptoHash>,
) -> CellResult<()> {
    if !visited.insert(hash) {
        return Ok(());
    }
    let key = CellRecord::key(&hash);
    let Some(bytes) = txn.get(DBCol::Cells, &key)? else {
        return Err(CellError::Corruption(hash, "refcounted cell vanished before GC".into()));
    };
    let mut record = CellRecord::decode(&hash, &bytes)?;
    let refs = record.cell.refs.clone();
    if record.refcount <= 1 {
        txn.delete(DBCol::Cells, key);
    } else {
        record.refcount -= 1;
        txn.put(DBCol::Cells, key, record.encode());
    }
    for child in refs {
        decrement_refcount_dfs(txn, child, visited)?;
    }
    Ok(())
}

/// Inserts a new root entry right before the sentinel (the "most recently
/// added" position, i.e. the tail of the list), keeping `sentinel.next` the
/// oldest entry so GC always picks it up first.
fn link_new_root(
    txn: &mut Transaction<'_>,
    block_id: BlockId,
    entry_k: &[u8],
    root_hash: CryptoHash,
) -> CellResult<()> {
    let sentinel_bytes = txn
        .get(DBCol::CellRoots, SENTINEL_KEY)?
        .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "missing sentinel".into()))?;
    let mut sentinel = RootEntry::decode(&sentinel_bytes)?;
    let old_tail_key = sentinel.prev_key.clone();

    let new_entry = RootEntry {
        block_id: Some(block_id),
        prev_key: old_tail_key.clone(),
        next_key: SENTINEL_KEY.to_vec(),
        root_hash,
    };
    txn.put(DBCol::CellRoots, entry_k.to_vec(), new_entry.encode());

    sentinel.prev_key = entry_k.to_vec();
    if old_tail_key == SENTINEL_KEY {
        // List was empty: the sentinel's next also points at the new entry.
        sentinel.next_key = entry_k.to_vec();
    }
    txn.put(DBCol::CellRoots, SENTINEL_KEY.to_vec(), sentinel.encode());

    if old_tail_key != SENTINEL_KEY {
        let old_tail_bytes = txn
            .get(DBCol::CellRoots, &old_tail_key)?
            .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "dangling former tail".into()))?;
        let mut old_tail = RootEntry::decode(&old_tail_bytes)?;
        old_tail.next_key = entry_k.to_vec();
        txn.put(DBCol::CellRoots, old_tail_key, old_tail.encode());
    }

    Ok(())
}

/// Removes `entry` (stored under `key`) from the root list, splicing its
/// neighbors together.
fn unlink_root(txn: &mut Transaction<'_>, key: &[u8], entry: &RootEntry) -> CellResult<()> {
    txn.delete(DBCol::CellRoots, key.to_vec());

    let prev_bytes = txn
        .get(DBCol::CellRoots, &entry.prev_key)?
        .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "dangling prev in root list".into()))?;
    let mut prev = RootEntry::decode(&prev_bytes)?;
    prev.next_key = entry.next_key.clone();
    txn.put(DBCol::CellRoots, entry.prev_key.clone(), prev.encode());

    let next_bytes = txn
        .get(DBCol::CellRoots, &entry.next_key)?
        .ok_or_else(|| CellError::Corruption(CryptoHash::ZERO, "dangling next in root list".into()))?;
    let mut next = RootEntry::decode(&next_bytes)?;
    next.prev_key = entry.prev_key.clone();
    txn.put(DBCol::CellRoots, entry.next_key.clone(), next.encode());

    Ok(())
}
