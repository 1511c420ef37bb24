//! Bridges `archive_handle::BlockHandle`'s in-memory version bookkeeping
//! with `ArchiveManager`'s persisted, plain `BlockHandleData` (§4.6 +
//! §4.7 `store/get_block_handle`). One entry lives here per block this
//! process has touched, for as long as the process runs; the manager
//! itself is the durable store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use archive_handle::{BlockHandle, BlockHandleData};
use archive_manager::{ArchiveManager, ManagerError};
use archive_primitives::BlockId;

use crate::errors::{RootDbError, RootDbResult};

struct Entry {
    handle: Arc<BlockHandle>,
    /// Becomes `true` the first time this handle's data is durably known
    /// to the manager, so later flushes use `update_handle` instead of
    /// re-running `add_handle`'s (non-idempotent, for perm slices)
    /// shard-entry bookkeeping a second time.
    registered: AtomicBool,
}

pub(crate) struct HandleCache {
    manager: Arc<ArchiveManager>,
    entries: RwLock<HashMap<BlockId, Arc<Entry>>>,
}

impl HandleCache {
    pub(crate) fn new(manager: Arc<ArchiveManager>) -> Self {
        HandleCache { manager, entries: RwLock::new(HashMap::new()) }
    }

    fn entry(&self, id: BlockId) -> RootDbResult<Arc<Entry>> {
        if let Some(entry) = self.entries.read().get(&id) {
            return Ok(entry.clone());
        }
        let entry = match self.manager.get_handle(&id) {
            Ok(data) => {
                Arc::new(Entry { handle: Arc::new(BlockHandle::from_persisted(id, data)), registered: AtomicBool::new(true) })
            }
            Err(ManagerError::HandleNotFound(_)) => {
                Arc::new(Entry { handle: Arc::new(BlockHandle::new(id)), registered: AtomicBool::new(false) })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.entries.write().entry(id).or_insert(entry).clone())
    }

    pub(crate) fn get(&self, id: BlockId) -> RootDbResult<Arc<BlockHandle>> {
        Ok(self.entry(id)?.handle.clone())
    }

    /// Runs the handle's bounded flush loop, routing the very first
    /// successful persist through `add_handle` (which anchors it to a
    /// slice and extends the shard index) and every later one through
    /// `update_handle` (§4.7 `store_block_handle`).
    pub(crate) fn store(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        is_key_block: bool,
        moved_to_perm: bool,
    ) -> RootDbResult<Arc<BlockHandle>> {
        let entry = self.entry(id)?;
        let mut first_persist = !entry.registered.swap(true, Ordering::SeqCst);
        let manager = &self.manager;

        entry
            .handle
            .flush(|data: &BlockHandleData, _version| -> RootDbResult<()> {
                if first_persist {
                    manager.add_handle(id, owning_mc_seqno, unix_time, is_key_block, moved_to_perm, data)?;
                    first_persist = false;
                } else {
                    manager.update_handle(&id, data)?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                archive_handle::FlushError::TooManyIterations(n) => {
                    RootDbError::HandleFlush(id, format!("did not converge after {n} iterations"))
                }
                archive_handle::FlushError::Persist(inner) => inner,
            })?;

        Ok(entry.handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_kv::MemoryDatabase;
    use archive_manager::ManagerConfig;
    use archive_primitives::{CryptoHash, ShardPrefix, MASTERCHAIN_ID};

    fn id() -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno: 1,
            root_hash: CryptoHash::hash_bytes(b"root"),
            file_hash: CryptoHash::hash_bytes(b"file"),
        }
    }

    fn manager(dir: &std::path::Path) -> Arc<ArchiveManager> {
        let catalog_db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
        let factory: archive_manager::SliceDbFactory =
            Arc::new(|_path| Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn archive_kv::Database>));
        Arc::new(ArchiveManager::open(dir, catalog_db, factory, ManagerConfig::default()).unwrap())
    }

    #[test]
    fn store_then_get_round_trips_through_the_manager() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandleCache::new(manager(dir.path()));
        let handle = cache.get(id()).unwrap();
        handle.set_applied();
        cache.store(id(), 1, 1_000, false, true).unwrap();

        let reloaded = HandleCache::new(Arc::clone(&cache.manager));
        assert!(reloaded.get(id()).unwrap().snapshot().applied);
    }

    #[test]
    fn second_store_updates_rather_than_re_adding() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandleCache::new(manager(dir.path()));
        let handle = cache.get(id()).unwrap();
        handle.set_applied();
        cache.store(id(), 1, 1_000, false, true).unwrap();

        handle.set_received();
        cache.store(id(), 1, 1_000, false, true).unwrap();
        assert!(cache.get(id()).unwrap().snapshot().received);
    }
}
