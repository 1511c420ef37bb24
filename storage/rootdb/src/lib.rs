//! Root DB facade (§4.7): the single entry point a node wires up once and
//! hands to everything else. It owns no bytes of its own beyond the
//! in-process [`handle_cache::HandleCache`]; every call dispatches straight
//! through to the cell store, the archive manager, or one of the two flat
//! file stores (static files, persistent states).
//!
//! Unlike `archive-liteserver`, which sits on top of this crate behind an
//! async dispatcher, every method here is synchronous — mirroring
//! `archive-manager` and `archive-cells` underneath it. The one exception is
//! [`RootDb::apply_block`], which genuinely runs on a background task
//! (§4.7 "runs a per-block archiver task").

mod errors;
mod handle_cache;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use archive_cells::{CellStore, CellStoreConfig};
use archive_handle::BlockHandle;
use archive_kv::Database;
use archive_manager::{ArchiveManager, ManagerConfig, PackageId, SliceDbFactory};
use archive_primitives::{BlockId, Cell, CryptoHash, FileKind, FileRefId, ShardPrefix};
use archive_statedb::{FileStore, PersistentStateRefId, Singletons};

pub use errors::{RootDbError, RootDbResult};
use handle_cache::HandleCache;

/// Tuning knobs for the two stores this facade owns directly; `archive-kv`
/// and `archive-manager` configs for everything underneath.
pub struct RootDbConfig {
    pub manager: ManagerConfig,
    pub cells: CellStoreConfig,
}

impl Default for RootDbConfig {
    fn default() -> Self {
        RootDbConfig { manager: ManagerConfig::default(), cells: CellStoreConfig::default() }
    }
}

/// Outcome of one [`RootDb::run_gc`] pass, for callers (and tests) that want
/// to observe what got reclaimed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcReport {
    pub destroyed_packages: Vec<PackageId>,
    pub destroyed_cell_roots: Vec<BlockId>,
}

/// Thin dispatcher unifying the cell store, archive manager, singleton rows,
/// and the static-file / persistent-state directories behind one API (§4.7).
pub struct RootDb {
    cells: Arc<CellStore>,
    manager: Arc<ArchiveManager>,
    singletons: Singletons,
    static_files: FileStore,
    persistent_states: FileStore,
    handles: HandleCache,
}

impl RootDb {
    /// Assembles a facade over already-opened stores. Matching
    /// `ArchiveManager::open`'s shape, this crate does not itself decide
    /// *how* each `Database` is opened (RocksDB path, in-memory fake, read
    /// only) — that belongs to whoever wires up `<root>/celldb`,
    /// `<root>/state`, and `<root>/files/globalindex` per §6's on-disk
    /// layout, namely `archive-node`.
    pub fn open(
        root: impl Into<PathBuf>,
        cells_db: Arc<dyn Database>,
        state_db: Arc<dyn Database>,
        catalog_db: Arc<dyn Database>,
        slice_db_factory: SliceDbFactory,
        config: RootDbConfig,
    ) -> RootDbResult<Self> {
        let root = root.into();
        let cells = Arc::new(CellStore::open(cells_db, config.cells)?);
        let manager = Arc::new(ArchiveManager::open(root.clone(), catalog_db, slice_db_factory, config.manager)?);
        let singletons = Singletons::new(state_db.clone());
        let static_files = FileStore::open(root.join("static"), state_db.clone(), "static")?;
        let persistent_states = FileStore::open(root.join("archive/states"), state_db, "state")?;
        let handles = HandleCache::new(manager.clone());
        Ok(RootDb { cells, manager, singletons, static_files, persistent_states, handles })
    }

    pub fn singletons(&self) -> &Singletons {
        &self.singletons
    }

    // -- Block handle -------------------------------------------------

    pub fn get_block_handle(&self, id: BlockId) -> RootDbResult<Arc<BlockHandle>> {
        self.handles.get(id)
    }

    /// §4.7 `store_block_handle`: runs the handle's bounded flush loop,
    /// persisting through the manager. The very first successful persist
    /// for a given id anchors it to a slice (`add_handle`); every later one
    /// just rewrites the bytes (`update_handle`).
    pub fn store_block_handle(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        is_key_block: bool,
        moved_to_perm: bool,
    ) -> RootDbResult<Arc<BlockHandle>> {
        self.handles.store(id, owning_mc_seqno, unix_time, is_key_block, moved_to_perm)
    }

    // -- Per-block files ------------------------------------------------

    fn store_file(
        &self,
        id: BlockId,
        kind: FileKind,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.manager.add_file(owning_mc_seqno, unix_time, moved_to_perm, FileRefId::new(id, kind), data)?;
        let handle = self.handles.get(id)?;
        match kind {
            FileKind::Data => handle.set_received(),
            FileKind::Proof => handle.set_proof_inited(),
            FileKind::ProofLink => handle.set_proof_link_inited(),
            FileKind::Signatures => handle.set_signatures_inited(),
            FileKind::Candidate | FileKind::State => {}
        }
        if handle.need_flush() {
            let snap = handle.snapshot();
            self.handles.store(id, owning_mc_seqno, unix_time, snap.is_key_block, moved_to_perm)?;
        }
        Ok(())
    }

    /// Reads always search the broadest scope the manager offers
    /// (`moved_to_perm = false` falls through perm then temp, per
    /// `ArchiveManager::get_file`) — the facade's readers don't need to
    /// track where a block actually landed.
    fn get_file(&self, id: &BlockId, kind: FileKind, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        Ok(self.manager.get_file(owning_mc_seqno, false, &FileRefId::new(*id, kind))?)
    }

    pub fn store_block_data(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::Data, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_data(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::Data, owning_mc_seqno)
    }

    pub fn store_block_signatures(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::Signatures, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_signatures(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::Signatures, owning_mc_seqno)
    }

    pub fn store_block_proof(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::Proof, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_proof(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::Proof, owning_mc_seqno)
    }

    pub fn store_block_proof_link(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::ProofLink, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_proof_link(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::ProofLink, owning_mc_seqno)
    }

    pub fn store_block_candidate(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::Candidate, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_candidate(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::Candidate, owning_mc_seqno)
    }

    /// A full serialized state blob for `id`, stored alongside the block's
    /// other files (§4.7) — distinct from [`Self::store_shard_state`],
    /// which commits the state's cell DAG to the content-addressed store.
    /// Only used for the very low seqnos close to a hardfork where a state
    /// blob is archived directly rather than reconstructed from cells.
    pub fn store_block_state(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        data: &[u8],
    ) -> RootDbResult<()> {
        self.store_file(id, FileKind::State, owning_mc_seqno, unix_time, moved_to_perm, data)
    }

    pub fn get_block_state(&self, id: &BlockId, owning_mc_seqno: u32) -> RootDbResult<Vec<u8>> {
        self.get_file(id, FileKind::State, owning_mc_seqno)
    }

    /// §4.5 "for key-blocks, also mirror proof/proof-link into a key slice":
    /// call once a block's proof has already been stored normally and is
    /// now known to be a key block's.
    pub fn add_key_block_proof(&self, id: BlockId, owning_mc_seqno: u32, data: &[u8]) -> RootDbResult<()> {
        self.manager.mirror_to_key_slice(owning_mc_seqno, FileRefId::new(id, FileKind::Proof), data)?;
        self.handles.get(id)?.set_proof_inited();
        Ok(())
    }

    pub fn add_key_block_proof_link(&self, id: BlockId, owning_mc_seqno: u32, data: &[u8]) -> RootDbResult<()> {
        self.manager.mirror_to_key_slice(owning_mc_seqno, FileRefId::new(id, FileKind::ProofLink), data)?;
        self.handles.get(id)?.set_proof_link_inited();
        Ok(())
    }

    // -- Shard state (cell DAG) ------------------------------------------

    /// Commits a shard (or masterchain) state's cell DAG as the root for
    /// `id`, bumping refcounts transitively (§4.2 `store_cell`).
    /// `bodies` supplies the bytes for any cell reachable from `cell` that
    /// the store does not already know about.
    pub fn store_shard_state(
        &self,
        id: BlockId,
        cell: Cell,
        bodies: &HashMap<CryptoHash, Cell>,
    ) -> RootDbResult<Cell> {
        let root = self.cells.store_cell(id, cell, bodies)?;
        if let Ok(handle) = self.handles.get(id) {
            handle.set_state_inited(root.hash(), handle.snapshot().unix_time);
        }
        Ok(root)
    }

    pub fn load_shard_state_root(&self, root_hash: CryptoHash) -> RootDbResult<Cell> {
        Ok(self.cells.load_cell(root_hash)?)
    }

    /// Raw access to the cell store, for callers (namely `archive-liteserver`)
    /// that need it as a [`archive_proof::CellSource`] rather than through
    /// the narrower `load_shard_state_root` convenience above.
    pub fn cells(&self) -> &CellStore {
        &self.cells
    }

    // -- Static files and persistent states -------------------------------

    /// §4.7 `try_get_static_file`: `None` rather than an error when the file
    /// is simply not present.
    pub fn try_get_static_file(&self, hash: &CryptoHash) -> RootDbResult<Option<Vec<u8>>> {
        if self.static_files.contains(hash)? {
            Ok(Some(self.static_files.get(hash)?))
        } else {
            Ok(None)
        }
    }

    pub fn store_static_file(&self, hash: &CryptoHash, data: &[u8]) -> RootDbResult<()> {
        Ok(self.static_files.put(hash, data)?)
    }

    pub fn store_persistent_state(&self, ref_id: &PersistentStateRefId, data: &[u8]) -> RootDbResult<()> {
        Ok(self.persistent_states.put(&ref_id.hash(), data)?)
    }

    pub fn get_persistent_state(&self, ref_id: &PersistentStateRefId) -> RootDbResult<Vec<u8>> {
        Ok(self.persistent_states.get(&ref_id.hash())?)
    }

    pub fn has_persistent_state(&self, ref_id: &PersistentStateRefId) -> RootDbResult<bool> {
        Ok(self.persistent_states.contains(&ref_id.hash())?)
    }

    // -- Block lookup and archive streaming -------------------------------

    pub fn get_block_by_seqno(&self, shard: ShardPrefix, seqno: u32, exact: bool) -> RootDbResult<BlockId> {
        Ok(self.manager.get_block_by_seqno(shard, seqno, exact)?)
    }

    pub fn get_block_by_lt(&self, shard: ShardPrefix, lt: u64, exact: bool) -> RootDbResult<BlockId> {
        Ok(self.manager.get_block_by_lt(shard, lt, exact)?)
    }

    pub fn get_block_by_unix_time(&self, shard: ShardPrefix, ts: u32, exact: bool) -> RootDbResult<BlockId> {
        Ok(self.manager.get_block_by_unix_time(shard, ts, exact)?)
    }

    pub fn get_archive_id(&self, mc_seqno: u32) -> RootDbResult<u64> {
        Ok(self.manager.get_archive_id(mc_seqno)?)
    }

    pub fn get_archive_slice(&self, archive_id: u64, offset: u64, limit: u32) -> RootDbResult<Vec<u8>> {
        Ok(self.manager.get_archive_slice(archive_id, offset, limit)?)
    }

    // -- Rollback and retention -------------------------------------------

    /// §4.7 `truncate(seqno)`: rolls every package-backed store back to its
    /// state as of masterchain seqno `mc_seqno` (hardfork rollback, and the
    /// crash-recovery scenario in §8 S6). The cell store is content
    /// addressed and not itself truncated by seqno; any state roots made
    /// unreachable by the rollback are reclaimed the normal way, through
    /// [`Self::run_gc`], once nothing references them any more.
    pub fn truncate(&self, mc_seqno: u32) -> RootDbResult<()> {
        Ok(self.manager.truncate(mc_seqno)?)
    }

    /// §4.5 `run_gc(now, archive_ttl)`, raised to the whole facade: retires
    /// stale package slices, then walks the cell store's root list
    /// oldest-first, reclaiming any root whose block handle the manager no
    /// longer knows about (i.e. already outside every surviving package).
    pub fn run_gc(&self, now: u32, archive_ttl: u32) -> RootDbResult<GcReport> {
        let destroyed_packages = self.manager.run_gc(now, archive_ttl)?;

        let mut destroyed_cell_roots = Vec::new();
        while let Some(id) = self.cells.gc_step(|id| self.manager.get_handle(id).is_err())? {
            destroyed_cell_roots.push(id);
        }

        Ok(GcReport { destroyed_packages, destroyed_cell_roots })
    }

    /// Steps the persistent-state directory's GC one entry at a time; left
    /// to the caller to drive with its own retention policy since, unlike
    /// block handles, a persistent-state blob's continued relevance isn't
    /// something this crate can determine on its own.
    pub fn gc_persistent_state(&self, may_delete: impl FnOnce(&CryptoHash) -> bool) -> RootDbResult<Option<CryptoHash>> {
        Ok(self.persistent_states.gc_step(may_delete)?)
    }

    // -- Background archiving ---------------------------------------------

    fn archive_block(&self, id: BlockId) -> RootDbResult<Arc<BlockHandle>> {
        let handle = self.handles.get(id)?;
        handle.set_applied();
        let snap = handle.snapshot();
        self.handles.store(id, snap.masterchain_ref_seqno, snap.unix_time, snap.is_key_block, true)
    }

    /// §4.7 "runs a per-block archiver task": marks `id` applied and moves
    /// its handle into its permanent slice on a background task, so the
    /// caller's own task isn't blocked on the underlying disk write.
    pub async fn apply_block(self: &Arc<Self>, id: BlockId) -> RootDbResult<Arc<BlockHandle>> {
        let this = Arc::clone(self);
        match tokio::task::spawn_blocking(move || this.archive_block(id)).await {
            Ok(result) => result,
            Err(_) => Err(RootDbError::ArchiverTaskLost(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_kv::MemoryDatabase;
    use archive_primitives::MASTERCHAIN_ID;

    fn id(seqno: u32) -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno,
            root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
            file_hash: CryptoHash::hash_bytes(&(seqno + 1).to_le_bytes()),
        }
    }

    fn open_root_db(dir: &std::path::Path) -> RootDb {
        open_root_db_with(dir, RootDbConfig::default())
    }

    fn open_root_db_with(dir: &std::path::Path, config: RootDbConfig) -> RootDb {
        let cells_db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let state_db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let catalog_db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let factory: SliceDbFactory = Arc::new(|_path| Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn Database>));
        RootDb::open(dir, cells_db, state_db, catalog_db, factory, config).unwrap()
    }

    #[test]
    fn store_then_get_block_data_round_trips_through_the_manager() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_root_db(dir.path());
        db.store_block_handle(id(5), 5, 1_000, false, true).unwrap();
        db.store_block_data(id(5), 5, 1_000, true, b"block-bytes").unwrap();
        assert_eq!(db.get_block_data(&id(5), 5).unwrap(), b"block-bytes");
        assert!(db.get_block_handle(id(5)).unwrap().snapshot().received);
    }

    #[test]
    fn store_block_data_before_a_handle_exists_still_marks_it_received() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_root_db(dir.path());
        db.store_block_data(id(5), 5, 1_000, true, b"bytes").unwrap();
        let handle = db.get_block_handle(id(5)).unwrap();
        assert!(handle.snapshot().received);
    }

    #[test]
    fn static_files_round_trip_and_report_absence_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_root_db(dir.path());
        let hash = CryptoHash::hash_bytes(b"zerostate");
        assert_eq!(db.try_get_static_file(&hash).unwrap(), None);
        db.store_static_file(&hash, b"zerostate").unwrap();
        assert_eq!(db.try_get_static_file(&hash).unwrap(), Some(b"zerostate".to_vec()));
    }

    #[test]
    fn persistent_state_round_trips_by_ref_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_root_db(dir.path());
        let ref_id = PersistentStateRefId { state_block_id: id(5), masterchain_block_id: id(5) };
        assert!(!db.has_persistent_state(&ref_id).unwrap());
        db.store_persistent_state(&ref_id, b"state-blob").unwrap();
        assert!(db.has_persistent_state(&ref_id).unwrap());
        assert_eq!(db.get_persistent_state(&ref_id).unwrap(), b"state-blob");
    }

    #[test]
    fn shard_state_round_trips_through_the_cell_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_root_db(dir.path());
        let leaf = Cell::new_ordinary(vec![1], 8, vec![]);
        let root = Cell::new_ordinary(vec![], 0, vec![leaf.hash()]);
        let mut bodies = HashMap::new();
        bodies.insert(leaf.hash(), leaf);
        let stored = db.store_shard_state(id(5), root.clone(), &bodies).unwrap();
        assert_eq!(stored.hash(), root.hash());
        assert_eq!(db.load_shard_state_root(root.hash()).unwrap().hash(), root.hash());
    }

    #[test]
    fn run_gc_retires_stale_packages_and_unreferenced_cell_roots() {
        let dir = tempfile::tempdir().unwrap();
        let config = RootDbConfig {
            manager: ManagerConfig { archive_size: 100, key_archive_size: 1000 },
            cells: CellStoreConfig::default(),
        };
        let db = open_root_db_with(dir.path(), config);
        db.store_block_handle(id(10), 10, 1_000, false, true).unwrap();
        db.store_block_handle(id(110), 110, 100_000, false, true).unwrap();
        let leaf = Cell::new_ordinary(vec![2], 8, vec![]);
        db.store_shard_state(id(10), leaf.clone(), &HashMap::new()).unwrap();

        let report = db.run_gc(100_000 + 10, 50_000).unwrap();
        assert_eq!(report.destroyed_packages.len(), 1);
        // id(10)'s handle is gone from the manager once its package is
        // destroyed, so the cell root it anchored is now reclaimable too.
        assert_eq!(report.destroyed_cell_roots, vec![id(10)]);
        assert!(db.load_shard_state_root(leaf.hash()).is_err());
    }

    #[tokio::test]
    async fn apply_block_marks_applied_and_persists_off_the_caller_task() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(open_root_db(dir.path()));
        db.store_block_handle(id(5), 5, 1_000, false, true).unwrap();
        let handle = db.apply_block(id(5)).await.unwrap();
        assert!(handle.snapshot().applied);
    }
}
