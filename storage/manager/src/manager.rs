use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use borsh::BorshDeserialize;
use parking_lot::RwLock;

use archive_handle::BlockHandleData;
use archive_kv::{DBCol, Database};
use archive_primitives::{BlockId, FileRefId, ShardPrefix};
use archive_slice::{ArchiveSlice, SliceKind};

use crate::errors::{ManagerError, ManagerResult};
use crate::metrics;
use crate::types::{Catalog, CatalogRow, PackageId, CATALOG_KEY};

/// Hour-long buckets for temp slices (§3 "Archive catalog": "bucketed per
/// hour of unix-time").
const TEMP_BUCKET_SECS: u32 = 3600;

pub struct ManagerConfig {
    /// Masterchain-seqno stride between successive permanent slices.
    pub archive_size: u32,
    /// Masterchain-seqno stride between successive key-block slices.
    pub key_archive_size: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig { archive_size: 100_000, key_archive_size: 20_000_000 }
    }
}

/// Opens (or creates) the per-slice `Database` at `dir`. Production wiring
/// passes an `archive_kv::DbOpener`-backed closure; tests pass a fresh
/// `MemoryDatabase` per call.
pub type SliceDbFactory = Arc<dyn Fn(&Path) -> ManagerResult<Arc<dyn Database>> + Send + Sync>;

/// Holds the three ordered catalogs plus a derived secondary shard index,
/// and routes every handle/file/lookup call to the right slice (§4.5).
pub struct ArchiveManager {
    root: PathBuf,
    catalog_db: Arc<dyn Database>,
    config: ManagerConfig,
    slice_db_factory: SliceDbFactory,
    perm: RwLock<BTreeMap<u32, Arc<ArchiveSlice>>>,
    key: RwLock<BTreeMap<u32, Arc<ArchiveSlice>>>,
    temp: RwLock<BTreeMap<u32, Arc<ArchiveSlice>>>,
    /// For each shard ever seen, the perm-slice anchors that registered it,
    /// ascending (§4.5 "a derived secondary index per shard").
    shard_index: RwLock<BTreeMap<ShardPrefix, BTreeSet<u32>>>,
}

impl ArchiveManager {
    pub fn open(
        root: impl Into<PathBuf>,
        catalog_db: Arc<dyn Database>,
        slice_db_factory: SliceDbFactory,
        config: ManagerConfig,
    ) -> ManagerResult<Self> {
        let root = root.into();
        let manager = ArchiveManager {
            root,
            catalog_db,
            config,
            slice_db_factory,
            perm: RwLock::new(BTreeMap::new()),
            key: RwLock::new(BTreeMap::new()),
            temp: RwLock::new(BTreeMap::new()),
            shard_index: RwLock::new(BTreeMap::new()),
        };

        let catalog = manager.load_catalog()?;
        for id in catalog.live_perm() {
            let slice = manager.open_slice_on_disk(SliceKind::Perm, id)?;
            manager.register_existing_shards(&slice)?;
            manager.perm.write().insert(id, slice);
        }
        for row in catalog.key.iter().filter(|r| !r.deleted) {
            let slice = manager.open_slice_on_disk(SliceKind::Key, row.id)?;
            manager.key.write().insert(row.id, slice);
        }
        for id in catalog.live_temp() {
            let slice = manager.open_slice_on_disk(SliceKind::Temp, id)?;
            manager.temp.write().insert(id, slice);
        }
        Ok(manager)
    }

    fn load_catalog(&self) -> ManagerResult<Catalog> {
        Ok(self
            .catalog_db
            .get(DBCol::Catalog, CATALOG_KEY)?
            .into_option()
            .map(|b| Catalog::try_from_slice(&b))
            .transpose()
            .map_err(|e| ManagerError::Corruption(e.to_string()))?
            .unwrap_or_default())
    }

    fn save_catalog(&self, catalog: &Catalog) -> ManagerResult<()> {
        let mut batch = archive_kv::WriteBatch::default();
        batch.put(DBCol::Catalog, CATALOG_KEY, borsh::to_vec(catalog).expect("Catalog borsh encoding cannot fail"));
        self.catalog_db.write(batch)?;
        Ok(())
    }

    fn slice_dir(&self, kind: SliceKind, id: u32) -> PathBuf {
        match kind {
            SliceKind::Perm => self.root.join("archive/packages").join(format!("arch{id:04}")),
            SliceKind::Key => self.root.join("archive/packages").join(format!("key{id:03}")),
            SliceKind::Temp => self.root.join("files/packages").join(format!("temp.archive.{id}")),
        }
    }

    fn open_slice_on_disk(&self, kind: SliceKind, id: u32) -> ManagerResult<Arc<ArchiveSlice>> {
        let dir = self.slice_dir(kind, id);
        let db = (self.slice_db_factory)(&dir)?;
        Ok(ArchiveSlice::open(dir, db, kind, id, false, 0)?)
    }

    fn register_existing_shards(&self, slice: &Arc<ArchiveSlice>) -> ManagerResult<()> {
        if slice.descriptor(ShardPrefix::MASTERCHAIN)?.is_some() {
            self.shard_index.write().entry(ShardPrefix::MASTERCHAIN).or_default().insert(slice.id);
        }
        Ok(())
    }

    fn anchor(seqno_or_time: u32, stride: u32) -> u32 {
        if stride == 0 {
            0
        } else {
            (seqno_or_time / stride) * stride
        }
    }

    fn get_or_create(&self, kind: SliceKind, id: u32) -> ManagerResult<Arc<ArchiveSlice>> {
        let map = match kind {
            SliceKind::Perm => &self.perm,
            SliceKind::Key => &self.key,
            SliceKind::Temp => &self.temp,
        };
        if let Some(existing) = map.read().get(&id) {
            return Ok(existing.clone());
        }
        let slice = self.open_slice_on_disk(kind, id)?;
        map.write().insert(id, slice.clone());
        metrics::SLICES_OPENED.inc();

        let mut catalog = self.load_catalog()?;
        let rows = match kind {
            SliceKind::Perm => &mut catalog.perm,
            SliceKind::Key => &mut catalog.key,
            SliceKind::Temp => &mut catalog.temp,
        };
        if !rows.iter().any(|r| r.id == id) {
            rows.push(CatalogRow { id, deleted: false });
            self.save_catalog(&catalog)?;
        }
        Ok(slice)
    }

    /// §4.5 `add_handle`/`update_handle`/`add_file` routing: compute the
    /// owning `PackageId` from the handle's masterchain-ref seqno.
    /// `moved_to_perm` tells whether this handle has already been
    /// archived permanently (recent, unfinalized blocks live in a temp
    /// bucket keyed by wall-clock arrival time instead).
    pub fn add_handle(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        unix_time: u32,
        is_key_block: bool,
        moved_to_perm: bool,
        data: &BlockHandleData,
    ) -> ManagerResult<()> {
        let slice = if moved_to_perm {
            let anchor = Self::anchor(owning_mc_seqno, self.config.archive_size);
            let slice = self.get_or_create(SliceKind::Perm, anchor)?;
            self.shard_index.write().entry(id.shard).or_default().insert(anchor);
            slice
        } else {
            let bucket = Self::anchor(unix_time, TEMP_BUCKET_SECS);
            self.get_or_create(SliceKind::Temp, bucket)?
        };
        slice.add_handle(id, owning_mc_seqno, data)?;
        metrics::HANDLES_ROUTED.inc();

        if is_key_block {
            let anchor = Self::anchor(owning_mc_seqno, self.config.key_archive_size);
            let key_slice = self.get_or_create(SliceKind::Key, anchor)?;
            key_slice.add_handle(id, owning_mc_seqno, data)?;
        }
        Ok(())
    }

    pub fn update_handle(&self, id: &BlockId, data: &BlockHandleData) -> ManagerResult<()> {
        let slice = self.locate_handle_slice(id)?;
        Ok(slice.update_handle(id, data)?)
    }

    fn locate_handle_slice(&self, id: &BlockId) -> ManagerResult<Arc<ArchiveSlice>> {
        if id.shard.is_masterchain() {
            let anchor = Self::anchor(id.seqno, self.config.archive_size);
            if let Some(slice) = self.perm.read().get(&anchor) {
                if slice.get_handle(id).is_ok() {
                    return Ok(slice.clone());
                }
            }
        } else if let Some(anchors) = self.shard_index.read().get(&id.shard) {
            for anchor in anchors.iter().rev() {
                if let Some(slice) = self.perm.read().get(anchor) {
                    if slice.get_handle(id).is_ok() {
                        return Ok(slice.clone());
                    }
                }
            }
        }
        for (_, slice) in self.temp.read().iter().rev() {
            if slice.get_handle(id).is_ok() {
                return Ok(slice.clone());
            }
        }
        Err(ManagerError::HandleNotFound(*id))
    }

    pub fn get_handle(&self, id: &BlockId) -> ManagerResult<BlockHandleData> {
        let slice = self.locate_handle_slice(id)?;
        Ok(slice.get_handle(id)?)
    }

    pub fn add_file(
        &self,
        owning_mc_seqno: u32,
        unix_time: u32,
        moved_to_perm: bool,
        ref_id: FileRefId,
        data: &[u8],
    ) -> ManagerResult<u64> {
        let slice = if moved_to_perm {
            let anchor = Self::anchor(owning_mc_seqno, self.config.archive_size);
            self.get_or_create(SliceKind::Perm, anchor)?
        } else {
            let bucket = Self::anchor(unix_time, TEMP_BUCKET_SECS);
            self.get_or_create(SliceKind::Temp, bucket)?
        };
        Ok(slice.add_file(owning_mc_seqno, ref_id, data)?)
    }

    pub fn get_file(
        &self,
        owning_mc_seqno: u32,
        moved_to_perm: bool,
        ref_id: &FileRefId,
    ) -> ManagerResult<Vec<u8>> {
        if moved_to_perm {
            let anchor = Self::anchor(owning_mc_seqno, self.config.archive_size);
            if let Some(slice) = self.perm.read().get(&anchor) {
                if let Ok(data) = slice.get_file(owning_mc_seqno, ref_id) {
                    return Ok(data);
                }
            }
        } else {
            let anchor = Self::anchor(owning_mc_seqno, self.config.archive_size);
            if let Some(slice) = self.perm.read().get(&anchor) {
                if let Ok(data) = slice.get_file(owning_mc_seqno, ref_id) {
                    return Ok(data);
                }
            }
            for (_, slice) in self.temp.read().iter().rev() {
                if let Ok(data) = slice.get_file(owning_mc_seqno, ref_id) {
                    return Ok(data);
                }
            }
        }
        Err(ManagerError::FileNotFound(ref_id.block_id))
    }

    /// §4.5 "for key-blocks, also mirror proof/proof-link into a key
    /// slice": used by `archive-rootdb`'s `add_key_block_proof(_link)` to
    /// duplicate a file already written to its perm/temp slice.
    pub fn mirror_to_key_slice(
        &self,
        owning_mc_seqno: u32,
        ref_id: FileRefId,
        data: &[u8],
    ) -> ManagerResult<()> {
        let anchor = Self::anchor(owning_mc_seqno, self.config.key_archive_size);
        let slice = self.get_or_create(SliceKind::Key, anchor)?;
        slice.add_file(owning_mc_seqno, ref_id, data)?;
        Ok(())
    }

    /// §4.7 `get_archive_id`: identifies the permanent slice covering
    /// `mc_seqno`. This port never sub-slices a permanent archive (every
    /// `open_slice_on_disk` call passes `sliced = false`), so the id is
    /// simply that slice's masterchain-seqno anchor, unlike the original's
    /// packed `(sub_slice_id << 32) | archive_id` encoding.
    pub fn get_archive_id(&self, mc_seqno: u32) -> ManagerResult<u64> {
        let anchor = Self::anchor(mc_seqno, self.config.archive_size);
        if self.perm.read().contains_key(&anchor) {
            Ok(anchor as u64)
        } else {
            Err(ManagerError::ArchiveNotFound(anchor))
        }
    }

    /// §4.7 `get_archive_slice`: a raw byte-range read over the package
    /// file named by a prior `get_archive_id` call, for a peer streaming
    /// a whole archive instead of asking for individual block files.
    pub fn get_archive_slice(&self, archive_id: u64, offset: u64, limit: u32) -> ManagerResult<Vec<u8>> {
        let anchor = archive_id as u32;
        let slice = self.perm.read().get(&anchor).cloned().ok_or(ManagerError::ArchiveNotFound(anchor))?;
        Ok(slice.read_raw_slice(offset, limit)?)
    }

    pub fn get_block_by_seqno(&self, shard: ShardPrefix, seqno: u32, exact: bool) -> ManagerResult<BlockId> {
        self.get_block_by(shard, |s| s.get_block_by_seqno(shard, seqno, exact))
    }

    pub fn get_block_by_lt(&self, shard: ShardPrefix, lt: u64, exact: bool) -> ManagerResult<BlockId> {
        self.get_block_by(shard, |s| s.get_block_by_lt(shard, lt, exact))
    }

    pub fn get_block_by_unix_time(&self, shard: ShardPrefix, ts: u32, exact: bool) -> ManagerResult<BlockId> {
        self.get_block_by(shard, |s| s.get_block_by_unix_time(shard, ts, exact))
    }

    fn get_block_by(
        &self,
        shard: ShardPrefix,
        lookup: impl Fn(&Arc<ArchiveSlice>) -> archive_slice::SliceResult<BlockId>,
    ) -> ManagerResult<BlockId> {
        if shard.is_masterchain() {
            let perm = self.perm.read();
            for (_, slice) in perm.iter() {
                if let Ok(id) = lookup(slice) {
                    return Ok(id);
                }
            }
        } else if let Some(anchors) = self.shard_index.read().get(&shard) {
            let perm = self.perm.read();
            for anchor in anchors.iter().rev() {
                if let Some(slice) = perm.get(anchor) {
                    if let Ok(id) = lookup(slice) {
                        return Ok(id);
                    }
                }
            }
        }
        for (_, slice) in self.temp.read().iter().rev() {
            if let Ok(id) = lookup(slice) {
                return Ok(id);
            }
        }
        Err(ManagerError::Slice(archive_slice::SliceError::NoMatchingBlock))
    }

    /// §4.5 `run_gc(now, archive_ttl)`: returns the ids of every slice
    /// destroyed this pass, across both catalogs, for callers (and tests)
    /// that want to observe retention decisions.
    pub fn run_gc(&self, now: u32, archive_ttl: u32) -> ManagerResult<Vec<PackageId>> {
        let mut destroyed = Vec::new();
        let mut catalog = self.load_catalog()?;

        let live_temp: Vec<u32> = catalog.live_temp().collect();
        if let Some(&newest) = live_temp.iter().max() {
            for &id in &live_temp {
                if id != newest && id < now.saturating_sub(TEMP_BUCKET_SECS) {
                    self.delete_slice(&mut catalog, SliceKind::Temp, id)?;
                    destroyed.push(PackageId::temp(id));
                }
            }
        }

        let live_perm: Vec<u32> = catalog.live_perm().collect();
        if let Some(&newest) = live_perm.iter().max() {
            for &id in &live_perm {
                if id == newest {
                    continue;
                }
                let ts = self
                    .perm
                    .read()
                    .get(&id)
                    .map(|s| s.descriptor(ShardPrefix::MASTERCHAIN))
                    .transpose()?
                    .flatten()
                    .map(|d| d.last_ts)
                    .unwrap_or(0);
                if ts < now.saturating_sub(archive_ttl) {
                    self.delete_slice(&mut catalog, SliceKind::Perm, id)?;
                    destroyed.push(PackageId::perm(id));
                }
            }
        }

        self.save_catalog(&catalog)?;
        Ok(destroyed)
    }

    /// Marks `id` deleted in `catalog` (not yet persisted by this call)
    /// and destroys its slice. The spec models destruction as an
    /// asynchronous, back-off-retried step; this synchronous
    /// implementation runs it inline, relying on `ArchiveSlice::destroy`'s
    /// own retry loop for the only genuinely transient part (removing the
    /// directory).
    fn delete_slice(&self, catalog: &mut Catalog, kind: SliceKind, id: u32) -> ManagerResult<()> {
        let rows = match kind {
            SliceKind::Perm => &mut catalog.perm,
            SliceKind::Key => &mut catalog.key,
            SliceKind::Temp => &mut catalog.temp,
        };
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.deleted = true;
        }

        let map = match kind {
            SliceKind::Perm => &self.perm,
            SliceKind::Key => &self.key,
            SliceKind::Temp => &self.temp,
        };
        if let Some(slice) = map.write().remove(&id) {
            slice.close()?;
            slice.destroy()?;
            let label = match kind {
                SliceKind::Perm => "perm",
                SliceKind::Key => "key",
                SliceKind::Temp => "temp",
            };
            metrics::GC_SLICES_DELETED.with_label_values(&[label]).inc();
        }
        Ok(())
    }

    /// §4.7 `truncate(seqno, handle)`: rolls every store back to the state
    /// as of masterchain seqno `mc_seqno` (used for hardfork rollback and
    /// the crash-recovery scenario in §8 S6, raised one layer from a single
    /// slice to the whole catalog). Perm/key slices anchored entirely past
    /// `mc_seqno` are dropped outright; the slice that straddles the cutoff
    /// has its entry lists and packages trimmed in place via
    /// [`ArchiveSlice::truncate`].
    pub fn truncate(&self, mc_seqno: u32) -> ManagerResult<()> {
        let mut catalog = self.load_catalog()?;

        for (kind, map) in [(SliceKind::Perm, &self.perm), (SliceKind::Key, &self.key)] {
            let ids: Vec<u32> = map.read().keys().copied().collect();
            for id in ids {
                if id > mc_seqno {
                    self.delete_slice(&mut catalog, kind, id)?;
                    if let SliceKind::Perm = kind {
                        self.shard_index.write().values_mut().for_each(|anchors| {
                            anchors.remove(&id);
                        });
                    }
                } else if let Some(slice) = map.read().get(&id) {
                    slice.truncate(mc_seqno)?;
                }
            }
        }

        self.save_catalog(&catalog)?;
        Ok(())
    }
}
