use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use borsh::BorshDeserialize;
use parking_lot::Mutex;

use archive_handle::BlockHandleData;
use archive_kv::{BatchOp, DBCol, Database, WriteBatch};
use archive_package::PackageFile;
use archive_primitives::{BlockId, FileRefId, ShardPrefix};

use crate::errors::{SliceError, SliceResult};
use crate::metrics;
use crate::types::{
    descriptor_key, entry_key, file_offset_key, handle_key, sub_slice_status_key, ShardDescriptor,
    ShardEntry, ShardList, SubSliceStatus, SHARD_LIST_KEY,
};

pub use crate::types::SliceKind;

/// Writes accumulated inside `AsyncMode` are flushed once this many
/// mutations have queued up, even without an explicit flush (§4.4
/// "bounded by either a count (≈ 100) or an explicit flush").
const ASYNC_BATCH_LIMIT: usize = 100;

const DESTROY_MAX_ATTEMPTS: u32 = 5;
const DESTROY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// `Open -> (AsyncMode)? -> Closing -> Destroyed` (§4.4).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SliceState {
    Open,
    AsyncMode,
    Closing,
    Destroyed,
}

struct Pending {
    batch: WriteBatch,
    count: usize,
}

/// One package (or, for sliced permanent archives, an indexed array of
/// packages) plus the per-shard KV index over it. Not `Clone`: callers share
/// an `Arc<ArchiveSlice>`.
pub struct ArchiveSlice {
    /// Masterchain seqno anchor (perm/key slices) or bucket-start unix time
    /// (temp slices).
    pub id: u32,
    pub kind: SliceKind,
    sliced: bool,
    sub_slice_size: u32,
    dir: PathBuf,
    db: Arc<dyn Database>,
    packages: Mutex<BTreeMap<u32, PackageFile>>,
    state: Mutex<SliceState>,
    pending: Mutex<Pending>,
}

impl ArchiveSlice {
    /// Opens (creating on first use) the slice rooted at `dir` with its own
    /// KV instance `db`. `sliced`/`sub_slice_size` only matter for
    /// `SliceKind::Perm` (§4.4 "Permanent slices may be sub-sliced").
    pub fn open(
        dir: impl Into<PathBuf>,
        db: Arc<dyn Database>,
        kind: SliceKind,
        id: u32,
        sliced: bool,
        sub_slice_size: u32,
    ) -> SliceResult<Arc<Self>> {
        let dir: PathBuf = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SliceError::Corruption(format!("cannot create slice directory: {e}")))?;
        let slice = Arc::new(ArchiveSlice {
            id,
            kind,
            sliced,
            sub_slice_size,
            dir,
            db,
            packages: Mutex::new(BTreeMap::new()),
            state: Mutex::new(SliceState::Open),
            pending: Mutex::new(Pending { batch: WriteBatch::default(), count: 0 }),
        });
        Ok(slice)
    }

    pub fn state(&self) -> SliceState {
        *self.state.lock()
    }

    /// Enters `AsyncMode`: subsequent mutations are buffered instead of
    /// committed individually.
    pub fn enter_async_mode(&self) {
        let mut state = self.state.lock();
        if *state == SliceState::Open {
            *state = SliceState::AsyncMode;
        }
    }

    /// Flushes any pending batch and transitions `Open`/`AsyncMode` to
    /// `Closing`. Idempotent.
    pub fn close(&self) -> SliceResult<()> {
        self.flush()?;
        let mut state = self.state.lock();
        if matches!(*state, SliceState::Open | SliceState::AsyncMode) {
            *state = SliceState::Closing;
        }
        Ok(())
    }

    /// Explicit flush of whatever has accumulated under `AsyncMode`. A
    /// no-op outside `AsyncMode`, since those writes already committed
    /// immediately.
    pub fn flush(&self) -> SliceResult<()> {
        let mut pending = self.pending.lock();
        if !pending.batch.is_empty() {
            self.db.write(std::mem::take(&mut pending.batch))?;
            pending.count = 0;
        }
        Ok(())
    }

    fn sub_idx_for(&self, mc_seqno: u32) -> u32 {
        if !self.sliced || self.sub_slice_size == 0 {
            return 0;
        }
        (mc_seqno.saturating_sub(self.id)) / self.sub_slice_size
    }

    fn package_path(&self, sub_idx: u32) -> PathBuf {
        match self.kind {
            SliceKind::Perm => self.dir.join(format!("archive.{:05}.pack", sub_idx)),
            SliceKind::Key => self.dir.join(format!("key.archive.{:06}.pack", self.id)),
            SliceKind::Temp => self.dir.join(format!("temp.archive.{}.pack", self.id)),
        }
    }

    /// Borrows (opening and truncating-to-status on first touch) the
    /// package for `sub_idx`.
    fn with_package<R>(
        &self,
        sub_idx: u32,
        f: impl FnOnce(&mut PackageFile) -> SliceResult<R>,
    ) -> SliceResult<R> {
        let mut packages = self.packages.lock();
        if !packages.contains_key(&sub_idx) {
            let path = self.package_path(sub_idx);
            let mut pkg = if path.exists() {
                PackageFile::open(&path)?
            } else {
                PackageFile::create(&path)?
            };
            let status_key = sub_slice_status_key(sub_idx);
            let status = self
                .db
                .get(DBCol::SubSliceStatus, &status_key)?
                .into_option()
                .and_then(|b| SubSliceStatus::try_from_slice(&b).ok())
                .unwrap_or_default();
            if status.package_len < pkg.len() {
                pkg.truncate(status.package_len)?;
            }
            packages.insert(sub_idx, pkg);
        }
        f(packages.get_mut(&sub_idx).expect("just inserted"))
    }

    fn commit(&self, ops: Vec<BatchOp>) -> SliceResult<()> {
        if self.state() == SliceState::Destroyed || self.state() == SliceState::Closing {
            return Err(SliceError::Closed);
        }
        let mut pending = self.pending.lock();
        if self.state() == SliceState::AsyncMode {
            pending.batch.extend(WriteBatch { ops });
            pending.count += 1;
            if pending.count >= ASYNC_BATCH_LIMIT {
                let batch = std::mem::take(&mut pending.batch);
                pending.count = 0;
                drop(pending);
                self.db.write(batch)?;
            }
            Ok(())
        } else {
            drop(pending);
            self.db.write(WriteBatch { ops })?;
            Ok(())
        }
    }

    /// Exposes a shard's descriptor, used by the archive manager to decide
    /// retention (§4.5 `run_gc` needs each perm slice's masterchain `ts`).
    pub fn descriptor(&self, shard: ShardPrefix) -> SliceResult<Option<ShardDescriptor>> {
        self.load_descriptor(shard)
    }

    fn load_descriptor(&self, shard: ShardPrefix) -> SliceResult<Option<ShardDescriptor>> {
        Ok(self
            .db
            .get(DBCol::ShardDescriptor, &descriptor_key(shard))?
            .into_option()
            .map(|b| ShardDescriptor::try_from_slice(&b))
            .transpose()
            .map_err(|e| SliceError::Corruption(e.to_string()))?)
    }

    fn load_entry(&self, shard: ShardPrefix, idx: u32) -> SliceResult<ShardEntry> {
        let bytes = self
            .db
            .get(DBCol::ShardEntry, &entry_key(shard, idx))?
            .into_option()
            .ok_or_else(|| SliceError::Corruption(format!("missing entry {shard:?}[{idx}]")))?;
        ShardEntry::try_from_slice(&bytes).map_err(|e| SliceError::Corruption(e.to_string()))
    }

    fn load_shard_list(&self) -> SliceResult<ShardList> {
        Ok(self
            .db
            .get(DBCol::ShardList, SHARD_LIST_KEY)?
            .into_option()
            .map(|b| ShardList::try_from_slice(&b))
            .transpose()
            .map_err(|e| SliceError::Corruption(e.to_string()))?
            .unwrap_or_default())
    }

    /// §4.4 `add_handle`: for `Perm` slices, extends the shard's entry list
    /// and bumps its descriptor; always persists the handle bytes. All
    /// mutations commit as one batch.
    pub fn add_handle(
        &self,
        id: BlockId,
        owning_mc_seqno: u32,
        data: &BlockHandleData,
    ) -> SliceResult<()> {
        let shard = id.shard;
        let mut ops = vec![BatchOp::Put {
            col: DBCol::HandleBytes,
            key: handle_key(&id),
            value: borsh::to_vec(data).expect("BlockHandleData borsh encoding cannot fail"),
        }];

        if matches!(self.kind, SliceKind::Perm) {
            let existing = self.load_descriptor(shard)?;
            let is_new_shard = existing.is_none();
            let mut descriptor = existing.unwrap_or_default();
            let idx = descriptor.last_idx;
            descriptor.last_idx = idx + 1;
            descriptor.last_seqno = descriptor.last_seqno.max(id.seqno);
            descriptor.last_lt = descriptor.last_lt.max(data.logical_time);
            descriptor.last_ts = descriptor.last_ts.max(data.unix_time);

            let entry = ShardEntry {
                block_id: id,
                lt: data.logical_time,
                unix_time: data.unix_time,
                owning_mc_seqno,
            };
            ops.push(BatchOp::Put {
                col: DBCol::ShardEntry,
                key: entry_key(shard, idx),
                value: borsh::to_vec(&entry).expect("ShardEntry borsh encoding cannot fail"),
            });
            ops.push(BatchOp::Put {
                col: DBCol::ShardDescriptor,
                key: descriptor_key(shard),
                value: borsh::to_vec(&descriptor).expect("ShardDescriptor borsh encoding cannot fail"),
            });

            if is_new_shard {
                let mut list = self.load_shard_list()?;
                if !list.shards.contains(&shard) {
                    list.shards.push(shard);
                    ops.push(BatchOp::Put {
                        col: DBCol::ShardList,
                        key: SHARD_LIST_KEY.to_vec(),
                        value: borsh::to_vec(&list).expect("ShardList borsh encoding cannot fail"),
                    });
                }
            }
        }

        self.commit(ops)?;
        metrics::HANDLES_ADDED.inc();
        Ok(())
    }

    /// §4.4 `update_handle`: re-persists handle bytes while `need_flush`.
    pub fn update_handle(&self, id: &BlockId, data: &BlockHandleData) -> SliceResult<()> {
        let ops = vec![BatchOp::Put {
            col: DBCol::HandleBytes,
            key: handle_key(id),
            value: borsh::to_vec(data).expect("BlockHandleData borsh encoding cannot fail"),
        }];
        self.commit(ops)
    }

    pub fn get_handle(&self, id: &BlockId) -> SliceResult<BlockHandleData> {
        let bytes = self
            .db
            .get(DBCol::HandleBytes, &handle_key(id))?
            .into_option()
            .ok_or_else(|| SliceError::HandleNotFound(*id))?;
        BlockHandleData::try_from_slice(&bytes).map_err(|e| SliceError::Corruption(e.to_string()))
    }

    /// §4.4 `add_file`: a no-op if this ref is already indexed.
    pub fn add_file(&self, masterchain_ref_seqno: u32, ref_id: FileRefId, data: &[u8]) -> SliceResult<u64> {
        let _timer = metrics::PACKAGE_APPEND_DURATION.start_timer();
        let offset_key = file_offset_key(&ref_id.hash());
        if let Some(existing) = self.db.get(DBCol::FileOffset, &offset_key)?.into_option() {
            return Ok(u64::from_be_bytes(existing.try_into().unwrap_or([0; 8])));
        }

        let sub_idx = self.sub_idx_for(masterchain_ref_seqno);
        let name = ref_id.record_name();
        let (offset, new_len) = self.with_package(sub_idx, |pkg| {
            let offset = pkg.append(&name, data)?;
            Ok((offset, pkg.len()))
        })?;

        let status = SubSliceStatus { package_len: new_len, version: 0 };
        self.commit(vec![
            BatchOp::Put { col: DBCol::FileOffset, key: offset_key, value: offset.to_be_bytes().to_vec() },
            BatchOp::Put {
                col: DBCol::SubSliceStatus,
                key: sub_slice_status_key(sub_idx),
                value: borsh::to_vec(&status).expect("SubSliceStatus borsh encoding cannot fail"),
            },
        ])?;
        metrics::FILES_APPENDED.inc();
        Ok(offset)
    }

    /// Raw byte-range read over sub-slice 0's package file, with no record
    /// framing (§4.7 `get_archive_slice`: streaming a whole package to a
    /// peer catching up). Unlike [`Self::get_file`], this never consults
    /// the KV index; the caller already knows the offset.
    pub fn read_raw_slice(&self, offset: u64, limit: u32) -> SliceResult<Vec<u8>> {
        self.with_package(0, |pkg| Ok(pkg.read_raw(offset, limit)?))
    }

    pub fn get_file(&self, masterchain_ref_seqno: u32, ref_id: &FileRefId) -> SliceResult<Vec<u8>> {
        let offset_key = file_offset_key(&ref_id.hash());
        let bytes = self
            .db
            .get(DBCol::FileOffset, &offset_key)?
            .into_option()
            .ok_or_else(|| SliceError::FileNotFound(ref_id.block_id))?;
        let offset = u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8]));
        let sub_idx = self.sub_idx_for(masterchain_ref_seqno);
        let (_, data) = self.with_package(sub_idx, |pkg| Ok(pkg.read(offset)?))?;
        Ok(data)
    }

    /// Generic binary search over a shard's contiguous `[first_idx,
    /// last_idx)` entries (§4.4 `get_block_by_*`).
    fn lookup_by<K: Ord + Copy>(
        &self,
        shard: ShardPrefix,
        key: K,
        last: impl Fn(&ShardDescriptor) -> K,
        extract: impl Fn(&ShardEntry) -> K,
        exact: bool,
    ) -> SliceResult<BlockId> {
        let descriptor = self.load_descriptor(shard)?.ok_or(SliceError::NoMatchingBlock)?;
        if descriptor.last_idx == descriptor.first_idx {
            return Err(SliceError::NoMatchingBlock);
        }
        if last(&descriptor) < key {
            return Err(SliceError::NoMatchingBlock);
        }

        let (mut lo, mut hi) = (descriptor.first_idx, descriptor.last_idx);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.load_entry(shard, mid)?;
            if extract(&entry) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo >= descriptor.last_idx {
            return Err(SliceError::NoMatchingBlock);
        }
        let entry = self.load_entry(shard, lo)?;
        if exact && extract(&entry) != key {
            return Err(SliceError::NoMatchingBlock);
        }
        Ok(entry.block_id)
    }

    pub fn get_block_by_seqno(&self, shard: ShardPrefix, seqno: u32, exact: bool) -> SliceResult<BlockId> {
        self.lookup_by(shard, seqno, |d| d.last_seqno, |e| e.block_id.seqno, exact)
    }

    pub fn get_block_by_lt(&self, shard: ShardPrefix, lt: u64, exact: bool) -> SliceResult<BlockId> {
        self.lookup_by(shard, lt, |d| d.last_lt, |e| e.lt, exact)
    }

    pub fn get_block_by_unix_time(&self, shard: ShardPrefix, unix_time: u32, exact: bool) -> SliceResult<BlockId> {
        self.lookup_by(shard, unix_time, |d| d.last_ts, |e| e.unix_time, exact)
    }

    /// §4.4 `truncate`: drops every entry (across every registered shard)
    /// whose `owning_mc_seqno` exceeds `mc_seqno`, rewriting the affected
    /// package(s) so offsets stay contiguous, and commits atomically.
    pub fn truncate(&self, mc_seqno: u32) -> SliceResult<()> {
        let list = self.load_shard_list()?;
        let mut ops = Vec::new();

        for shard in list.shards {
            let Some(mut descriptor) = self.load_descriptor(shard)? else { continue };
            let mut new_last_idx = descriptor.first_idx;
            let mut last_seqno = 0;
            let mut last_lt = 0;
            let mut last_ts = 0;
            for idx in descriptor.first_idx..descriptor.last_idx {
                let entry = self.load_entry(shard, idx)?;
                if entry.owning_mc_seqno > mc_seqno {
                    break;
                }
                new_last_idx = idx + 1;
                last_seqno = last_seqno.max(entry.block_id.seqno);
                last_lt = last_lt.max(entry.lt);
                last_ts = last_ts.max(entry.unix_time);
            }
            if new_last_idx == descriptor.last_idx {
                continue;
            }
            for idx in new_last_idx..descriptor.last_idx {
                ops.push(BatchOp::Delete { col: DBCol::ShardEntry, key: entry_key(shard, idx) });
            }
            descriptor.last_idx = new_last_idx;
            descriptor.last_seqno = last_seqno;
            descriptor.last_lt = last_lt;
            descriptor.last_ts = last_ts;
            ops.push(BatchOp::Put {
                col: DBCol::ShardDescriptor,
                key: descriptor_key(shard),
                value: borsh::to_vec(&descriptor).expect("ShardDescriptor borsh encoding cannot fail"),
            });
        }

        self.commit(ops)?;

        if self.sliced {
            let cutoff_sub_idx = self.sub_idx_for(mc_seqno);
            let mut packages = self.packages.lock();
            packages.retain(|sub_idx, _| *sub_idx <= cutoff_sub_idx);
        }
        Ok(())
    }

    /// §4.4 `destroy`: unlinks every package file, then removes the KV
    /// directory with a bounded backoff retry loop (other handles may
    /// still have it open).
    pub fn destroy(&self) -> SliceResult<()> {
        {
            let mut state = self.state.lock();
            if *state == SliceState::Destroyed {
                return Ok(());
            }
            *state = SliceState::Destroyed;
        }
        self.packages.lock().clear();

        let mut attempt = 0;
        loop {
            match std::fs::remove_dir_all(&self.dir) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= DESTROY_MAX_ATTEMPTS {
                        return Err(SliceError::Corruption(format!(
                            "failed to remove slice directory after {attempt} attempts: {e}"
                        )));
                    }
                    tracing::warn!(target: "archive_slice", dir = %self.dir.display(), attempt, "destroy retrying");
                    std::thread::sleep(DESTROY_RETRY_DELAY);
                }
            }
        }
    }
}
