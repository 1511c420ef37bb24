//! Block handle (§3 "BlockHandle", §4.6 "Block handle flush protocol"):
//! mutable per-block metadata, versioned so the owning archive slice knows
//! exactly when a handle needs to be re-persisted.

use std::sync::atomic::{AtomicU64, Ordering};

use borsh::{BorshDeserialize, BorshSerialize};
use parking_lot::Mutex;

use archive_primitives::{BlockId, CryptoHash};

const MAX_FLUSH_ITERATIONS: u32 = 16;

/// The persisted portion of a handle: every bit and cross-reference named
/// in §3, but not `version`/`flushed_upto`, which are runtime-only
/// bookkeeping that would be meaningless to serialize (they describe *this
/// process's* view of how far persistence has caught up).
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct BlockHandleData {
    pub applied: bool,
    pub received: bool,
    pub proof_inited: bool,
    pub proof_link_inited: bool,
    pub signatures_inited: bool,
    pub state_inited: bool,
    pub state_deleted: bool,
    pub prev: [Option<BlockId>; 2],
    pub next: [Option<BlockId>; 2],
    pub masterchain_ref_seqno: u32,
    pub unix_time: u32,
    pub logical_time: u64,
    pub state_gen_utime: u32,
    pub state_root_hash: Option<CryptoHash>,
    pub is_key_block: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError<E> {
    #[error("flush did not converge after {0} iterations: handle is being mutated faster than it can be persisted")]
    TooManyIterations(u32),
    #[error(transparent)]
    Persist(E),
}

/// Mutable metadata for one known block (§3). Shared between the in-memory
/// block-handle index and the archive slice that hosts it, per the
/// Ownership note — hence `&self` setters rather than `&mut self`.
pub struct BlockHandle {
    id: BlockId,
    data: Mutex<BlockHandleData>,
    version: AtomicU64,
    flushed_upto: AtomicU64,
}

impl BlockHandle {
    pub fn new(id: BlockId) -> Self {
        BlockHandle { id, data: Mutex::new(BlockHandleData::default()), version: AtomicU64::new(0), flushed_upto: AtomicU64::new(0) }
    }

    /// Reconstructs a handle from previously-persisted bytes; `version` and
    /// `flushed_upto` both start at the same value since, by construction,
    /// everything loaded from disk is already durable.
    pub fn from_persisted(id: BlockId, data: BlockHandleData) -> Self {
        BlockHandle { id, data: Mutex::new(data), version: AtomicU64::new(1), flushed_upto: AtomicU64::new(1) }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn need_flush(&self) -> bool {
        self.version.load(Ordering::SeqCst) > self.flushed_upto.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BlockHandleData {
        self.data.lock().clone()
    }

    /// Applies `mutate` under the handle's lock and stamps `version++`
    /// (§4.6 "Every setter stamps version++"). Writes for a given handle
    /// are fully serialized by the lock, satisfying §3's invariant.
    fn mutate(&self, mutate: impl FnOnce(&mut BlockHandleData)) {
        let mut data = self.data.lock();
        mutate(&mut data);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_applied(&self) {
        self.mutate(|d| d.applied = true);
    }

    pub fn set_received(&self) {
        self.mutate(|d| d.received = true);
    }

    pub fn set_proof_inited(&self) {
        self.mutate(|d| d.proof_inited = true);
    }

    pub fn set_proof_link_inited(&self) {
        self.mutate(|d| d.proof_link_inited = true);
    }

    pub fn set_signatures_inited(&self) {
        self.mutate(|d| d.signatures_inited = true);
    }

    pub fn set_state_inited(&self, root_hash: CryptoHash, gen_utime: u32) {
        self.mutate(|d| {
            d.state_inited = true;
            d.state_root_hash = Some(root_hash);
            d.state_gen_utime = gen_utime;
        });
    }

    pub fn set_state_deleted(&self) {
        self.mutate(|d| d.state_deleted = true);
    }

    pub fn set_prev(&self, slot: usize, prev: BlockId) {
        self.mutate(|d| d.prev[slot] = Some(prev));
    }

    pub fn set_next(&self, slot: usize, next: BlockId) {
        self.mutate(|d| d.next[slot] = Some(next));
    }

    pub fn set_masterchain_ref_seqno(&self, seqno: u32) {
        self.mutate(|d| d.masterchain_ref_seqno = seqno);
    }

    pub fn set_times(&self, unix_time: u32, logical_time: u64) {
        self.mutate(|d| {
            d.unix_time = unix_time;
            d.logical_time = logical_time;
        });
    }

    pub fn set_key_block(&self, is_key_block: bool) {
        self.mutate(|d| d.is_key_block = is_key_block);
    }

    /// Runs the bounded flush loop from §4.6: read the current version,
    /// persist, stamp `flushed_upto`, and loop again if a mutation raced
    /// the write. `persist` receives the snapshotted data and the version
    /// it corresponds to, for callers that tag the serialized bytes with
    /// their version for diagnostics.
    pub fn flush<E>(
        &self,
        mut persist: impl FnMut(&BlockHandleData, u64) -> Result<(), E>,
    ) -> Result<(), FlushError<E>> {
        for _ in 0..MAX_FLUSH_ITERATIONS {
            let v = self.version.load(Ordering::SeqCst);
            let bytes = self.snapshot();
            persist(&bytes, v).map_err(FlushError::Persist)?;
            self.flushed_upto.store(v, Ordering::SeqCst);
            if self.version.load(Ordering::SeqCst) == v {
                return Ok(());
            }
            tracing::debug!(target: "archive_handle", id = %self.id, version = v, "handle mutated during flush, retrying");
        }
        Err(FlushError::TooManyIterations(MAX_FLUSH_ITERATIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_primitives::{ShardPrefix, MASTERCHAIN_ID};

    fn id() -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno: 1,
            root_hash: CryptoHash::hash_bytes(b"root"),
            file_hash: CryptoHash::hash_bytes(b"file"),
        }
    }

    #[test]
    fn fresh_handle_needs_flush_only_after_a_mutation() {
        let handle = BlockHandle::new(id());
        assert!(!handle.need_flush());
        handle.set_applied();
        assert!(handle.need_flush());
    }

    #[test]
    fn flush_clears_need_flush_when_no_race() {
        let handle = BlockHandle::new(id());
        handle.set_applied();
        handle.flush::<std::convert::Infallible>(|_, _| Ok(())).unwrap();
        assert!(!handle.need_flush());
    }

    #[test]
    fn mutation_during_persist_forces_a_second_iteration() {
        let handle = BlockHandle::new(id());
        handle.set_applied();
        let mut calls = 0;
        handle
            .flush::<std::convert::Infallible>(|_, v| {
                calls += 1;
                if v == 0 {
                    handle.set_received();
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert!(!handle.need_flush());
    }

    #[test]
    fn from_persisted_handle_does_not_need_flush() {
        let handle = BlockHandle::from_persisted(id(), BlockHandleData { applied: true, ..Default::default() });
        assert!(!handle.need_flush());
        assert!(handle.snapshot().applied);
    }
}
