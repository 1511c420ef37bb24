use std::sync::Arc;

use archive_handle::BlockHandleData;
use archive_kv::MemoryDatabase;
use archive_primitives::{BlockId, CryptoHash, FileKind, FileRefId, ShardPrefix, MASTERCHAIN_ID};
use archive_slice::{ArchiveSlice, SliceKind};

fn mc_block(seqno: u32) -> BlockId {
    BlockId {
        workchain: MASTERCHAIN_ID,
        shard: ShardPrefix::MASTERCHAIN,
        seqno,
        root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
        file_hash: CryptoHash::hash_bytes(&(seqno + 100).to_le_bytes()),
    }
}

fn handle_data(seqno: u32, lt: u64, ts: u32) -> BlockHandleData {
    BlockHandleData { logical_time: lt, unix_time: ts, masterchain_ref_seqno: seqno, ..Default::default() }
}

fn open_slice(dir: &std::path::Path) -> Arc<ArchiveSlice> {
    let db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
    ArchiveSlice::open(dir, db, SliceKind::Perm, 0, false, 0).unwrap()
}

#[test]
fn add_handle_then_get_handle_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    let id = mc_block(1);
    let data = handle_data(1, 100, 1000);
    slice.add_handle(id, 1, &data).unwrap();
    assert_eq!(slice.get_handle(&id).unwrap(), data);
}

#[test]
fn lookup_by_seqno_finds_the_smallest_entry_at_or_above_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    for (seqno, lt, ts) in [(10u32, 100u64, 1000u32), (11, 150, 1100), (12, 200, 1200)] {
        slice.add_handle(mc_block(seqno), seqno, &handle_data(seqno, lt, ts)).unwrap();
    }

    let found = slice.get_block_by_lt(ShardPrefix::MASTERCHAIN, 170, false).unwrap();
    assert_eq!(found.seqno, 12);

    let exact = slice.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 11, true).unwrap();
    assert_eq!(exact.seqno, 11);

    assert!(slice.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 999, true).is_err());
}

#[test]
fn add_file_then_get_file_roundtrips_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    let ref_id = FileRefId::new(mc_block(1), FileKind::Proof);
    let off1 = slice.add_file(1, ref_id, b"proof-bytes").unwrap();
    let off2 = slice.add_file(1, ref_id, b"proof-bytes").unwrap();
    assert_eq!(off1, off2);
    assert_eq!(slice.get_file(1, &ref_id).unwrap(), b"proof-bytes");
}

#[test]
fn truncate_drops_entries_past_the_cutoff() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    for seqno in [10u32, 11, 12] {
        slice.add_handle(mc_block(seqno), seqno, &handle_data(seqno, seqno as u64 * 10, seqno * 100)).unwrap();
    }
    slice.truncate(11).unwrap();
    assert_eq!(slice.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 11, true).unwrap().seqno, 11);
    assert!(slice.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 12, true).is_err());
}

#[test]
fn async_mode_batches_writes_until_an_explicit_flush() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    slice.enter_async_mode();
    let id = mc_block(1);
    slice.add_handle(id, 1, &handle_data(1, 10, 100)).unwrap();
    // Buffered, not yet applied to the underlying database.
    assert!(slice.get_handle(&id).is_err());
    slice.flush().unwrap();
    assert!(slice.get_handle(&id).is_ok());
}

#[test]
fn destroy_removes_the_slice_directory() {
    let dir = tempfile::tempdir().unwrap();
    let slice = open_slice(dir.path());
    let ref_id = FileRefId::new(mc_block(1), FileKind::Data);
    slice.add_file(1, ref_id, b"x").unwrap();
    slice.close().unwrap();
    slice.destroy().unwrap();
    assert!(!dir.path().join("archive.00000.pack").exists());
}
