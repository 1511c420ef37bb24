use std::sync::Arc;

use archive_handle::BlockHandleData;
use archive_kv::MemoryDatabase;
use archive_manager::{ArchiveManager, ManagerConfig};
use archive_primitives::{BlockId, CryptoHash, ShardPrefix, MASTERCHAIN_ID};

fn mc_block(seqno: u32) -> BlockId {
    BlockId {
        workchain: MASTERCHAIN_ID,
        shard: ShardPrefix::MASTERCHAIN,
        seqno,
        root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
        file_hash: CryptoHash::hash_bytes(&(seqno + 1).to_le_bytes()),
    }
}

fn handle_data(seqno: u32, ts: u32) -> BlockHandleData {
    BlockHandleData { masterchain_ref_seqno: seqno, unix_time: ts, ..Default::default() }
}

fn open_manager(dir: &std::path::Path) -> ArchiveManager {
    let catalog_db: Arc<dyn archive_kv::Database> = Arc::new(MemoryDatabase::new());
    let factory: archive_manager::SliceDbFactory =
        Arc::new(|_path| Ok(Arc::new(MemoryDatabase::new()) as Arc<dyn archive_kv::Database>));
    ArchiveManager::open(dir, catalog_db, factory, ManagerConfig { archive_size: 100, key_archive_size: 1000 })
        .unwrap()
}

#[test]
fn add_then_get_handle_routes_through_the_perm_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(dir.path());
    let id = mc_block(5);
    manager.add_handle(id, 5, 1000, false, true, &handle_data(5, 1000)).unwrap();
    assert_eq!(manager.get_handle(&id).unwrap(), handle_data(5, 1000));
}

#[test]
fn unmoved_handles_land_in_a_temp_bucket_and_are_still_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(dir.path());
    let id = mc_block(5);
    manager.add_handle(id, 5, 3700, false, false, &handle_data(5, 3700)).unwrap();
    assert_eq!(manager.get_handle(&id).unwrap(), handle_data(5, 3700));
}

#[test]
fn get_block_by_seqno_finds_blocks_across_perm_slices() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(dir.path());
    for seqno in [50u32, 150, 250] {
        let id = mc_block(seqno);
        manager.add_handle(id, seqno, seqno * 10, false, true, &handle_data(seqno, seqno * 10)).unwrap();
    }
    let found = manager.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 150, true).unwrap();
    assert_eq!(found.seqno, 150);
}

#[test]
fn run_gc_retires_old_perm_slices_but_keeps_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(dir.path());
    // Anchors 0 and 100, each with a masterchain descriptor timestamped
    // far enough apart that a ttl-based sweep retires only the older one.
    manager.add_handle(mc_block(10), 10, 1_000, false, true, &handle_data(10, 1_000)).unwrap();
    manager.add_handle(mc_block(110), 110, 100_000, false, true, &handle_data(110, 100_000)).unwrap();

    let destroyed = manager.run_gc(100_000 + 10, 50_000).unwrap();
    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].id, 0);

    assert!(manager.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 10, true).is_err());
    assert!(manager.get_block_by_seqno(ShardPrefix::MASTERCHAIN, 110, true).is_ok());
}

#[test]
fn get_archive_slice_reads_raw_bytes_back_from_the_package_named_by_get_archive_id() {
    use archive_primitives::{FileKind, FileRefId};

    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(dir.path());
    let id = mc_block(5);
    manager.add_handle(id, 5, 1000, false, true, &handle_data(5, 1000)).unwrap();
    manager.add_file(5, 1000, true, FileRefId::new(id, FileKind::Data), b"block-bytes").unwrap();

    let archive_id = manager.get_archive_id(5).unwrap();
    let slice = manager.get_archive_slice(archive_id, 0, 4096).unwrap();
    assert!(slice.windows(b"block-bytes".len()).any(|w| w == b"block-bytes"));

    assert!(manager.get_archive_id(999_999).is_err());
}
