//! Assembles every store named in §6's on-disk layout into one
//! [`archive_rootdb::RootDb`] and [`archive_liteserver::LiteServer`] pair.
//! Kept apart from `main.rs` so `#[cfg(test)]` can build a wired node
//! against a temp directory without going through `clap`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use archive_kv::{DbOpener, Mode};
use archive_liteserver::{LiteServer, LiteServerConfig};
use archive_manager::{ManagerConfig, SliceDbFactory};
use archive_primitives::{BlockId, CryptoHash, ShardPrefix, MASTERCHAIN_ID};
use archive_rootdb::{RootDb, RootDbConfig};

use crate::collaborators::{StaticChainTip, UnwiredMessageSink, UnwiredValidatorSource, UnwiredVm};
use crate::config::ArchiveConfig;

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("failed to open {what} database: {source}")]
    Open { what: &'static str, source: archive_kv::OpenError },
    #[error(transparent)]
    RootDb(#[from] archive_rootdb::RootDbError),
}

/// Everything a running node needs: the two dispatchers plus the chain-tip
/// collaborator `main.rs` updates as blocks are applied (set by whatever
/// drives consensus in a full deployment; see [`StaticChainTip`]).
pub struct WiredNode {
    pub root_db: Arc<RootDb>,
    pub lite_server: Arc<LiteServer>,
    pub chain_tip: Arc<StaticChainTip>,
    pub config: ArchiveConfig,
}

/// Opens `<db_root>/celldb`, `<db_root>/state`, and
/// `<db_root>/archive/catalog` (§6's layout), builds the per-shard slice
/// factory under `<db_root>/archive/slices`, and wires the result into a
/// [`RootDb`] and [`LiteServer`]. `mode` governs whether missing databases
/// are created (`Mode::ReadWrite`) or treated as an error (e.g. for a
/// read-only inspection tool, `Mode::ReadOnly`).
pub fn open(db_root: &Path, config: ArchiveConfig, mode: Mode) -> Result<WiredNode, WiringError> {
    std::fs::create_dir_all(db_root).ok();

    let cells_db = DbOpener::new(db_root.join("celldb"))
        .open(mode)
        .map_err(|source| WiringError::Open { what: "celldb", source })?;
    let state_db = DbOpener::new(db_root.join("state"))
        .open(mode)
        .map_err(|source| WiringError::Open { what: "state", source })?;
    let catalog_db = DbOpener::new(db_root.join("archive/catalog"))
        .open(mode)
        .map_err(|source| WiringError::Open { what: "archive catalog", source })?;

    let slices_root = db_root.join("archive/slices");
    let slice_mode = mode;
    let slice_db_factory: SliceDbFactory = Arc::new(move |rel: &Path| {
        let path = slices_root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        DbOpener::new(path)
            .open(slice_mode)
            .map_err(|e| archive_manager::ManagerError::Corruption(e.to_string()))
    });

    let root_config = RootDbConfig {
        manager: ManagerConfig { archive_size: config.archive_size, key_archive_size: config.key_archive_size },
        cells: archive_cells::CellStoreConfig {
            boc_depth_cutoff: config.celldb_compress_depth,
            migration_batch_size: config.celldb_migration_batch_size,
        },
    };

    let root_db = Arc::new(RootDb::open(db_root.to_path_buf(), cells_db, state_db, catalog_db, slice_db_factory, root_config)?);

    let chain_tip = Arc::new(StaticChainTip::new(zerostate_placeholder()));

    let lite_server = Arc::new(LiteServer::new(
        root_db.clone(),
        chain_tip.clone(),
        Arc::new(UnwiredValidatorSource),
        Arc::new(UnwiredValidatorSource),
        Arc::new(UnwiredVm),
        Arc::new(UnwiredMessageSink),
        LiteServerConfig {
            default_deadline: Duration::from_secs(config.query_deadline_secs),
            response_cache_capacity: config.response_cache_capacity,
            recent_messages_capacity: config.recent_messages_capacity,
            max_enumerated_entries: config.max_enumerated_entries,
        },
    ));

    Ok(WiredNode { root_db, lite_server, chain_tip, config })
}

/// Stand-in zerostate id until a real one is threaded through from genesis
/// tooling (out of this workspace's scope, per spec.md §1); callers that
/// care should override it through [`StaticChainTip::set_tip`] once the
/// surrounding deployment knows the real value.
fn zerostate_placeholder() -> BlockId {
    BlockId {
        workchain: MASTERCHAIN_ID,
        shard: ShardPrefix::MASTERCHAIN,
        seqno: 0,
        root_hash: CryptoHash::hash_bytes(b"unconfigured-zerostate"),
        file_hash: CryptoHash::hash_bytes(b"unconfigured-zerostate-file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_every_store_under_db_root() {
        let dir = tempfile::tempdir().unwrap();
        let node = open(dir.path(), ArchiveConfig::default(), Mode::Create).unwrap();
        assert!(dir.path().join("celldb").exists());
        assert!(dir.path().join("state").exists());
        assert!(dir.path().join("archive/catalog").exists());
        drop(node);
    }

    #[test]
    fn reopening_with_create_mode_fails_the_second_time() {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path(), ArchiveConfig::default(), Mode::Create).unwrap();
        let err = open(dir.path(), ArchiveConfig::default(), Mode::Create);
        assert!(err.is_err());
    }
}
