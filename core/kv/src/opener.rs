use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::columns::DBCol;
use crate::database::{Database, GetResult, WriteBatch};
use crate::errors::{KvError, KvResult};
use crate::rocksdb_backend::RocksDbDatabase;

/// On-disk format version written to [`DBCol::DbVersion`] under the empty
/// key. Bump whenever the schema in §6 changes incompatibly.
pub const DB_VERSION: u32 = 1;

const VERSION_KEY: &[u8] = b"version";

/// Mirrors the teacher's `Mode` (`node_storage/opener.rs`): governs whether
/// opening is allowed to create a fresh database or must find one already
/// there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create a brand new database; fails if one already exists.
    Create,
    /// Open an existing database or create one if missing.
    ReadWrite,
    /// Open an existing database; fails if none exists. No writes expected
    /// beyond what the caller performs.
    ReadWriteExisting,
    /// Open an existing database read-only; fails if none exists or if the
    /// on-disk version does not match [`DB_VERSION`] exactly (no migration
    /// is possible in this mode).
    ReadOnly,
}

impl Mode {
    fn can_create(self) -> bool {
        matches!(self, Mode::Create | Mode::ReadWrite)
    }

    fn must_create(self) -> bool {
        matches!(self, Mode::Create)
    }

    fn read_only(self) -> bool {
        matches!(self, Mode::ReadOnly)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("database at {0} does not exist")]
    DoesNotExist(PathBuf),

    #[error("database at {0} already exists")]
    AlreadyExists(PathBuf),

    #[error(
        "database version {got} incompatible with expected {want}; refusing to open read-only"
    )]
    VersionMismatchOnRead { got: u32, want: u32 },

    #[error("database version {got} is newer than this binary supports ({want})")]
    VersionTooNew { got: u32, want: u32 },
}

/// Opens one RocksDB-backed store, checking (and, outside of read-only
/// mode, stamping) the on-disk format version the way the teacher's
/// `StoreOpener::ensure_version` does for a single database (§4.1,
/// `node_storage/opener.rs`). Unlike the teacher this crate has no
/// hot/cold split and no migrator chain yet: `DB_VERSION` has never been
/// bumped, so there is nothing to migrate from.
pub struct DbOpener {
    path: PathBuf,
}

impl DbOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbOpener { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self, mode: Mode) -> Result<Arc<dyn Database>, OpenError> {
        let exists = self.path.join("CURRENT").exists();
        match (exists, mode.must_create(), mode.can_create()) {
            (true, true, _) => return Err(OpenError::AlreadyExists(self.path.clone())),
            (false, _, false) => return Err(OpenError::DoesNotExist(self.path.clone())),
            _ => {}
        }

        let db: Arc<dyn Database> = if mode.read_only() {
            Arc::new(RocksDbDatabase::open_read_only(&self.path)?)
        } else {
            Arc::new(RocksDbDatabase::open(&self.path)?)
        };

        match db.get(DBCol::DbVersion, VERSION_KEY)? {
            GetResult::Missing => {
                if mode.read_only() {
                    return Err(OpenError::VersionMismatchOnRead { got: 0, want: DB_VERSION });
                }
                let mut batch = WriteBatch::new();
                batch.put(DBCol::DbVersion, VERSION_KEY.to_vec(), DB_VERSION.to_le_bytes().to_vec());
                db.write(batch)?;
                tracing::info!(target: "archive_kv", path = %self.path.display(), version = DB_VERSION, "initialized fresh database");
            }
            GetResult::Found(bytes) => {
                let got = u32::from_le_bytes(
                    bytes.try_into().map_err(|_| KvError::Corruption("malformed version row".into()))?,
                );
                if got > DB_VERSION {
                    return Err(OpenError::VersionTooNew { got, want: DB_VERSION });
                }
                if got < DB_VERSION && mode.read_only() {
                    return Err(OpenError::VersionMismatchOnRead { got, want: DB_VERSION });
                }
                // got < DB_VERSION in read-write mode would run migrations here;
                // there is only one version so far.
            }
        }

        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_reopen_read_write_existing() {
        let dir = tempfile::tempdir().unwrap();
        let opener = DbOpener::new(dir.path());
        {
            let db = opener.open(Mode::Create).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(DBCol::Singletons, b"k".to_vec(), b"v".to_vec());
            db.write(batch).unwrap();
        }
        let db = opener.open(Mode::ReadWriteExisting).unwrap();
        assert_eq!(db.get(DBCol::Singletons, b"k").unwrap(), GetResult::Found(b"v".to_vec()));
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let opener = DbOpener::new(dir.path());
        opener.open(Mode::Create).unwrap();
        assert!(matches!(opener.open(Mode::Create), Err(OpenError::AlreadyExists(_))));
    }

    #[test]
    fn read_write_existing_on_missing_db_fails() {
        let dir = tempfile::tempdir().unwrap();
        let opener = DbOpener::new(dir.path().join("missing"));
        assert!(matches!(opener.open(Mode::ReadWriteExisting), Err(OpenError::DoesNotExist(_))));
    }
}
