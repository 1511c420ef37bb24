use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use crate::columns::DBCol;
use crate::database::{Database, GetResult, Snapshot, WriteBatch};
use crate::errors::{KvError, KvResult};

/// RocksDB-backed [`Database`]. One instance per physical store: the cell
/// store, each archive slice, the global catalog, the singletons store all
/// open their own `RocksDbDatabase` over their own directory (§4.1).
pub struct RocksDbDatabase {
    db: Arc<DB>,
    txn_lock: Mutex<()>,
}

fn cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

fn cf_handle<'a>(db: &'a DB, col: DBCol) -> KvResult<&'a rocksdb::ColumnFamily> {
    let name = col.to_string();
    db.cf_handle(&name).ok_or(KvError::UnknownColumn(Box::leak(name.into_boxed_str())))
}

impl RocksDbDatabase {
    /// Opens (creating if absent) a RocksDB instance at `path` with every
    /// column family in [`DBCol::all`] declared. Callers needing version
    /// or kind checks should go through [`crate::opener::DbOpener`] instead
    /// of calling this directly.
    pub fn open(path: &Path) -> KvResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> =
            DBCol::all().map(|col| ColumnFamilyDescriptor::new(col.to_string(), cf_options())).collect();

        let db = DB::open_cf_descriptors(&db_opts, path, descriptors)?;
        Ok(RocksDbDatabase { db: Arc::new(db), txn_lock: Mutex::new(()) })
    }

    pub fn open_read_only(path: &Path) -> KvResult<Self> {
        let db_opts = Options::default();
        let names: Vec<String> = DBCol::all().map(|c| c.to_string()).collect();
        let db = DB::open_cf_for_read_only(&db_opts, path, &names, false)?;
        Ok(RocksDbDatabase { db: Arc::new(db), txn_lock: Mutex::new(()) })
    }
}

impl Database for RocksDbDatabase {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult> {
        let cf = cf_handle(&self.db, col)?;
        match self.db.get_cf(cf, key)? {
            Some(v) => Ok(GetResult::Found(v)),
            None => Ok(GetResult::Missing),
        }
    }

    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = cf_handle(&self.db, col)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = cf_handle(&self.db, col)?;
        let mode = rocksdb::IteratorMode::From(lo, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (k, v) = item?;
            if k.as_ref() >= hi {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn write(&self, batch: WriteBatch) -> KvResult<()> {
        let mut wb = rocksdb::WriteBatch::default();
        for op in batch.iter() {
            match op {
                crate::database::BatchOp::Put { col, key, value } => {
                    wb.put_cf(cf_handle(&self.db, *col)?, key, value);
                }
                crate::database::BatchOp::Delete { col, key } => {
                    wb.delete_cf(cf_handle(&self.db, *col)?, key);
                }
            }
        }
        tracing::debug!(target: "archive_kv", ops = batch.len(), "committing write batch");
        self.db.write(wb)?;
        Ok(())
    }

    fn snapshot(&self) -> KvResult<Box<dyn Snapshot>> {
        // `rocksdb::Snapshot<'_>` borrows `&DB`. Cloning the `Arc<DB>` into
        // the returned snapshot and erasing the borrow to `'static` is sound
        // because the clone keeps the underlying `DB` alive for at least as
        // long as the snapshot; the snapshot never outlives its own `db`
        // field, which is dropped last.
        let db = self.db.clone();
        let inner: rocksdb::Snapshot<'static> =
            unsafe { std::mem::transmute(db.snapshot()) };
        Ok(Box::new(RocksDbSnapshot { taken_at: Instant::now(), db, inner }))
    }

    fn txn_lock(&self) -> &parking_lot::Mutex<()> {
        &self.txn_lock
    }
}

struct RocksDbSnapshot {
    taken_at: Instant,
    // Kept alive so the transmuted-'static `inner` snapshot stays valid;
    // must never be dropped before `inner`. Field order matters: Rust drops
    // struct fields in declaration order, so `inner` drops before `db`.
    inner: rocksdb::Snapshot<'static>,
    db: Arc<DB>,
}

impl Snapshot for RocksDbSnapshot {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult> {
        let cf = cf_handle(&self.db, col)?;
        match self.inner.get_cf(cf, key)? {
            Some(v) => Ok(GetResult::Found(v)),
            None => Ok(GetResult::Missing),
        }
    }

    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = cf_handle(&self.db, col)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.inner.iterator_cf(cf, mode) {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = cf_handle(&self.db, col)?;
        let mode = rocksdb::IteratorMode::From(lo, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.inner.iterator_cf(cf, mode) {
            let (k, v) = item?;
            if k.as_ref() >= hi {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }
}

/// Convenience constructor shared by the opener and tests: wraps the opened
/// database in the `Arc<dyn Database>` every higher-level crate stores.
pub fn open_shared(path: &Path) -> KvResult<Arc<dyn Database>> {
    Ok(Arc::new(RocksDbDatabase::open(path)?))
}
