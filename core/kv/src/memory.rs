use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::columns::DBCol;
use crate::database::{BatchOp, Database, GetResult, Snapshot, WriteBatch};
use crate::errors::KvResult;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// `BTreeMap`-backed [`Database`] fake, used by the proptest suites in §8
/// so the invariants can be checked without touching disk, and as the
/// reference model an RocksDB-backed run is checked against.
pub struct MemoryDatabase {
    cols: RwLock<enum_map::EnumMap<DBCol, Table>>,
    txn_lock: Mutex<()>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        MemoryDatabase { cols: RwLock::new(enum_map::EnumMap::default()), txn_lock: Mutex::new(()) }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemoryDatabase {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult> {
        let cols = self.cols.read();
        Ok(match cols[col].get(key) {
            Some(v) => GetResult::Found(v.clone()),
            None => GetResult::Missing,
        })
    }

    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cols = self.cols.read();
        Ok(cols[col]
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cols = self.cols.read();
        Ok(cols[col].range(lo.to_vec()..hi.to_vec()).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn write(&self, batch: WriteBatch) -> KvResult<()> {
        let mut cols = self.cols.write();
        for op in batch.iter() {
            match op {
                BatchOp::Put { col, key, value } => {
                    cols[*col].insert(key.clone(), value.clone());
                }
                BatchOp::Delete { col, key } => {
                    cols[*col].remove(key);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> KvResult<Box<dyn Snapshot>> {
        let cols = self.cols.read();
        Ok(Box::new(MemorySnapshot { taken_at: Instant::now(), cols: cols.clone() }))
    }

    fn txn_lock(&self) -> &parking_lot::Mutex<()> {
        &self.txn_lock
    }
}

struct MemorySnapshot {
    taken_at: Instant,
    cols: enum_map::EnumMap<DBCol, Table>,
}

impl Snapshot for MemorySnapshot {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult> {
        Ok(match self.cols[col].get(key) {
            Some(v) => GetResult::Found(v.clone()),
            None => GetResult::Missing,
        })
    }

    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.cols[col]
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.cols[col].range(lo.to_vec()..hi.to_vec()).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let db = MemoryDatabase::new();
        let mut batch = WriteBatch::new();
        batch.put(DBCol::Singletons, b"k".to_vec(), b"v".to_vec());
        db.write(batch).unwrap();
        assert_eq!(db.get(DBCol::Singletons, b"k").unwrap(), GetResult::Found(b"v".to_vec()));
        assert_eq!(db.get(DBCol::Cells, b"k").unwrap(), GetResult::Missing);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_writes() {
        let db = MemoryDatabase::new();
        let mut batch = WriteBatch::new();
        batch.put(DBCol::Singletons, b"k".to_vec(), b"v1".to_vec());
        db.write(batch).unwrap();

        let snap = db.snapshot().unwrap();

        let mut batch = WriteBatch::new();
        batch.put(DBCol::Singletons, b"k".to_vec(), b"v2".to_vec());
        db.write(batch).unwrap();

        assert_eq!(snap.get(DBCol::Singletons, b"k").unwrap(), GetResult::Found(b"v1".to_vec()));
        assert_eq!(db.get(DBCol::Singletons, b"k").unwrap(), GetResult::Found(b"v2".to_vec()));
    }

    #[test]
    fn scan_prefix_respects_column_boundaries() {
        let db = MemoryDatabase::new();
        let mut batch = WriteBatch::new();
        batch.put(DBCol::Cells, b"a1".to_vec(), b"x".to_vec());
        batch.put(DBCol::Cells, b"a2".to_vec(), b"y".to_vec());
        batch.put(DBCol::Cells, b"b1".to_vec(), b"z".to_vec());
        batch.put(DBCol::CellRoots, b"a1".to_vec(), b"w".to_vec());
        db.write(batch).unwrap();

        let found = db.scan_prefix(DBCol::Cells, b"a").unwrap();
        assert_eq!(found, vec![(b"a1".to_vec(), b"x".to_vec()), (b"a2".to_vec(), b"y".to_vec())]);
    }
}
