use std::collections::BTreeMap;

use crate::columns::DBCol;
use crate::database::{Database, GetResult, WriteBatch};
use crate::errors::{KvError, KvResult};

/// Read-write transaction with optimistic concurrency (§4.1). Reads made
/// through the transaction observe its own buffered writes; on `commit`,
/// every key the transaction read is re-checked against the live database
/// and the whole transaction aborts with [`KvError::Conflict`] if any of
/// them changed since it was read.
pub struct Transaction<'a> {
    db: &'a dyn Database,
    reads: BTreeMap<(DBCol, Vec<u8>), Option<Vec<u8>>>,
    writes: BTreeMap<(DBCol, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> Transaction<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Transaction { db, reads: BTreeMap::new(), writes: BTreeMap::new() }
    }

    pub fn get(&mut self, col: DBCol, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        if let Some(v) = self.writes.get(&(col, key.to_vec())) {
            return Ok(v.clone());
        }
        if let Some(v) = self.reads.get(&(col, key.to_vec())) {
            return Ok(v.clone());
        }
        let current = self.db.get(col, key)?.into_option();
        self.reads.insert((col, key.to_vec()), current.clone());
        Ok(current)
    }

    pub fn put(&mut self, col: DBCol, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.writes.insert((col, key.into()), Some(value.into()));
    }

    pub fn delete(&mut self, col: DBCol, key: impl Into<Vec<u8>>) {
        self.writes.insert((col, key.into()), None);
    }

    /// Validates every key this transaction read against the live database
    /// and, if nothing changed, applies the buffered writes in one atomic
    /// batch. Takes `db.txn_lock()` for the whole validate-then-write
    /// window so two transactions cannot interleave between the check and
    /// the write.
    pub fn commit(self) -> KvResult<()> {
        let _guard = self.db.txn_lock().lock();
        for ((col, key), expected) in &self.reads {
            let actual = self.db.get(*col, key)?.into_option();
            if actual != *expected {
                let name: &'static str = (*col).into();
                return Err(KvError::Conflict { col: name });
            }
        }
        let mut batch = WriteBatch::new();
        for ((col, key), value) in self.writes {
            match value {
                Some(v) => batch.put(col, key, v),
                None => batch.delete(col, key),
            }
        }
        self.db.write(batch)
    }

    pub fn abort(self) {
        // Dropping the transaction discards buffered reads/writes; nothing
        // was ever applied to `db`.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    #[test]
    fn commit_applies_buffered_writes() {
        let db = MemoryDatabase::new();
        let mut txn = Transaction::new(&db);
        txn.put(DBCol::Singletons, b"k".to_vec(), b"v".to_vec());
        txn.commit().unwrap();
        assert_eq!(db.get(DBCol::Singletons, b"k").unwrap(), GetResult::Found(b"v".to_vec()));
    }

    #[test]
    fn concurrent_write_to_a_read_key_aborts_the_transaction() {
        let db = MemoryDatabase::new();
        db.write({
            let mut b = WriteBatch::new();
            b.put(DBCol::Singletons, b"k".to_vec(), b"v1".to_vec());
            b
        })
        .unwrap();

        let mut txn = Transaction::new(&db);
        assert_eq!(txn.get(DBCol::Singletons, b"k").unwrap(), Some(b"v1".to_vec()));

        // A concurrent writer changes the key the transaction already read.
        db.write({
            let mut b = WriteBatch::new();
            b.put(DBCol::Singletons, b"k".to_vec(), b"v2".to_vec());
            b
        })
        .unwrap();

        txn.put(DBCol::Singletons, b"other".to_vec(), b"x".to_vec());
        assert!(matches!(txn.commit(), Err(KvError::Conflict { .. })));
    }
}
