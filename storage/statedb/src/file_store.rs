use std::path::PathBuf;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use archive_kv::{DBCol, Database};
use archive_primitives::{BlockId, CryptoHash};

use crate::errors::{StateDbError, StateDbResult};

/// `(state_block_id, masterchain_block_id)` (§3 "Persistent state"):
/// identifies one persistent-state blob. Its borsh encoding's hash is both
/// the existence-index key and, in hex, the on-disk file name.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct PersistentStateRefId {
    pub state_block_id: BlockId,
    pub masterchain_block_id: BlockId,
}

impl PersistentStateRefId {
    pub fn hash(&self) -> CryptoHash {
        let bytes = borsh::to_vec(self).expect("PersistentStateRefId borsh encoding cannot fail");
        CryptoHash::hash_bytes(&bytes)
    }
}

/// A flat directory of content-addressed files, indexed in memory (via
/// `DBCol::FileIndex`) for existence checks (§3 "Persistent state" /
/// §6 "`<root>/static>`"). Used both for persistent states/zerostates
/// (named by their reference-id hash) and for the static-file directory
/// (named by their own content hash); `namespace` keeps the two index
/// ranges from colliding when they share one `Database`.
pub struct FileStore {
    dir: PathBuf,
    db: Arc<dyn Database>,
    namespace: &'static str,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, db: Arc<dyn Database>, namespace: &'static str) -> StateDbResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileStore { dir, db, namespace })
    }

    fn index_key(&self, hash: &CryptoHash) -> Vec<u8> {
        let mut key = self.namespace.as_bytes().to_vec();
        key.push(b':');
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn file_name(&self, hash: &CryptoHash) -> String {
        hex::encode(hash.as_bytes())
    }

    pub fn contains(&self, hash: &CryptoHash) -> StateDbResult<bool> {
        Ok(self.db.get(DBCol::FileIndex, &self.index_key(hash))?.is_found())
    }

    /// Writes `data` under a name derived from `hash` and indexes it. A
    /// no-op if already present, matching the package-level "adding an
    /// already-present ref is a no-op" idiom used throughout this engine.
    pub fn put(&self, hash: &CryptoHash, data: &[u8]) -> StateDbResult<()> {
        if self.contains(hash)? {
            return Ok(());
        }
        let path = self.dir.join(self.file_name(hash));
        std::fs::write(&path, data)?;

        let mut batch = archive_kv::WriteBatch::default();
        batch.put(DBCol::FileIndex, self.index_key(hash), self.file_name(hash).into_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    pub fn get(&self, hash: &CryptoHash) -> StateDbResult<Vec<u8>> {
        let name = self
            .db
            .get(DBCol::FileIndex, &self.index_key(hash))?
            .into_option()
            .ok_or(StateDbError::NotFound)?;
        let name = String::from_utf8(name).map_err(|e| StateDbError::Corruption(e.to_string()))?;
        Ok(std::fs::read(self.dir.join(name))?)
    }

    /// Steps the GC loop one entry at a time (§4.5 "A GC loop steps one
    /// entry per tick, queries the external 'may-delete?' callback, and
    /// unlinks stale files"). Returns the hash removed, if any.
    pub fn gc_step(&self, may_delete: impl FnOnce(&CryptoHash) -> bool) -> StateDbResult<Option<CryptoHash>> {
        let prefix = format!("{}:", self.namespace);
        let entries = self.db.scan_prefix(DBCol::FileIndex, prefix.as_bytes())?;
        let Some((key, name)) = entries.into_iter().next() else { return Ok(None) };
        let hash_bytes: [u8; 32] = key[prefix.len()..].try_into().map_err(|_| {
            StateDbError::Corruption("file index key has the wrong length for a hash".into())
        })?;
        let hash = CryptoHash(hash_bytes);
        if !may_delete(&hash) {
            return Ok(None);
        }

        let name = String::from_utf8(name).map_err(|e| StateDbError::Corruption(e.to_string()))?;
        let path = self.dir.join(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let mut batch = archive_kv::WriteBatch::default();
        batch.delete(DBCol::FileIndex, key);
        self.db.write(batch)?;
        tracing::info!(target: "archive_statedb", namespace = self.namespace, hash = %hash, "gc removed file");
        Ok(Some(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_kv::MemoryDatabase;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), Arc::new(MemoryDatabase::new()), "static").unwrap();
        let hash = CryptoHash::hash_bytes(b"zerostate-bytes");
        store.put(&hash, b"zerostate-bytes").unwrap();
        assert_eq!(store.get(&hash).unwrap(), b"zerostate-bytes");
    }

    #[test]
    fn two_namespaces_sharing_one_db_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
        let statics = FileStore::open(dir.path().join("static"), db.clone(), "static").unwrap();
        let states = FileStore::open(dir.path().join("state"), db, "state").unwrap();
        let hash = CryptoHash::hash_bytes(b"shared-content");
        statics.put(&hash, b"in statics").unwrap();
        assert!(!states.contains(&hash).unwrap());
    }

    #[test]
    fn gc_step_removes_one_entry_when_permitted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), Arc::new(MemoryDatabase::new()), "state").unwrap();
        let hash = CryptoHash::hash_bytes(b"stale");
        store.put(&hash, b"stale").unwrap();
        let removed = store.gc_step(|_| true).unwrap();
        assert_eq!(removed, Some(hash));
        assert!(!store.contains(&hash).unwrap());
    }
}
