use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use archive_kv::{DBCol, Database};
use archive_primitives::BlockId;

use crate::errors::StateDbResult;

const INIT_MC_BLOCK: &[u8] = b"init_mc_block";
const GC_MC_BLOCK: &[u8] = b"gc_mc_block";
const SHARD_CLIENT_MC_BLOCK: &[u8] = b"shard_client_mc_block";
const HARDFORKS: &[u8] = b"hardforks";
const ASYNC_SERIALIZER_STATE: &[u8] = b"async_serializer_state";
const DESTROYED_VALIDATOR_SESSIONS: &[u8] = b"destroyed_validator_sessions";
/// `[SUPPLEMENT]`: mirrors the original's `set/get_init_masterchain_id`,
/// a thin passthrough kept alongside the other startup singletons.
const INIT_MASTERCHAIN_ID: &[u8] = b"init_masterchain_id";

fn get<T: BorshDeserialize>(db: &dyn Database, key: &[u8]) -> StateDbResult<Option<T>> {
    db.get(DBCol::Singletons, key)?
        .into_option()
        .map(|b| T::try_from_slice(&b))
        .transpose()
        .map_err(|e| crate::errors::StateDbError::Corruption(e.to_string()))
}

fn put<T: BorshSerialize>(db: &dyn Database, key: &[u8], value: &T) -> StateDbResult<()> {
    let mut batch = archive_kv::WriteBatch::default();
    batch.put(DBCol::Singletons, key, borsh::to_vec(value).expect("singleton borsh encoding cannot fail"));
    db.write(batch)?;
    Ok(())
}

/// The handful of process-wide rows named in §3/§4.7: init/gc/shard-client
/// masterchain block pointers, hardforks, async-serializer progress, and
/// destroyed validator sessions. One row per field, all sharing
/// `DBCol::Singletons`.
pub struct Singletons {
    db: Arc<dyn Database>,
}

impl Singletons {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Singletons { db }
    }

    pub fn get_init_mc_block(&self) -> StateDbResult<Option<BlockId>> {
        get(self.db.as_ref(), INIT_MC_BLOCK)
    }

    pub fn set_init_mc_block(&self, id: BlockId) -> StateDbResult<()> {
        put(self.db.as_ref(), INIT_MC_BLOCK, &id)
    }

    pub fn get_gc_mc_block(&self) -> StateDbResult<Option<BlockId>> {
        get(self.db.as_ref(), GC_MC_BLOCK)
    }

    pub fn set_gc_mc_block(&self, id: BlockId) -> StateDbResult<()> {
        put(self.db.as_ref(), GC_MC_BLOCK, &id)
    }

    pub fn get_shard_client_mc_block(&self) -> StateDbResult<Option<BlockId>> {
        get(self.db.as_ref(), SHARD_CLIENT_MC_BLOCK)
    }

    pub fn set_shard_client_mc_block(&self, id: BlockId) -> StateDbResult<()> {
        put(self.db.as_ref(), SHARD_CLIENT_MC_BLOCK, &id)
    }

    pub fn get_hardforks(&self) -> StateDbResult<Vec<BlockId>> {
        Ok(get::<Vec<BlockId>>(self.db.as_ref(), HARDFORKS)?.unwrap_or_default())
    }

    pub fn set_hardforks(&self, ids: &[BlockId]) -> StateDbResult<()> {
        put(self.db.as_ref(), HARDFORKS, &ids.to_vec())
    }

    pub fn get_async_serializer_state(&self) -> StateDbResult<Option<Vec<u8>>> {
        get(self.db.as_ref(), ASYNC_SERIALIZER_STATE)
    }

    pub fn set_async_serializer_state(&self, bytes: &[u8]) -> StateDbResult<()> {
        put(self.db.as_ref(), ASYNC_SERIALIZER_STATE, &bytes.to_vec())
    }

    pub fn get_destroyed_validator_sessions(&self) -> StateDbResult<Vec<archive_primitives::CryptoHash>> {
        Ok(get::<Vec<archive_primitives::CryptoHash>>(self.db.as_ref(), DESTROYED_VALIDATOR_SESSIONS)?
            .unwrap_or_default())
    }

    pub fn set_destroyed_validator_sessions(
        &self,
        sessions: &[archive_primitives::CryptoHash],
    ) -> StateDbResult<()> {
        put(self.db.as_ref(), DESTROYED_VALIDATOR_SESSIONS, &sessions.to_vec())
    }

    pub fn get_init_masterchain_id(&self) -> StateDbResult<Option<BlockId>> {
        get(self.db.as_ref(), INIT_MASTERCHAIN_ID)
    }

    pub fn set_init_masterchain_id(&self, id: BlockId) -> StateDbResult<()> {
        put(self.db.as_ref(), INIT_MASTERCHAIN_ID, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_kv::MemoryDatabase;
    use archive_primitives::{CryptoHash, ShardPrefix, MASTERCHAIN_ID};

    fn id(seqno: u32) -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno,
            root_hash: CryptoHash::hash_bytes(&seqno.to_le_bytes()),
            file_hash: CryptoHash::hash_bytes(&(seqno + 1).to_le_bytes()),
        }
    }

    #[test]
    fn unset_singletons_read_as_none_or_empty() {
        let s = Singletons::new(Arc::new(MemoryDatabase::new()));
        assert_eq!(s.get_init_mc_block().unwrap(), None);
        assert_eq!(s.get_hardforks().unwrap(), Vec::new());
    }

    #[test]
    fn set_then_get_roundtrips_each_singleton() {
        let s = Singletons::new(Arc::new(MemoryDatabase::new()));
        s.set_gc_mc_block(id(7)).unwrap();
        assert_eq!(s.get_gc_mc_block().unwrap(), Some(id(7)));

        s.set_hardforks(&[id(1), id(2)]).unwrap();
        assert_eq!(s.get_hardforks().unwrap(), vec![id(1), id(2)]);

        s.set_init_masterchain_id(id(0)).unwrap();
        assert_eq!(s.get_init_masterchain_id().unwrap(), Some(id(0)));
    }
}
