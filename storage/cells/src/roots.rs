use borsh::{BorshDeserialize, BorshSerialize};

use archive_primitives::{BlockId, CryptoHash};

/// Entry in the doubly-linked root list (DATA MODEL §3 "Cell DB entry").
/// The sentinel is stored under [`SENTINEL_KEY`] with `block_id = None`;
/// the list is cyclic through it so the GC sweep always has an
/// oldest-first starting point (`sentinel.next`) without a special case
/// for "list is empty" (sentinel simply points to itself).
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct RootEntry {
    pub block_id: Option<BlockId>,
    pub prev_key: Vec<u8>,
    pub next_key: Vec<u8>,
    pub root_hash: CryptoHash,
}

/// The KV key under which the sentinel entry lives: the empty byte string,
/// which can never collide with a borsh-encoded `BlockId` (always
/// non-empty).
pub const SENTINEL_KEY: &[u8] = &[];

pub fn entry_key(block_id: &BlockId) -> Vec<u8> {
    borsh::to_vec(block_id).expect("BlockId borsh encoding is infallible")
}

impl RootEntry {
    pub fn encode(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("RootEntry borsh encoding is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::errors::CellError> {
        RootEntry::try_from_slice(bytes).map_err(|e| {
            crate::errors::CellError::Corruption(CryptoHash::ZERO, format!("root entry: {e}"))
        })
    }

    pub fn sentinel(self_key_prev: Vec<u8>, self_key_next: Vec<u8>) -> Self {
        RootEntry { block_id: None, prev_key: self_key_prev, next_key: self_key_next, root_hash: CryptoHash::ZERO }
    }
}
