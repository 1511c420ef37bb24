use borsh::{BorshDeserialize, BorshSerialize};

use crate::block_id::BlockId;
use crate::hash::CryptoHash;

/// Which file is being asked for within one block's handle (§4.7
/// `store_block_{data,signatures,proof,proof_link,candidate,state}` /
/// `try_get_static_file`). An archive slice indexes package offsets by
/// `ref_id.hash()`, not by this enum directly, so two different blocks never
/// collide and a single block's five files never collide with each other.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FileKind {
    Data,
    Signatures,
    Proof,
    ProofLink,
    Candidate,
    State,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct FileRefId {
    pub block_id: BlockId,
    pub kind: FileKind,
}

impl FileRefId {
    pub fn new(block_id: BlockId, kind: FileKind) -> Self {
        FileRefId { block_id, kind }
    }

    /// Content hash used as the package-offset index key (§3 "Package":
    /// "Indexed by KV mapping hash(name) -> offset").
    pub fn hash(&self) -> CryptoHash {
        let bytes = borsh::to_vec(self).expect("FileRefId borsh encoding cannot fail");
        CryptoHash::hash_bytes(&bytes)
    }

    /// The package record name this ref is stored under.
    pub fn record_name(&self) -> String {
        format!("{}:{:?}", self.block_id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_id::MASTERCHAIN_ID;
    use crate::shard::ShardPrefix;

    fn id() -> BlockId {
        BlockId {
            workchain: MASTERCHAIN_ID,
            shard: ShardPrefix::MASTERCHAIN,
            seqno: 1,
            root_hash: CryptoHash::hash_bytes(b"r"),
            file_hash: CryptoHash::hash_bytes(b"f"),
        }
    }

    #[test]
    fn different_kinds_for_the_same_block_hash_differently() {
        let data = FileRefId::new(id(), FileKind::Data).hash();
        let proof = FileRefId::new(id(), FileKind::Proof).hash();
        assert_ne!(data, proof);
    }
}
