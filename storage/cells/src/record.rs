use borsh::{BorshDeserialize, BorshSerialize};

use archive_primitives::{Cell, CryptoHash};

/// On-disk row for one cell (§4.2: `{refcount, serialized_body, stored_as_boc?}`).
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug)]
pub struct CellRecord {
    pub refcount: u64,
    pub cell: Cell,
    /// Distinguishes cells whose child references are inlined into a
    /// bag-of-cells blob below the configured depth cutoff, versus one row
    /// per cell (the default).
    pub stored_as_boc: bool,
}

impl CellRecord {
    pub fn key(hash: &CryptoHash) -> Vec<u8> {
        hash.as_bytes().to_vec()
    }

    pub fn encode(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("CellRecord borsh encoding is infallible")
    }

    pub fn decode(hash: &CryptoHash, bytes: &[u8]) -> Result<Self, crate::errors::CellError> {
        CellRecord::try_from_slice(bytes)
            .map_err(|e| crate::errors::CellError::Corruption(*hash, e.to_string()))
    }
}
