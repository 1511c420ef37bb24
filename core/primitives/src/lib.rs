//! Base types shared across the archive engine: block identifiers, shard
//! prefixes, content-addressed cells and their hashes. Every other crate in
//! the workspace depends on this one and nothing else upstream of it.

pub mod account;
pub mod block;
pub mod block_id;
pub mod cell;
pub mod errors;
pub mod file_ref;
pub mod hash;
pub mod shard;
pub mod state;

pub use account::{AccountRecordFields, TransactionRecordFields};
pub use block::{
    AccountBlocksRef, BlockInfoFields, BlockRootRef, BlockSignature, ExtraRef,
    INFO_REF_PREV_SIGNATURES,
};
pub use block_id::{BlockId, ShardSeqno, MASTERCHAIN_ID};
pub use cell::{Cell, CellKind, MAX_DATA_BITS, MAX_REFS};
pub use errors::{ErrorKind, HasErrorKind};
pub use file_ref::{FileKind, FileRefId};
pub use hash::CryptoHash;
pub use shard::{ShardDescrFields, ShardPrefix};
pub use state::{McExtraRef, OldBlocksAndStatsRef, StateRootRef};
