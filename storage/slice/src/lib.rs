//! One archive slice (§4.4): a package (or sliced array of packages) plus
//! the per-shard KV index that lets the manager answer block lookups
//! without scanning package bytes.

mod errors;
pub mod metrics;
mod slice;
mod types;

pub use errors::{SliceError, SliceResult};
pub use slice::{ArchiveSlice, SliceState};
pub use types::{ShardDescriptor, ShardEntry, ShardList, SliceKind, SubSliceStatus};
