use crate::columns::DBCol;
use crate::errors::KvResult;

/// Result of a point lookup (§4.1: `get(key) -> {Found(bytes) | Missing}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Found(Vec<u8>),
    Missing,
}

impl GetResult {
    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            GetResult::Found(v) => Some(v),
            GetResult::Missing => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, GetResult::Found(_))
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put { col: DBCol, key: Vec<u8>, value: Vec<u8> },
    Delete { col: DBCol, key: Vec<u8> },
}

/// Write-only, all-or-nothing group of mutations (§4.1). Applied atomically:
/// on process restart a partially-applied batch is never observed.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, col: DBCol, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put { col, key: key.into(), value: value.into() });
    }

    pub fn delete(&mut self, col: DBCol, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { col, key: key.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Applies this batch directly on top of another, used by the
    /// optimistic-concurrency transaction to fold buffered writes into the
    /// value map it re-validates at commit time.
    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }
}

/// An immutable, point-in-time consistent view of the database (§4.1,
/// §5 "Shared resources"). Must be released explicitly; implementations
/// should also release on `Drop` as a backstop.
pub trait Snapshot: Send + Sync {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult>;
    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;
    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;
    /// Wall-clock age of this snapshot, for the oldest-live-snapshot
    /// monitoring hook called out in §5.
    fn age(&self) -> std::time::Duration;
}

/// Thin abstraction over a persistent ordered key/value store (§4.1).
///
/// Outside of a batch or transaction, reads observe only durable state;
/// inside one, reads observe prior writes made through the same batch or
/// transaction (§4.1 contract).
pub trait Database: Send + Sync {
    fn get(&self, col: DBCol, key: &[u8]) -> KvResult<GetResult>;

    fn get_multi(&self, col: DBCol, keys: &[Vec<u8>]) -> KvResult<Vec<GetResult>> {
        keys.iter().map(|k| self.get(col, k)).collect()
    }

    fn scan_prefix(&self, col: DBCol, prefix: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn range(&self, col: DBCol, lo: &[u8], hi: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Applies `batch` atomically.
    fn write(&self, batch: WriteBatch) -> KvResult<()>;

    /// A snapshot consistent as of the moment of the call.
    fn snapshot(&self) -> KvResult<Box<dyn Snapshot>>;

    /// Mutex serializing the read/compare/write window of optimistic
    /// transactions built on top of this database (see [`crate::txn::Transaction`]).
    fn txn_lock(&self) -> &parking_lot::Mutex<()>;
}
