use archive_primitives::{BlockId, ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    #[error(transparent)]
    Kv(#[from] archive_kv::KvError),

    #[error(transparent)]
    Package(#[from] archive_package::PackageError),

    #[error("no handle known for block {0:?}")]
    HandleNotFound(BlockId),

    #[error("no file of the requested kind stored for block {0:?}")]
    FileNotFound(BlockId),

    #[error("no block in shard matched the lookup key")]
    NoMatchingBlock,

    #[error("shard descriptor for this slice is corrupt: {0}")]
    Corruption(String),

    #[error("slice is closed and cannot accept new writes")]
    Closed,
}

pub type SliceResult<T> = Result<T, SliceError>;

impl HasErrorKind for SliceError {
    fn kind(&self) -> ErrorKind {
        match self {
            SliceError::Kv(e) => e.kind(),
            SliceError::Package(_) => ErrorKind::Corruption,
            SliceError::HandleNotFound(_) => ErrorKind::NotFound,
            SliceError::FileNotFound(_) => ErrorKind::NotFound,
            SliceError::NoMatchingBlock => ErrorKind::NotFound,
            SliceError::Corruption(_) => ErrorKind::Corruption,
            SliceError::Closed => ErrorKind::Unavailable,
        }
    }
}
