use archive_primitives::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error(transparent)]
    Kv(#[from] archive_kv::KvError),

    #[error("cell {0} not found")]
    NotFound(archive_primitives::CryptoHash),

    #[error("corrupt cell record for {0}: {1}")]
    Corruption(archive_primitives::CryptoHash, String),

    #[error("block {0} already has a stored root")]
    RootAlreadyExists(archive_primitives::BlockId),

    #[error("no root is registered for block {0}")]
    NoSuchRoot(archive_primitives::BlockId),

    #[error("optimistic transaction retried {0} times without converging")]
    TooManyConflicts(u32),
}

pub type CellResult<T> = Result<T, CellError>;

impl HasErrorKind for CellError {
    fn kind(&self) -> ErrorKind {
        match self {
            CellError::Kv(e) => e.kind(),
            CellError::NotFound(_) => ErrorKind::NotFound,
            CellError::Corruption(_, _) => ErrorKind::Corruption,
            CellError::RootAlreadyExists(_) => ErrorKind::ProtocolViolation,
            CellError::NoSuchRoot(_) => ErrorKind::NotFound,
            CellError::TooManyConflicts(_) => ErrorKind::Unavailable,
        }
    }
}
