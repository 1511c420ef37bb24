use archive_primitives::{BlockId, ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Kv(#[from] archive_kv::KvError),

    #[error(transparent)]
    Slice(#[from] archive_slice::SliceError),

    #[error("catalog is corrupt: {0}")]
    Corruption(String),

    #[error("no handle known for block {0:?}")]
    HandleNotFound(BlockId),

    #[error("no file of the requested kind stored for block {0:?}")]
    FileNotFound(BlockId),

    #[error("no permanent archive anchored at {0}")]
    ArchiveNotFound(u32),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

impl HasErrorKind for ManagerError {
    fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Kv(e) => e.kind(),
            ManagerError::Slice(e) => e.kind(),
            ManagerError::Corruption(_) => ErrorKind::Corruption,
            ManagerError::HandleNotFound(_) => ErrorKind::NotFound,
            ManagerError::FileNotFound(_) => ErrorKind::NotFound,
            ManagerError::ArchiveNotFound(_) => ErrorKind::NotReady,
        }
    }
}
