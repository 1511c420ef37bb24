use archive_primitives::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StateDbError {
    #[error(transparent)]
    Kv(#[from] archive_kv::KvError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no file indexed under this key")]
    NotFound,

    #[error("singleton row is corrupt: {0}")]
    Corruption(String),
}

pub type StateDbResult<T> = Result<T, StateDbError>;

impl HasErrorKind for StateDbError {
    fn kind(&self) -> ErrorKind {
        match self {
            StateDbError::Kv(e) => e.kind(),
            StateDbError::Io(_) => ErrorKind::IoError,
            StateDbError::NotFound => ErrorKind::NotFound,
            StateDbError::Corruption(_) => ErrorKind::Corruption,
        }
    }
}
