use archive_primitives::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("column family {0} is not open on this database")]
    UnknownColumn(&'static str),

    #[error("transaction conflict: key under column {col} changed concurrently")]
    Conflict { col: &'static str },

    #[error("snapshot already released")]
    SnapshotReleased,

    #[error("database corruption: {0}")]
    Corruption(String),
}

impl archive_primitives::HasErrorKind for KvError {
    fn kind(&self) -> ErrorKind {
        match self {
            KvError::Io(_) => ErrorKind::IoError,
            KvError::RocksDb(_) => ErrorKind::IoError,
            KvError::UnknownColumn(_) => ErrorKind::ProtocolViolation,
            KvError::Conflict { .. } => ErrorKind::Unavailable,
            KvError::SnapshotReleased => ErrorKind::ProtocolViolation,
            KvError::Corruption(_) => ErrorKind::Corruption,
        }
    }
}

pub type KvResult<T> = Result<T, KvError>;
