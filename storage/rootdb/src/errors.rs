use archive_primitives::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum RootDbError {
    #[error(transparent)]
    Cell(#[from] archive_cells::CellError),

    #[error(transparent)]
    Manager(#[from] archive_manager::ManagerError),

    #[error(transparent)]
    StateDb(#[from] archive_statedb::StateDbError),

    #[error("block handle flush for {0} did not converge: {1}")]
    HandleFlush(archive_primitives::BlockId, String),

    #[error("no handle cached or persisted for block {0}")]
    HandleNotFound(archive_primitives::BlockId),

    #[error("archiver task for block {0} panicked or was cancelled")]
    ArchiverTaskLost(archive_primitives::BlockId),
}

pub type RootDbResult<T> = Result<T, RootDbError>;

impl HasErrorKind for RootDbError {
    fn kind(&self) -> ErrorKind {
        match self {
            RootDbError::Cell(e) => e.kind(),
            RootDbError::Manager(e) => e.kind(),
            RootDbError::StateDb(e) => e.kind(),
            RootDbError::HandleFlush(_, _) => ErrorKind::Unavailable,
            RootDbError::HandleNotFound(_) => ErrorKind::NotFound,
            RootDbError::ArchiverTaskLost(_) => ErrorKind::Cancelled,
        }
    }
}
