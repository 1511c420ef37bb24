use archive_primitives::{ErrorKind, HasErrorKind};

/// Wire-level error codes (§4.9/§7 "lite queries translate into wire-level
/// error codes, distinct code for each kind"). Assigned once here rather
/// than scattered across call sites, so every query flow maps consistently.
pub fn wire_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotReady => 1,
        ErrorKind::NotFound => 2,
        ErrorKind::ProtocolViolation => 3,
        ErrorKind::Corruption => 4,
        ErrorKind::Timeout => 5,
        ErrorKind::Cancelled => 6,
        ErrorKind::IoError => 7,
        ErrorKind::Unavailable => 8,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LiteServerError {
    #[error(transparent)]
    RootDb(#[from] archive_rootdb::RootDbError),

    #[error(transparent)]
    Proof(#[from] archive_proof::ProofError),

    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("query deadline exceeded")]
    Timeout,

    #[error("query was cancelled")]
    Cancelled,

    #[error("run_smc_method: {0}")]
    VmFailure(String),

    #[error("query handler task panicked or was dropped")]
    HandlerLost,
}

pub type LiteServerResult<T> = Result<T, LiteServerError>;

impl HasErrorKind for LiteServerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LiteServerError::RootDb(e) => e.kind(),
            LiteServerError::Proof(e) => e.kind(),
            LiteServerError::InvalidRequest(_) => ErrorKind::ProtocolViolation,
            LiteServerError::Timeout => ErrorKind::Timeout,
            LiteServerError::Cancelled => ErrorKind::Cancelled,
            LiteServerError::VmFailure(_) => ErrorKind::ProtocolViolation,
            LiteServerError::HandlerLost => ErrorKind::Cancelled,
        }
    }
}

impl LiteServerError {
    pub fn wire_code(&self) -> i32 {
        wire_code(self.kind())
    }
}
