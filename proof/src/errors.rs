use archive_primitives::{CryptoHash, ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error(transparent)]
    Cell(#[from] archive_cells::CellError),

    #[error("cell {0} referenced by a proof is not available to this node")]
    MissingCell(CryptoHash),

    #[error("malformed block cell layout: {0}")]
    MalformedBlock(String),

    #[error("proof root hash {got} does not match claimed block root hash {want}")]
    RootMismatch { got: CryptoHash, want: CryptoHash },

    #[error("proof is internally inconsistent: {0}")]
    Inconsistent(String),

    #[error("key block {0} carries no validator-set information")]
    NotAKeyBlock(archive_primitives::BlockId),

    #[error("validator signatures cover only {covered} of the required weight (need > {threshold})")]
    InsufficientSignatureWeight { covered: u64, threshold: u64 },

    #[error("proof chain exceeded the {0}-link budget without reaching the destination")]
    ChainBudgetExceeded(u32),

    #[error("{0}")]
    MissingCollaboratorData(String),
}

pub type ProofResult<T> = Result<T, ProofError>;

impl HasErrorKind for ProofError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProofError::Cell(e) => e.kind(),
            ProofError::MissingCell(_) => ErrorKind::NotReady,
            ProofError::MalformedBlock(_) => ErrorKind::ProtocolViolation,
            ProofError::RootMismatch { .. } => ErrorKind::ProtocolViolation,
            ProofError::Inconsistent(_) => ErrorKind::ProtocolViolation,
            ProofError::NotAKeyBlock(_) => ErrorKind::ProtocolViolation,
            ProofError::InsufficientSignatureWeight { .. } => ErrorKind::ProtocolViolation,
            ProofError::ChainBudgetExceeded(_) => ErrorKind::ProtocolViolation,
            ProofError::MissingCollaboratorData(_) => ErrorKind::NotReady,
        }
    }
}
