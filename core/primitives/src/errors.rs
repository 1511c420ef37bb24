use std::fmt;

/// The error kinds named in spec §7, shared by every crate in the engine so
/// that a caller several layers up (in particular the lite-query dispatcher)
/// can map any failure to a wire error code without matching on crate-local
/// error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested object is not yet in the database; used for graceful paging
    /// and for races against GC.
    NotReady,
    /// Object is definitively absent (e.g. by hash).
    NotFound,
    /// Invalid ids, malformed proofs, hash mismatches, inconsistent headers.
    ProtocolViolation,
    /// KV or package invariants broken; fatal to the affected slice.
    Corruption,
    /// Deadline reached.
    Timeout,
    /// Cancellation token fired.
    Cancelled,
    /// Underlying filesystem or KV failure.
    IoError,
    /// Transient: resource busy (e.g. async-batch in progress).
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotReady => "not_ready",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Corruption => "corruption",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::IoError => "io_error",
            ErrorKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate-local error enum so generic code (mostly the
/// lite-query dispatcher) can retrieve the wire-level kind without knowing
/// the concrete error type.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}
