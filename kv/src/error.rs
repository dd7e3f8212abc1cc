use std::fmt;

/// Errors produced by the store and the command processor.
///
/// There is no I/O in this crate, so every variant here is a logical
/// condition rather than a system failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `GET`/`DEL` on a key that isn't present.
    NotFound,
    /// Malformed command line: unknown verb or wrong argument count.
    InvalidCommand(String),
    /// `START` issued while a transaction is already open.
    AlreadyInTransaction,
    /// `COMMIT`/`ROLLBACK` issued with no open transaction.
    NoTransaction,
    /// A touched key's version moved between first touch and `COMMIT`.
    VersionConflict,
    /// Catch-all for conditions that shouldn't occur given the invariants
    /// above; kept distinct so callers can tell it apart from user error.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "Key does not exist."),
            Error::InvalidCommand(msg) => write!(f, "{}", msg),
            Error::AlreadyInTransaction => write!(f, "Already in transaction."),
            Error::NoTransaction => write!(f, "No transaction in progress"),
            Error::VersionConflict => {
                write!(f, "Key version has changed since we last touched the key")
            }
            Error::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type CResult<T> = Result<T, Error>;
