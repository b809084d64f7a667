use std::fmt;

use crate::vfs::FsError;

/// Crate-wide error type. Parser workers never surface these; every stage
/// converts failures into a task `Status` (see `parser`).
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Database(rusqlite::Error),
    /// Migration or schema bootstrap failure. Fatal to initialisation.
    Schema(String),
    Fs(FsError),
    /// Internal constraint violation (FK, uniqueness, broken invariant).
    Invariant(String),
    /// A bounded wait elapsed (probe completion, shutdown grace).
    Timeout,
    /// The pipeline was paused or shut down while work was in flight.
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        Error::Database(err)
    }
}

impl From<FsError> for Error {
    fn from(err: FsError) -> Error {
        Error::Fs(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Database(e) => write!(f, "database error: {}", e),
            Error::Schema(msg) => write!(f, "schema error: {}", msg),
            Error::Fs(e) => write!(f, "filesystem error: {}", e),
            Error::Invariant(msg) => write!(f, "invariant violation: {}", msg),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Database(e) => Some(e),
            _ => None,
        }
    }
}
