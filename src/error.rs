use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Unified error type for the table format.
///
/// `Clone` so a table builder can hand the same sticky failure back from
/// every call after the first one.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// IO error from the output sink or the file system.
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
    /// Data corruption detected (checksum mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),
    /// A caller asked for something the builder cannot honour.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
