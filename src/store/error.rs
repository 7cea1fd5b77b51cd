//! Store error types

use std::fmt;

/// Errors that can occur within the [`Store`](super::Store) layer.
#[derive(Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The requested key could not be decoded into the expected record type.
    Decode {
        /// Underlying codec error message.
        message: String,
    },

    /// The underlying backing store failed on commit (or, for
    /// [`FileStore`](super::file::FileStore), on open/replay).
    ///
    /// [`FileStore`]: super::file::FileStore
    Io {
        /// Underlying I/O error message.
        message: String,
    },

    /// A persisted record failed its integrity check (e.g. CRC32 mismatch
    /// in [`FileStore`](super::file::FileStore)).
    Corrupt {
        /// Description of the corruption.
        message: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Decode { message } => write!(f, "store decode error: {message}"),
            StoreError::Io { message } => write!(f, "store io error: {message}"),
            StoreError::Corrupt { message } => write!(f, "store corruption: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            message: err.to_string(),
        }
    }
}
