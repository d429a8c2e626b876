//! Cache Error Types
//!
//! The cache itself never fails: a miss is `None`. These errors come from
//! reading a file's identity when building a [`ContainerKey`].
//!
//! [`ContainerKey`]: crate::ContainerKey

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    /// File metadata could not be read.
    #[display("I/O error")]
    Io(std::io::Error),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
