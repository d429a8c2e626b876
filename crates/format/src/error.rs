//! Format Error Types
//!
//! Structured errors built on `exn`, which tracks locations and builds an
//! error tree as errors are raised through the crates above this one.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A format detection error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for format detection.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file does not exist.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// No signature matched and no supported extension claims the file. Not
    /// a comic; don't retry.
    #[display("unknown container format: {}", _0.display())]
    UnknownFormat(#[error(not(source))] PathBuf),
    /// A format name (from configuration or the command line) isn't one we
    /// recognise.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// Reading the header failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
