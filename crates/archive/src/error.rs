//! Archive Error Types
//!
//! Structured errors built on `exn`. The split that matters to callers is
//! between [`Structure`](ErrorKind::Structure), meaning the container as a
//! whole can't be indexed, and the per-entry kinds, which only ever affect
//! one page.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The container's structural index (central directory, header chain,
    /// page tree) can't be built. The file is unreadable; don't retry.
    #[display("unreadable container structure: {_0}")]
    Structure(#[error(not(source))] String),
    /// No member with this name exists in the container.
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// One member could not be read or decompressed. Other members are
    /// unaffected.
    #[display("entry could not be read: {_0}")]
    EntryRead(#[error(not(source))] String),
    /// The member uses a feature we don't read (encryption, an exotic
    /// compression method).
    #[display("unsupported entry: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// The backend has been closed and its handles released.
    #[display("container has been closed")]
    Closed,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Map an I/O error on the container file itself, keeping the path for
    /// the kinds a user can act on.
    pub(crate) fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Whether this error is confined to a single entry.
    pub fn is_entry_local(&self) -> bool {
        matches!(self, Self::EntryNotFound(_) | Self::EntryRead(_) | Self::Unsupported(_))
    }
}
