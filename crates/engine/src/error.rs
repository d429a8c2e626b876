//! Engine Error Types
//!
//! Two families matter to callers. Container-level kinds
//! ([`UnknownFormat`](ErrorKind::UnknownFormat),
//! [`Unreadable`](ErrorKind::Unreadable), [`NotFound`](ErrorKind::NotFound))
//! come out of `open` and mean there is no comic to show. Page-level kinds
//! ([`EntryRead`](ErrorKind::EntryRead),
//! [`SkippedPage`](ErrorKind::SkippedPage)) affect one page only; the rest of
//! the container stays usable.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Neither the signature nor the extension identify a supported
    /// container. Not a comic.
    #[display("unknown container format: {}", _0.display())]
    UnknownFormat(#[error(not(source))] PathBuf),
    /// The container's structure can't be indexed, or it holds no pages.
    #[display("unreadable comic: {_0}")]
    Unreadable(#[error(not(source))] String),
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Reading the container file failed. May succeed on retry.
    #[display("I/O error")]
    Io,
    #[display("page {index} is out of range (page count {page_count})")]
    PageOutOfRange { index: usize, page_count: usize },
    /// The page was found damaged while opening and is listed in the
    /// container's integrity status.
    #[display("page {index} was skipped as damaged: {reason}")]
    SkippedPage { index: usize, reason: String },
    /// The page failed when it was read. Other pages are unaffected.
    #[display("page {index} could not be read: {reason}")]
    EntryRead { index: usize, reason: String },
    /// Every page failed as a cover candidate.
    #[display("no page could be used as a cover")]
    NoCoverAvailable,
    /// The container was closed.
    #[display("container has been closed")]
    Closed,
    /// The file changed or disappeared after the container was opened.
    /// Open it again.
    #[display("comic changed on disk since it was opened: {}", _0.display())]
    SourceChanged(#[error(not(source))] PathBuf),
    /// The request was dropped before it finished.
    #[display("operation cancelled")]
    Cancelled,
    /// A blocking task panicked or was aborted.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Cancelled)
    }

    /// Whether the error concerns a single page rather than the container.
    pub fn is_page_local(&self) -> bool {
        matches!(self, Self::SkippedPage { .. } | Self::EntryRead { .. } | Self::PageOutOfRange { .. })
    }
}
