//! Render Error Types
//!
//! Structured errors built on `exn`, which tracks locations and builds an
//! error tree as errors are raised.

use derive_more::{Display, Error};

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The image bytes could not be decoded. Don't retry with the same input.
    #[display("image data could not be decoded")]
    Decode,
    /// Re-encoding a scaled image failed.
    #[display("image could not be encoded")]
    Encode,
    /// The PDF has no page with this (1-based) number.
    #[display("PDF page {_0} does not exist")]
    NoSuchPage(#[error(not(source))] u32),
    /// The page isn't a single embedded image and no external rasterizer is
    /// installed. Install poppler's `pdftoppm` or configure its path.
    #[display("pdftoppm not detected on your system")]
    RasterizerNotFound,
    /// `pdftoppm` exited with a non-zero exit code (or was killed by signal,
    /// reported as `-1`).
    #[display("pdftoppm exited with code: {_0}")]
    RasterizerFailed(#[error(not(source))] i32),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
