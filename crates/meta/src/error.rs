//! Metadata Error Types
//!
//! Extraction itself never fails: a bad value only drops that field. These
//! errors surface from the individual parsers ([`IssueNumber`] and friends)
//! for callers using them directly.
//!
//! [`IssueNumber`]: crate::IssueNumber

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// The sidecar isn't well-formed XML past some point.
    #[display("malformed XML: {_0}")]
    MalformedXml(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Metadata is parsed from bytes already in memory; the same input
        // always gives the same answer.
        false
    }

    pub(crate) fn parse(field: &'static str, value: impl Into<String>) -> Self {
        Self::ParseError { field, value: value.into() }
    }
}
