//! Container and image format detection.
//!
//! Comic files are routinely mislabeled: a `.cbz` that is really a RAR
//! archive, a `.cbr` that is really a ZIP. This crate decides what a file
//! *is* from its leading bytes, using the extension only when no signature
//! matches:
//!
//! - **Containers** via [`identify`] and [`Format::from_magic_bytes`]
//! - **Page images** via [`ImageFormat::from_magic_bytes`], used to record a
//!   best-effort declared format for every page without decoding it
//! - **Peek-decide-stream** via [`PeekableReader`], which reads just enough of
//!   a stream to inspect its header

mod construct;
pub mod error;
mod image;
mod peekable;
mod util;

pub use crate::construct::{HEADER_PROBE_LEN, identify};
pub use crate::image::ImageFormat;
pub use crate::peekable::PeekableReader;

/// A supported comic container format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Format {
    /// ZIP archive (.cbz)
    Zip,
    /// RAR archive, version 4 or 5 (.cbr)
    Rar,
    /// POSIX or GNU tarball (.cbt)
    Tar,
    /// 7-Zip archive (.cb7)
    SevenZip,
    /// PDF document
    Pdf,
}

impl Format {
    /// Every format, in detection order.
    pub const ALL: [Format; 5] = [Format::Zip, Format::Rar, Format::Tar, Format::SevenZip, Format::Pdf];
}
