use crate::error::{Error, ErrorKind, Result};
use crate::{Format, PeekableReader};
use exn::{OptionExt, ResultExt};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Number of leading bytes read when identifying a container. Large enough
/// to cover one full TAR header block.
pub const HEADER_PROBE_LEN: usize = 512;

const ZIP_LOCAL_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const ZIP_SPANNED_MAGIC: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];
const RAR4_MAGIC: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
const RAR5_MAGIC: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];
const SEVEN_ZIP_MAGIC: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const PDF_MAGIC: &[u8] = b"%PDF-";
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" | "cbz" => Ok(Format::Zip),
            "rar" | "cbr" => Ok(Format::Rar),
            "tar" | "cbt" => Ok(Format::Tar),
            "7z" | "cb7" | "7zip" | "sevenzip" => Ok(Format::SevenZip),
            "pdf" => Ok(Format::Pdf),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Format {
    /// Guess the container format from a file extension alone.
    ///
    /// Only ever a tie-breaker: [`identify`] consults this when no signature
    /// matches the file's leading bytes.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "cbz" | "zip" => Some(Format::Zip),
            "cbr" | "rar" => Some(Format::Rar),
            "cbt" | "tar" => Some(Format::Tar),
            "cb7" | "7z" => Some(Format::SevenZip),
            "pdf" => Some(Format::Pdf),
            _ => None,
        }
    }

    /// Detect the container format from its leading bytes.
    ///
    /// TAR is only recognised when at least one full header block is present,
    /// the `ustar` magic sits at offset 257 and the header checksum is valid.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_LOCAL_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) || bytes.starts_with(&ZIP_SPANNED_MAGIC) {
            return Some(Format::Zip);
        }
        if bytes.starts_with(&RAR4_MAGIC) || bytes.starts_with(&RAR5_MAGIC) {
            return Some(Format::Rar);
        }
        if bytes.starts_with(&SEVEN_ZIP_MAGIC) {
            return Some(Format::SevenZip);
        }
        if bytes.starts_with(PDF_MAGIC) {
            return Some(Format::Pdf);
        }
        if bytes.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC) && tar_checksum_valid(bytes) {
            return Some(Format::Tar);
        }
        None
    }
}

/// Validate the checksum of the first TAR header block: the sum of all
/// header bytes, with the checksum field itself read as spaces.
fn tar_checksum_valid(bytes: &[u8]) -> bool {
    let Some(header) = bytes.get(..HEADER_PROBE_LEN) else {
        return false;
    };
    let field = &header[TAR_CHECKSUM_RANGE];
    let digits: String = field
        .iter()
        .copied()
        .skip_while(|b| *b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(b))
        .map(char::from)
        .collect();
    let Ok(expected) = u32::from_str_radix(&digits, 8) else {
        return false;
    };
    let unsigned: u32 = header
        .iter()
        .enumerate()
        .map(|(i, b)| if TAR_CHECKSUM_RANGE.contains(&i) { u32::from(b' ') } else { u32::from(*b) })
        .sum();
    // Some historic writers summed signed bytes.
    let signed: i64 = header
        .iter()
        .enumerate()
        .map(|(i, b)| if TAR_CHECKSUM_RANGE.contains(&i) { i64::from(b' ') } else { i64::from(*b as i8) })
        .sum();
    unsigned == expected || signed == i64::from(expected)
}

/// Identify the container format of the file at `path`.
///
/// The leading [`HEADER_PROBE_LEN`] bytes decide. When no signature matches,
/// the extension is used so that (for example) a `.cbz` whose first local
/// header is damaged still reaches the ZIP backend's recovery path. When the
/// signature and the extension disagree, the signature wins.
///
/// # Errors
///
/// [`UnknownFormat`](ErrorKind::UnknownFormat) when neither the signature nor
/// the extension identify a supported container.
#[instrument(skip(path), fields(path = %path.as_ref().display(), format))]
pub fn identify(path: impl AsRef<Path>) -> Result<Format> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Io),
    };
    let mut peekable = PeekableReader::new(file);
    let head = peekable.peek(HEADER_PROBE_LEN)?;
    let by_extension = Format::from_path(path);
    let format = match Format::from_magic_bytes(head) {
        Some(found) => {
            if let Some(claimed) = by_extension
                && claimed != found
            {
                tracing::warn!(claimed = %claimed, detected = %found, "Container signature contradicts its extension");
            }
            found
        },
        None => by_extension.ok_or_raise(|| ErrorKind::UnknownFormat(path.to_path_buf()))?,
    };
    tracing::Span::current().record("format", format.as_str());
    Ok(format)
}
