use std::path::Path;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WEBP_MAGIC: &[u8] = b"WEBP";
const BMP_MAGIC: &[u8] = b"BM";
const TIFF_LE_MAGIC: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];
const TIFF_BE_MAGIC: [u8; 4] = [0x4D, 0x4D, 0x00, 0x2A];
const JXL_CODESTREAM_MAGIC: [u8; 2] = [0xFF, 0x0A];
const JXL_CONTAINER_MAGIC: [u8; 12] = [0x00, 0x00, 0x00, 0x0C, 0x4A, 0x58, 0x4C, 0x20, 0x0D, 0x0A, 0x87, 0x0A];

/// The encoding of a page image.
///
/// Recorded per page from the entry's leading bytes; a `.jpg` entry that is
/// really a PNG is reported as [`Png`](Self::Png).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Avif,
    JpegXl,
}

impl ImageFormat {
    /// Detect an image encoding from its leading bytes. Twelve bytes are
    /// enough for every supported signature.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&JPEG_MAGIC) {
            return Some(ImageFormat::Jpeg);
        }
        if bytes.starts_with(&PNG_MAGIC) {
            return Some(ImageFormat::Png);
        }
        if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
            return Some(ImageFormat::Gif);
        }
        if bytes.starts_with(RIFF_MAGIC) && bytes.get(8..12) == Some(WEBP_MAGIC) {
            return Some(ImageFormat::Webp);
        }
        if bytes.starts_with(&TIFF_LE_MAGIC) || bytes.starts_with(&TIFF_BE_MAGIC) {
            return Some(ImageFormat::Tiff);
        }
        if matches!(bytes.get(4..12), Some(b"ftypavif") | Some(b"ftypavis")) {
            return Some(ImageFormat::Avif);
        }
        if bytes.starts_with(&JXL_CODESTREAM_MAGIC) || bytes.starts_with(&JXL_CONTAINER_MAGIC) {
            return Some(ImageFormat::JpegXl);
        }
        // Two bytes is a weak signature; require the rest of the file header.
        if bytes.starts_with(BMP_MAGIC) && bytes.len() >= 14 && bytes[6..10] == [0, 0, 0, 0] {
            return Some(ImageFormat::Bmp);
        }
        None
    }

    /// Whether an archive member looks like a page image, judged by its
    /// extension. Used to pick page candidates out of an archive listing.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            "bmp" => Some(ImageFormat::Bmp),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "avif" => Some(ImageFormat::Avif),
            "jxl" => Some(ImageFormat::JpegXl),
            _ => None,
        }
    }

    /// MIME type, for consumers that hand covers to a UI or HTTP layer.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Avif => "image/avif",
            ImageFormat::JpegXl => "image/jxl",
        }
    }
}
