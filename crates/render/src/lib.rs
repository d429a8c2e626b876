//! Image operations for comic pages.
//!
//! - [`PageImage`]: encoded page bytes plus dimensions and format, the unit
//!   handed to callers and stored in the extraction cache
//! - [`scale`]: downsampling to a maximum dimension and cover thumbnails
//! - [`PdfRasterizer`]: turns a PDF page into a [`PageImage`], preferring the
//!   page's embedded scan and falling back to poppler's `pdftoppm`

pub mod error;
mod pdf;
mod poppler;
pub mod scale;

pub use crate::pdf::PdfRasterizer;
use crate::error::{ErrorKind, Result};
use comix_format::ImageFormat;
use exn::{OptionExt, ResultExt};
use std::io::Cursor;
use std::sync::Arc;

/// An encoded page (or cover) image.
///
/// The bytes are shared: cloning a `PageImage` never copies pixel data, so a
/// cached image stays valid for every reader holding it even after the cache
/// evicts its own reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl PageImage {
    /// Wrap encoded image bytes, reading the format from the signature and
    /// the dimensions from the image header. Pixel data is not decoded.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes = bytes.into();
        let format = ImageFormat::from_magic_bytes(&bytes).ok_or_raise(|| ErrorKind::Decode)?;
        let (width, height) = image::ImageReader::new(Cursor::new(&*bytes))
            .with_guessed_format()
            .or_raise(|| ErrorKind::Io)?
            .into_dimensions()
            .or_raise(|| ErrorKind::Decode)?;
        Ok(Self { bytes, width, height, format })
    }

    /// Size of the encoded image in bytes; the cost charged against the
    /// cache budget.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the longer side, in pixels.
    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Whether pages in `format` can be decoded and scaled. AVIF and JPEG XL
/// are recognised by their signature but have no decoder here.
pub fn is_decodable(format: ImageFormat) -> bool {
    !matches!(format, ImageFormat::Avif | ImageFormat::JpegXl)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    pub(crate) fn encoded(width: u32, height: u32, codec: image::ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 90])));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), codec).unwrap();
        out
    }

    #[test]
    fn from_bytes_reads_header_only() {
        let image = PageImage::from_bytes(encoded(64, 32, image::ImageFormat::Png)).unwrap();
        assert_eq!((image.width, image.height), (64, 32));
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(image.longest_side(), 64);
    }

    #[test]
    fn decodable_formats() {
        assert!(is_decodable(ImageFormat::Webp));
        assert!(!is_decodable(ImageFormat::JpegXl));
        assert!(!is_decodable(ImageFormat::Avif));
    }

    #[test]
    fn from_bytes_rejects_non_images() {
        let err = PageImage::from_bytes(b"<ComicInfo/>".to_vec()).unwrap_err();
        assert_eq!(*err, ErrorKind::Decode);
    }
}
