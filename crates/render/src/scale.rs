//! Downsampling and thumbnails.
//!
//! Images are only ever made smaller. Requests at or above an image's native
//! size return the original bytes untouched.

use crate::PageImage;
use crate::error::{ErrorKind, Result};
use comix_format::ImageFormat;
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat as Codec};
use std::io::Cursor;
use tracing::instrument;

/// JPEG quality used for cover thumbnails.
pub const THUMBNAIL_QUALITY: u8 = 85;
/// JPEG quality used when downsampling a JPEG page for display.
pub const PAGE_QUALITY: u8 = 90;

/// Fully decode an image. Header-only checks miss truncated scans; this
/// doesn't.
pub fn decode(image: &PageImage) -> Result<DynamicImage> {
    image::load_from_memory(&image.bytes).or_raise(|| ErrorKind::Decode)
}

/// Scale `image` so its longest side is at most `max_dimension`, keeping the
/// aspect ratio.
///
/// JPEG sources stay JPEG; everything else is re-encoded as PNG so that
/// transparency and palette art survive.
#[instrument(skip(image), fields(width = image.width, height = image.height))]
pub fn fit(image: &PageImage, max_dimension: u32) -> Result<PageImage> {
    if image.longest_side() <= max_dimension {
        return Ok(image.clone());
    }
    let resized = decode(image)?.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    match image.format {
        ImageFormat::Jpeg => encode_jpeg(&resized, PAGE_QUALITY),
        _ => encode_png(&resized),
    }
}

/// Produce a cover thumbnail: a JPEG no larger than `max_dimension` on its
/// longest side.
///
/// The source is always fully decoded, so a page that only *looks* like an
/// image (valid header, corrupt body) fails here rather than in a consumer.
#[instrument(skip(image), fields(width = image.width, height = image.height))]
pub fn thumbnail(image: &PageImage, max_dimension: u32) -> Result<PageImage> {
    let decoded = decode(image)?;
    let decoded = if image.longest_side() > max_dimension {
        decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };
    encode_jpeg(&decoded, THUMBNAIL_QUALITY)
}

pub(crate) fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<PageImage> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb).or_raise(|| ErrorKind::Encode)?;
    Ok(PageImage {
        bytes: out.into(),
        width: rgb.width(),
        height: rgb.height(),
        format: ImageFormat::Jpeg,
    })
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<PageImage> {
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), Codec::Png).or_raise(|| ErrorKind::Encode)?;
    Ok(PageImage {
        bytes: out.into(),
        width: image.width(),
        height: image.height(),
        format: ImageFormat::Png,
    })
}
