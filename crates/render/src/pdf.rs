//! PDF page rasterization.
//!
//! Comic PDFs are almost always one full-page scan per page. When a page's
//! resources hold exactly one image XObject, that image *is* the page: DCT
//! (JPEG) streams pass through untouched and 8-bit RGB/Gray pixel streams
//! are re-encoded as PNG. Anything else (vector art, text, several tiles)
//! is rendered by `pdftoppm`.

use crate::PageImage;
use crate::error::{ErrorKind, Result};
use crate::poppler::Pdftoppm;
use crate::scale;
use comix_format::ImageFormat;
use exn::{OptionExt, ResultExt};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::instrument;

const MAX_TREE_DEPTH: usize = 32;
const PROBE_LEN: usize = 16;

/// Rasterizes PDF pages at one fixed resolution.
///
/// Every page is produced once at `dimension` pixels on its longest side (or
/// its native size, for a smaller embedded scan). Smaller renditions are
/// downsampled from that raster by the caller; a page is never re-rasterized
/// per requested size.
#[derive(Clone, Debug)]
pub struct PdfRasterizer {
    dimension: u32,
    fallback: Option<Pdftoppm>,
}

enum Channels {
    Rgb,
    Gray,
}

enum Scan<'a> {
    Jpeg(&'a Stream),
    Pixels { stream: &'a Stream, width: u32, height: u32, channels: Channels },
}

impl PdfRasterizer {
    /// Use an explicitly configured `pdftoppm`, or discover one on `PATH`.
    /// Without one, only single-scan pages can be rasterized.
    pub fn new(dimension: u32, pdftoppm: Option<PathBuf>) -> Self {
        let fallback = match pdftoppm {
            Some(path) => Some(Pdftoppm::new(path)),
            None => Pdftoppm::discover().ok(),
        };
        Self { dimension, fallback }
    }

    /// A rasterizer that never shells out.
    pub fn embedded_only(dimension: u32) -> Self {
        Self { dimension, fallback: None }
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Rasterize a page (1-based page number).
    #[instrument(skip(self, document, source), fields(source = %source.display()))]
    pub fn rasterize(&self, document: &Document, source: &Path, page: u32) -> Result<PageImage> {
        let page_id = page_id(document, page)?;
        if let Some(scan) = single_scan(document, page_id) {
            let native = scan.encode()?;
            tracing::trace!(width = native.width, height = native.height, "Using embedded page scan");
            return scale::fit(&native, self.dimension);
        }
        let fallback = self.fallback.as_ref().ok_or_raise(|| ErrorKind::RasterizerNotFound)?;
        let bytes = fallback.render(source, page, self.dimension)?;
        PageImage::from_bytes(bytes)
    }

    /// Cheaply decide whether a page can be produced, and in which format,
    /// without decompressing anything.
    ///
    /// Returns `None` for a page whose embedded JPEG has no JPEG signature,
    /// or for a non-scan page when no `pdftoppm` is available.
    pub fn probe(&self, document: &Document, page: u32) -> Option<ImageFormat> {
        let page_id = page_id(document, page).ok()?;
        match single_scan(document, page_id) {
            Some(Scan::Jpeg(stream)) => {
                let head = &stream.content[..stream.content.len().min(PROBE_LEN)];
                ImageFormat::from_magic_bytes(head).filter(|f| *f == ImageFormat::Jpeg)
            },
            Some(Scan::Pixels { .. }) => Some(ImageFormat::Png),
            None => self.fallback.as_ref().map(|_| ImageFormat::Png),
        }
    }
}

impl Scan<'_> {
    fn encode(&self) -> Result<PageImage> {
        match self {
            Scan::Jpeg(stream) => PageImage::from_bytes(stream.content.clone()),
            Scan::Pixels { stream, width, height, channels } => {
                let data = if filters(&stream.dict).is_empty() {
                    stream.content.clone()
                } else {
                    stream.decompressed_content().or_raise(|| ErrorKind::Decode)?
                };
                let image = match channels {
                    Channels::Rgb => RgbImage::from_raw(*width, *height, data).map(DynamicImage::ImageRgb8),
                    Channels::Gray => GrayImage::from_raw(*width, *height, data).map(DynamicImage::ImageLuma8),
                };
                scale::encode_png(&image.ok_or_raise(|| ErrorKind::Decode)?)
            },
        }
    }
}

fn page_id(document: &Document, page: u32) -> Result<ObjectId> {
    document.get_pages().get(&page).copied().ok_or_raise(|| ErrorKind::NoSuchPage(page))
}

/// Resources apply to a page directly or are inherited from the page tree.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return document.dereference(resources).ok()?.1.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn filters(dict: &Dictionary) -> Vec<&[u8]> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items.iter().filter_map(|item| item.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

fn channels(document: &Document, dict: &Dictionary) -> Option<Channels> {
    let (_, space) = document.dereference(dict.get(b"ColorSpace").ok()?).ok()?;
    let components = match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" => 3,
            b"DeviceGray" => 1,
            _ => return None,
        },
        Object::Array(items) if items.first().and_then(|o| o.as_name().ok()) == Some(b"ICCBased".as_slice()) => {
            let (_, profile) = document.dereference(items.get(1)?).ok()?;
            profile.as_stream().ok()?.dict.get(b"N").ok()?.as_i64().ok()?
        },
        _ => return None,
    };
    match components {
        3 => Some(Channels::Rgb),
        1 => Some(Channels::Gray),
        _ => None,
    }
}

/// The page's only image XObject, if it is one we can extract losslessly.
fn single_scan(document: &Document, page_id: ObjectId) -> Option<Scan<'_>> {
    let resources = page_resources(document, page_id)?;
    let (_, xobjects) = document.dereference(resources.get(b"XObject").ok()?).ok()?;
    let mut images = xobjects.as_dict().ok()?.iter().filter_map(|(_, object)| {
        let stream = document.dereference(object).ok()?.1.as_stream().ok()?;
        (stream.dict.get(b"Subtype").and_then(Object::as_name).ok()? == b"Image").then_some(stream)
    });
    let stream = images.next()?;
    if images.next().is_some() {
        return None;
    }
    let dict = &stream.dict;
    match filters(dict).as_slice() {
        [b"DCTDecode"] => Some(Scan::Jpeg(stream)),
        [] | [b"FlateDecode"] => {
            if dict.get(b"DecodeParms").is_ok() || dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok()? != 8 {
                return None;
            }
            let width = u32::try_from(dict.get(b"Width").and_then(Object::as_i64).ok()?).ok()?;
            let height = u32::try_from(dict.get(b"Height").and_then(Object::as_i64).ok()?).ok()?;
            let channels = channels(document, dict)?;
            Some(Scan::Pixels { stream, width, height, channels })
        },
        _ => None,
    }
}
