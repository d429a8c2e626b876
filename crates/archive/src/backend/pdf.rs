//! PDF backend. Pages stand in for archive members.

use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{DocumentInfo, Entry, EntryRef, Listing};
use comix_format::{Format, ImageFormat};
use comix_render::PdfRasterizer;
use comix_render::error::ErrorKind as RenderErrorKind;
use exn::ResultExt;
use lopdf::{Document, Object};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::instrument;

pub struct PdfBackend {
    path: PathBuf,
    rasterizer: PdfRasterizer,
    listing: Listing,
    info: Option<DocumentInfo>,
    document: RwLock<Option<Document>>,
}

impl PdfBackend {
    #[instrument(skip(path, rasterizer), fields(path = %path.display()))]
    pub fn open(path: &Path, rasterizer: PdfRasterizer) -> Result<Self> {
        std::fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let document =
            Document::load(path).map_err(|e| ErrorKind::Structure(format!("PDF could not be parsed: {e}")))?;
        if document.is_encrypted() {
            exn::bail!(ErrorKind::Structure("PDF is encrypted".to_string()));
        }
        let pages = document.get_pages();
        if pages.is_empty() {
            exn::bail!(ErrorKind::Structure("PDF page tree is empty".to_string()));
        }
        let entries = pages
            .keys()
            .map(|&number| Entry {
                entry_ref: EntryRef::Page(number),
                name: format!("page-{number}"),
                size: 0,
                is_dir: false,
                damage: None,
            })
            .collect();
        let info = document_info(&document);
        tracing::debug!(pages = pages.len(), has_info = info.is_some(), "Opened PDF");
        Ok(Self {
            path: path.to_path_buf(),
            rasterizer,
            listing: Listing { entries, damaged: false },
            info,
            document: RwLock::new(Some(document)),
        })
    }

    fn with_document<T>(&self, f: impl FnOnce(&Document) -> Result<T>) -> Result<T> {
        let document = self.document.read().unwrap_or_else(PoisonError::into_inner);
        match document.as_ref() {
            Some(document) => f(document),
            None => exn::bail!(ErrorKind::Closed),
        }
    }

    fn page_number(entry: &EntryRef) -> Result<u32> {
        match entry {
            EntryRef::Page(number) => Ok(*number),
            EntryRef::Member(_) => exn::bail!(ErrorKind::EntryNotFound(entry.to_string())),
        }
    }
}

impl Backend for PdfBackend {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn list_entries(&self) -> Result<Listing> {
        Ok(self.listing.clone())
    }

    /// Produces the page raster, encoded. Embedded scans pass through
    /// unchanged when they fit the rasterizer's resolution.
    #[instrument(skip(self), fields(path = %self.path.display(), entry = %entry))]
    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>> {
        let number = Self::page_number(entry)?;
        self.with_document(|document| match self.rasterizer.rasterize(document, &self.path, number) {
            Ok(image) => Ok(image.bytes.to_vec()),
            Err(e) if matches!(&*e, RenderErrorKind::NoSuchPage(_)) => {
                exn::bail!(ErrorKind::EntryNotFound(entry.to_string()))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::EntryRead(entry.to_string())),
        })
    }

    fn probe(&self, entry: &EntryRef) -> Result<Option<ImageFormat>> {
        let number = Self::page_number(entry)?;
        self.with_document(|document| Ok(self.rasterizer.probe(document, number)))
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        self.info.clone()
    }

    fn close(&self) {
        let mut document = self.document.write().unwrap_or_else(PoisonError::into_inner);
        if document.take().is_some() {
            tracing::trace!(path = %self.path.display(), "Closed PDF");
        }
    }
}

/// The trailer's `Info` dictionary, text values only.
fn document_info(document: &Document) -> Option<DocumentInfo> {
    let info = document.trailer.get(b"Info").ok()?;
    let (_, info) = document.dereference(info).ok()?;
    let info = info.as_dict().ok()?;
    let mut out = DocumentInfo::new();
    for (key, value) in info.iter() {
        let Ok((_, Object::String(bytes, _))) = document.dereference(value) else {
            continue;
        };
        let text = decode_text(bytes);
        let text = text.trim();
        if !text.is_empty() {
            out.insert(String::from_utf8_lossy(key).into_owned(), text.to_string());
        }
    }
    (!out.is_empty()).then_some(out)
}

/// PDF text strings are UTF-16BE with a byte-order mark, or a single-byte
/// encoding that agrees with Latin-1 on every printable character.
fn decode_text(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
            String::from_utf16_lossy(&units)
        },
        None => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::collections::BTreeMap;

    fn write(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("comic.pdf");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn pages_are_entries() {
        let dir = tempfile::tempdir().unwrap();
        let first = fixtures::jpeg(16, 24, 10);
        let second = fixtures::jpeg(16, 24, 90);
        let info = BTreeMap::from([("Title", "Saga"), ("Author", "Brian K. Vaughan; Fiona Staples")]);
        let path = write(&dir, &fixtures::pdf(&[(16, 24, first.clone()), (16, 24, second)], &info));
        let backend = PdfBackend::open(&path, PdfRasterizer::embedded_only(2400)).unwrap();

        let listing = backend.list_entries().unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["page-1", "page-2"]);
        assert_eq!(backend.probe(&EntryRef::Page(1)).unwrap(), Some(ImageFormat::Jpeg));
        assert_eq!(backend.read_entry(&EntryRef::Page(1)).unwrap(), first);

        let info = backend.document_info().unwrap();
        assert_eq!(info.get("Title").map(String::as_str), Some("Saga"));
        assert_eq!(info.get("Author").map(String::as_str), Some("Brian K. Vaughan; Fiona Staples"));
    }

    #[test]
    fn unknown_page_is_entry_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &fixtures::pdf(&[(8, 8, fixtures::jpeg(8, 8, 1))], &BTreeMap::new()));
        let backend = PdfBackend::open(&path, PdfRasterizer::embedded_only(2400)).unwrap();
        let err = backend.read_entry(&EntryRef::Page(7)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryNotFound(_)));
        assert!(backend.document_info().is_none());
    }

    #[test]
    fn empty_page_tree_is_structural_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &fixtures::pdf(&[], &BTreeMap::new()));
        let err = PdfBackend::open(&path, PdfRasterizer::embedded_only(2400)).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Structure(_)));
    }

    #[test]
    fn garbage_is_structural_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, b"%PDF-1.7\nthis is not a PDF body");
        let err = PdfBackend::open(&path, PdfRasterizer::embedded_only(2400)).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Structure(_)));
    }

    #[test]
    fn utf16_text_strings() {
        assert_eq!(decode_text(b"\xFE\xFF\x00S\x00a\x00g\x00a"), "Saga");
        assert_eq!(decode_text(b"Caf\xE9"), "Café");
    }
}
