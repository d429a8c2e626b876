//! TAR / CBT backend.
//!
//! TAR has no index: the listing is one linear pass over the headers,
//! remembering where each member's data starts. Reads then seek straight to
//! that offset.

use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{Entry, EntryRef, Listing};
use comix_format::Format;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tar::{Archive, EntryType};
use tracing::instrument;

#[derive(Clone, Copy, Debug)]
struct Span {
    offset: u64,
    size: u64,
}

pub struct TarBackend {
    path: PathBuf,
    listing: Listing,
    /// Later members with the same name shadow earlier ones, as `tar -x`
    /// would leave them on disk.
    spans: HashMap<String, Span>,
    file: Mutex<Option<File>>,
}

impl TarBackend {
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let file_len = file.metadata().map_err(ErrorKind::Io)?.len();
        let mut listing = Listing::default();
        let mut spans = HashMap::new();
        let mut archive = Archive::new(file.try_clone().map_err(ErrorKind::Io)?);
        let entries = archive
            .entries_with_seek()
            .map_err(|e| ErrorKind::Structure(format!("TAR header chain unreadable: {e}")))?;
        for (i, entry) in entries.enumerate() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if i == 0 => exn::bail!(ErrorKind::Structure(format!("TAR header chain unreadable: {e}"))),
                Err(e) => {
                    tracing::warn!(listed = listing.entries.len(), error = %e, "TAR header chain ends early");
                    listing.damaged = true;
                    break;
                },
            };
            let name = match entry.path() {
                Ok(name) => name.to_string_lossy().into_owned(),
                Err(e) => {
                    tracing::warn!(index = i, error = %e, "Skipping TAR member with undecodable name");
                    continue;
                },
            };
            match entry.header().entry_type() {
                EntryType::Directory => listing.entries.push(Entry::directory(name)),
                EntryType::Regular | EntryType::Continuous => {
                    let span = Span {
                        offset: entry.raw_file_position(),
                        size: entry.size(),
                    };
                    let mut listed = Entry::member(name.clone(), span.size);
                    if span.offset.saturating_add(span.size) > file_len {
                        listed = listed.with_damage("member data extends past end of file");
                        listing.damaged = true;
                    }
                    spans.insert(name, span);
                    listing.entries.push(listed);
                },
                // Links, devices and extension headers have no page data.
                _ => {},
            }
        }
        tracing::debug!(entries = listing.entries.len(), damaged = listing.damaged, "Listed TAR archive");
        Ok(Self {
            path: path.to_path_buf(),
            listing,
            spans,
            file: Mutex::new(Some(file)),
        })
    }

    fn read_span(&self, entry: &EntryRef, limit: Option<usize>) -> Result<Vec<u8>> {
        let EntryRef::Member(name) = entry else {
            exn::bail!(ErrorKind::EntryNotFound(entry.to_string()));
        };
        let span = *self.spans.get(name).ok_or_else(|| ErrorKind::EntryNotFound(name.clone()))?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = file.as_mut() else {
            exn::bail!(ErrorKind::Closed);
        };
        let len = match limit {
            Some(limit) => span.size.min(limit as u64),
            None => span.size,
        };
        file.seek(SeekFrom::Start(span.offset)).map_err(ErrorKind::Io)?;
        let mut data = vec![0u8; len as usize];
        if let Err(e) = file.read_exact(&mut data) {
            tracing::debug!(entry = %name, error = %e, "TAR member data is short");
            exn::bail!(ErrorKind::EntryRead(format!("{name}: {e}")));
        }
        Ok(data)
    }
}

impl Backend for TarBackend {
    fn format(&self) -> Format {
        Format::Tar
    }

    fn list_entries(&self) -> Result<Listing> {
        Ok(self.listing.clone())
    }

    #[instrument(skip(self), fields(path = %self.path.display(), entry = %entry))]
    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>> {
        self.read_span(entry, None)
    }

    fn read_entry_head(&self, entry: &EntryRef, len: usize) -> Result<Vec<u8>> {
        self.read_span(entry, Some(len))
    }

    fn close(&self) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if file.take().is_some() {
            tracing::trace!(path = %self.path.display(), "Closed TAR archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use comix_format::ImageFormat;

    fn write(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("comic.cbt");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn lists_and_reads_members() {
        let dir = tempfile::tempdir().unwrap();
        let page = fixtures::jpeg(8, 8, 40);
        let path = write(&dir, &fixtures::tar(&[("001.jpg", page.as_slice()), ("notes.txt", b"hello".as_slice())]));
        let backend = TarBackend::open(&path).unwrap();
        let listing = backend.list_entries().unwrap();
        assert!(!listing.damaged);
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["001.jpg", "notes.txt"]);
        let entry = EntryRef::Member("001.jpg".to_string());
        assert_eq!(backend.read_entry(&entry).unwrap(), page);
        assert_eq!(backend.read_entry_head(&entry, 3).unwrap(), page[..3]);
        assert_eq!(backend.probe(&entry).unwrap(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn truncated_member_is_damaged() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = fixtures::tar(&[("001.png", [1u8; 600].as_slice()), ("002.png", [2u8; 4000].as_slice())]);
        // Keep the second header and half its data.
        bytes.truncate(512 + 1024 + 512 + 2000);
        let path = write(&dir, &bytes);
        let backend = TarBackend::open(&path).unwrap();
        let listing = backend.list_entries().unwrap();
        assert!(listing.damaged);
        assert!(listing.entries[0].damage.is_none());
        assert!(listing.entries[1].damage.is_some());
        assert_eq!(backend.read_entry(&EntryRef::Member("001.png".to_string())).unwrap(), [1u8; 600]);
        let err = backend.read_entry(&EntryRef::Member("002.png".to_string())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryRead(_)));
    }

    #[test]
    fn later_duplicate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &fixtures::tar(&[("001.png", b"old".as_slice()), ("001.png", b"new".as_slice())]));
        let backend = TarBackend::open(&path).unwrap();
        assert_eq!(backend.read_entry(&EntryRef::Member("001.png".to_string())).unwrap(), b"new");
    }

    #[test]
    fn reads_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &fixtures::tar(&[("001.png", b"data".as_slice())]));
        let backend = TarBackend::open(&path).unwrap();
        backend.close();
        let err = backend.read_entry(&EntryRef::Member("001.png".to_string())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Closed));
    }
}
