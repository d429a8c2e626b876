//! ZIP / CBZ backend.

use super::recover::{self, LocalMember};
use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{Entry, EntryRef, Listing};
use comix_format::{Format, PeekableReader};
use exn::ResultExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::instrument;
use zip::ZipArchive;

enum Index {
    /// The central directory was readable.
    Directory(ZipArchive<BufReader<File>>),
    /// Rebuilt from local headers.
    Recovered { file: File, members: HashMap<String, LocalMember> },
}

/// Reads ZIP archives through their central directory, falling back to a
/// local-header scan when the directory is missing or corrupt.
pub struct ZipBackend {
    path: PathBuf,
    listing: Listing,
    index: Mutex<Option<Index>>,
}

impl ZipBackend {
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
        match ZipArchive::new(BufReader::new(file)) {
            Ok(mut archive) => {
                let listing = Self::list_directory(&mut archive);
                Ok(Self {
                    path: path.to_path_buf(),
                    listing,
                    index: Mutex::new(Some(Index::Directory(archive))),
                })
            },
            Err(e) => {
                tracing::warn!(error = %e, "ZIP central directory unreadable; scanning local headers");
                Self::recover(path)
            },
        }
    }

    fn list_directory(archive: &mut ZipArchive<BufReader<File>>) -> Listing {
        let mut listing = Listing::default();
        for i in 0..archive.len() {
            match archive.by_index_raw(i) {
                Ok(member) => {
                    let entry = if member.is_dir() {
                        Entry::directory(member.name())
                    } else {
                        Entry::member(member.name(), member.size())
                    };
                    let entry = if member.encrypted() { entry.with_damage("encrypted") } else { entry };
                    listing.entries.push(entry);
                },
                Err(e) => {
                    tracing::warn!(index = i, error = %e, "Skipping unreadable central directory record");
                    listing.damaged = true;
                },
            }
        }
        listing
    }

    fn recover(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let members = recover::scan(&data);
        if members.is_empty() {
            exn::bail!(ErrorKind::Structure("no central directory and no local file headers".to_string()));
        }
        tracing::info!(members = members.len(), "Recovered ZIP index from local headers");
        let listing = Listing {
            entries: members.iter().map(LocalMember::entry).collect(),
            damaged: true,
        };
        let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let members = members.into_iter().map(|m| (m.name.clone(), m)).collect();
        Ok(Self {
            path: path.to_path_buf(),
            listing,
            index: Mutex::new(Some(Index::Recovered { file, members })),
        })
    }

    fn with_index<T>(&self, f: impl FnOnce(&mut Index) -> Result<T>) -> Result<T> {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        match index.as_mut() {
            Some(index) => f(index),
            None => exn::bail!(ErrorKind::Closed),
        }
    }

    fn member_name(entry: &EntryRef) -> Result<&str> {
        match entry {
            EntryRef::Member(name) => Ok(name),
            EntryRef::Page(_) => exn::bail!(ErrorKind::EntryNotFound(entry.to_string())),
        }
    }
}

impl Backend for ZipBackend {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn list_entries(&self) -> Result<Listing> {
        Ok(self.listing.clone())
    }

    #[instrument(skip(self), fields(path = %self.path.display(), entry = %entry))]
    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>> {
        let name = Self::member_name(entry)?;
        self.with_index(|index| match index {
            Index::Directory(archive) => {
                let mut member = archive.by_name(name).or_raise(|| ErrorKind::EntryNotFound(name.to_string()))?;
                let mut data = Vec::with_capacity(super::reserve_for(member.size()));
                // CRC-32 is checked once the member has been read to the end.
                member.read_to_end(&mut data).or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
                Ok(data)
            },
            Index::Recovered { file, members } => {
                let member = members.get(name).ok_or_else(|| ErrorKind::EntryNotFound(name.to_string()))?;
                member.read(file)
            },
        })
    }

    fn read_entry_head(&self, entry: &EntryRef, len: usize) -> Result<Vec<u8>> {
        let name = Self::member_name(entry)?;
        let recovered = self.with_index(|index| match index {
            Index::Directory(archive) => {
                let member = archive.by_name(name).or_raise(|| ErrorKind::EntryNotFound(name.to_string()))?;
                let mut peekable = PeekableReader::new(member);
                let head = peekable.peek(len).or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
                Ok(Some(head.to_vec()))
            },
            Index::Recovered { .. } => Ok(None),
        })?;
        match recovered {
            Some(head) => Ok(head),
            None => {
                let mut data = self.read_entry(entry)?;
                data.truncate(len);
                Ok(data)
            },
        }
    }

    fn close(&self) {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if index.take().is_some() {
            tracing::trace!(path = %self.path.display(), "Closed ZIP archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use comix_format::ImageFormat;

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn lists_and_reads_members() {
        let dir = tempfile::tempdir().unwrap();
        let page = fixtures::png(8, 8, 10);
        let path = write(&dir, "comic.cbz", &fixtures::zip(&[("pages/", b"".as_slice()), ("pages/001.png", page.as_slice())]));
        let backend = ZipBackend::open(&path).unwrap();
        let listing = backend.list_entries().unwrap();
        assert!(!listing.damaged);
        assert_eq!(listing.entries.len(), 2);
        assert!(listing.entries[0].is_dir);
        let entry = EntryRef::Member("pages/001.png".to_string());
        assert_eq!(backend.read_entry(&entry).unwrap(), page);
        assert_eq!(backend.probe(&entry).unwrap(), Some(ImageFormat::Png));
    }

    #[test]
    fn recovers_from_zeroed_central_directory() {
        let dir = tempfile::tempdir().unwrap();
        let page = fixtures::png(8, 8, 10);
        let mut bytes = fixtures::zip(&[("001.png", page.as_slice()), ("002.png", page.as_slice())]);
        let directory = memchr::memmem::find(&bytes, b"PK\x01\x02").unwrap();
        bytes[directory..].fill(0);
        let path = write(&dir, "comic.cbz", &bytes);
        let backend = ZipBackend::open(&path).unwrap();
        let listing = backend.list_entries().unwrap();
        assert!(listing.damaged);
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(backend.read_entry(&EntryRef::Member("002.png".to_string())).unwrap(), page);
    }

    #[test]
    fn garbage_is_structural_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "comic.cbz", &[0u8; 4096]);
        let err = ZipBackend::open(&path).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Structure(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "comic.cbz", &fixtures::zip(&[("001.png", fixtures::png(4, 4, 1).as_slice())]));
        let backend = ZipBackend::open(&path).unwrap();
        backend.close();
        backend.close();
        let err = backend.read_entry(&EntryRef::Member("001.png".to_string())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Closed));
    }
}
