//! RAR / CBR backend, through the `unrar` library bindings.
//!
//! Non-solid archives are read member by member, walking the header chain
//! and skipping (without decompressing) everything before the wanted one.
//! Solid archives are extracted once into a [`SolidStore`].

use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{Access, Entry, EntryRef, Listing};
use crate::solid::{ScratchWriter, SolidStore};
use comix_format::Format;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;
use unrar::Archive;

pub struct RarBackend {
    path: PathBuf,
    listing: Listing,
    solid: Option<SolidStore>,
    closed: AtomicBool,
}

impl RarBackend {
    #[instrument(skip(path, scratch), fields(path = %path.display()))]
    pub fn open(path: &Path, scratch: Option<PathBuf>) -> Result<Self> {
        std::fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let archive = Archive::new(path)
            .open_for_listing()
            .map_err(|e| ErrorKind::Structure(format!("RAR archive unreadable: {e}")))?;
        let is_solid = archive.is_solid();
        let mut listing = Listing::default();
        for header in archive {
            let header = match header {
                Ok(header) => header,
                Err(e) if listing.entries.is_empty() => {
                    exn::bail!(ErrorKind::Structure(format!("RAR header chain unreadable: {e}")))
                },
                Err(e) => {
                    tracing::warn!(listed = listing.entries.len(), error = %e, "RAR header chain ends early");
                    listing.damaged = true;
                    break;
                },
            };
            let name = header.filename.to_string_lossy().into_owned();
            let entry = if header.is_directory() {
                Entry::directory(name)
            } else {
                Entry::member(name, header.unpacked_size)
            };
            let entry = if header.is_encrypted() { entry.with_damage("encrypted") } else { entry };
            listing.entries.push(entry);
        }
        tracing::debug!(entries = listing.entries.len(), solid = is_solid, "Listed RAR archive");
        Ok(Self {
            path: path.to_path_buf(),
            listing,
            solid: is_solid.then(|| SolidStore::new(scratch)),
            closed: AtomicBool::new(false),
        })
    }

    /// Walk the header chain to `name` and decompress only that member.
    /// A name stored more than once reads as its last copy, like the listing.
    fn read_member(&self, name: &str) -> Result<Vec<u8>> {
        let copies = self.listing.entries.iter().filter(|entry| !entry.is_dir && entry.name == name).count();
        let mut seen = 0;
        let mut archive = Archive::new(&self.path)
            .open_for_processing()
            .or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
        loop {
            let header = archive.read_header().or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
            let Some(header) = header else {
                exn::bail!(ErrorKind::EntryNotFound(name.to_string()));
            };
            let entry = header.entry();
            let matches = !entry.is_directory() && entry.filename.to_string_lossy() == name;
            if matches {
                seen += 1;
            }
            if matches && seen >= copies {
                if entry.is_encrypted() {
                    exn::bail!(ErrorKind::Unsupported(format!("{name}: encrypted")));
                }
                let (data, _rest) = header.read().or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
                return Ok(data);
            }
            archive = header.skip().or_raise(|| ErrorKind::EntryRead(name.to_string()))?;
        }
    }

    /// Decompress the whole solid stream, storing every member.
    fn extract_all(path: &Path, writer: &mut ScratchWriter<'_>) -> Result<()> {
        let mut archive = Archive::new(path)
            .open_for_processing()
            .map_err(|e| ErrorKind::Structure(format!("RAR archive unreadable: {e}")))?;
        while let Some(header) = archive.read_header().map_err(|e| ErrorKind::EntryRead(e.to_string()))? {
            let entry = header.entry();
            if entry.is_directory() || entry.is_encrypted() {
                archive = header.skip().map_err(|e| ErrorKind::EntryRead(e.to_string()))?;
                continue;
            }
            let name = entry.filename.to_string_lossy().into_owned();
            let (data, rest) = header.read().or_raise(|| ErrorKind::EntryRead(name.clone()))?;
            writer.write(&name, &data)?;
            archive = rest;
        }
        Ok(())
    }
}

impl Backend for RarBackend {
    fn format(&self) -> Format {
        Format::Rar
    }

    fn access(&self) -> Access {
        if self.solid.is_some() { Access::Solid } else { Access::Random }
    }

    fn list_entries(&self) -> Result<Listing> {
        Ok(self.listing.clone())
    }

    #[instrument(skip(self), fields(path = %self.path.display(), entry = %entry))]
    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>> {
        let EntryRef::Member(name) = entry else {
            exn::bail!(ErrorKind::EntryNotFound(entry.to_string()));
        };
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        match &self.solid {
            Some(store) => store.read(name, |writer| Self::extract_all(&self.path, writer)),
            None => self.read_member(name),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(path = %self.path.display(), "Closed RAR archive");
        }
        if let Some(store) = &self.solid {
            store.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = RarBackend::open(&dir.path().join("missing.cbr"), None).err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn garbage_is_structural_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comic.cbr");
        let mut bytes = b"Rar!\x1a\x07\x01\x00".to_vec();
        bytes.extend_from_slice(&[0xAA; 256]);
        std::fs::write(&path, bytes).unwrap();
        let err = RarBackend::open(&path, None).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Structure(_)));
    }

    fn write(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("comic.cbr");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn duplicate_names_read_the_last_copy() {
        let dir = tempfile::tempdir().unwrap();
        let members: [(&str, &[u8]); 3] = [("01.png", b"stale"), ("02.png", b"other"), ("01.png", b"fresh")];
        let path = write(&dir, &fixtures::rar(&members, false));
        let backend = RarBackend::open(&path, None).unwrap();
        assert_eq!(backend.access(), Access::Random);
        assert_eq!(backend.list_entries().unwrap().entries.len(), 3);
        assert_eq!(backend.read_entry(&EntryRef::Member("01.png".into())).unwrap(), b"fresh");
        assert_eq!(backend.read_entry(&EntryRef::Member("02.png".into())).unwrap(), b"other");
    }

    #[test]
    fn solid_archives_extract_once() {
        let dir = tempfile::tempdir().unwrap();
        let members: [(&str, &[u8]); 2] = [("01.png", b"one"), ("02.png", b"two")];
        let path = write(&dir, &fixtures::rar(&members, true));
        let backend = RarBackend::open(&path, None).unwrap();
        assert_eq!(backend.access(), Access::Solid);
        assert_eq!(backend.read_entry(&EntryRef::Member("02.png".into())).unwrap(), b"two");
        assert_eq!(backend.read_entry(&EntryRef::Member("01.png".into())).unwrap(), b"one");
        assert_eq!(backend.solid.as_ref().unwrap().extractions(), 1);
    }
}
