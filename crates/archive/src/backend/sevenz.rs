//! 7z / CB7 backend.

use crate::backend::{Backend, reserve_for};
use crate::error::{ErrorKind, Result};
use crate::models::{Access, Entry, EntryRef, Listing};
use crate::solid::{ScratchWriter, SolidStore};
use comix_format::Format;
use sevenz_rust::{Archive, BlockDecoder, Password, SevenZReader};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

/// 7z archives with one member per folder (compression block) are read
/// member by member; anything packing several members into one folder is
/// treated as solid and extracted once.
pub struct SevenZipBackend {
    path: PathBuf,
    archive: Archive,
    listing: Listing,
    solid: Option<SolidStore>,
    closed: AtomicBool,
}

impl SevenZipBackend {
    #[instrument(skip(path, scratch), fields(path = %path.display()))]
    pub fn open(path: &Path, scratch: Option<PathBuf>) -> Result<Self> {
        std::fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
        let archive = Archive::open(path).map_err(|e| ErrorKind::Structure(format!("7z archive unreadable: {e}")))?;
        let mut listing = Listing::default();
        let mut streams = 0usize;
        for file in &archive.files {
            if file.is_directory() {
                listing.entries.push(Entry::directory(file.name()));
                continue;
            }
            if file.has_stream {
                streams += 1;
            }
            listing.entries.push(Entry::member(file.name(), file.size()));
        }
        let is_solid = streams > archive.folders.len();
        tracing::debug!(
            entries = listing.entries.len(),
            folders = archive.folders.len(),
            solid = is_solid,
            "Listed 7z archive"
        );
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            listing,
            solid: is_solid.then(|| SolidStore::new(scratch)),
            closed: AtomicBool::new(false),
        })
    }

    /// Decode only the folder holding `name`. A name stored more than once
    /// reads as its last copy, like the listing.
    fn read_member(&self, name: &str) -> Result<Vec<u8>> {
        let target = self
            .archive
            .files
            .iter()
            .rposition(|file| !file.is_directory() && file.name() == name)
            .ok_or_else(|| ErrorKind::EntryNotFound(name.to_string()))?;
        let Some(folder) = self.archive.stream_map.file_folder_index.get(target).copied().flatten() else {
            return Ok(Vec::new());
        };
        let mut file = File::open(&self.path).map_err(|e| ErrorKind::from_io(e, &self.path))?;
        let mut position = self.archive.stream_map.folder_first_file_index.get(folder).copied().unwrap_or_default();
        let mut found = None;
        BlockDecoder::new(folder, &self.archive, Password::empty().as_slice(), &mut file)
            .for_each_entries(&mut |entry, data| {
                let current = position;
                position += 1;
                if current != target {
                    return Ok(true);
                }
                let mut bytes = Vec::with_capacity(reserve_for(entry.size()));
                data.read_to_end(&mut bytes).map_err(sevenz_rust::Error::from)?;
                found = Some(bytes);
                Ok(false)
            })
            .map_err(|e| ErrorKind::EntryRead(format!("{name}: {e}")))?;
        found.ok_or_else(|| exn::Exn::from(ErrorKind::EntryNotFound(name.to_string())))
    }

    fn extract_all(&self, writer: &mut ScratchWriter<'_>) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| ErrorKind::from_io(e, &self.path))?;
        let mut reader = SevenZReader::from_archive(self.archive.clone(), file, Password::empty());
        let mut stored: Result<()> = Ok(());
        let walked = reader.for_each_entries(|entry, data| {
            if entry.is_directory() {
                return Ok(true);
            }
            let mut bytes = Vec::with_capacity(reserve_for(entry.size()));
            data.read_to_end(&mut bytes).map_err(sevenz_rust::Error::from)?;
            stored = writer.write(entry.name(), &bytes);
            Ok(stored.is_ok())
        });
        stored?;
        walked.map_err(|e| ErrorKind::EntryRead(e.to_string()))?;
        Ok(())
    }
}

impl Backend for SevenZipBackend {
    fn format(&self) -> Format {
        Format::SevenZip
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
            Some(store) => store.read(name, |writer| self.extract_all(writer)),
            None => self.read_member(name),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(path = %self.path.display(), "Closed 7z archive");
        }
        if let Some(store) = &self.solid {
            store.close();
        }
    }
}
