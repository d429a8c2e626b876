//! In-memory container backend for testing.

use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{Access, DocumentInfo, Entry, EntryRef, Listing};
use crate::solid::SolidStore;
use comix_format::Format;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory container backend for testing.
///
/// Entries keep the order they were given in, like a real archive's stored
/// order. Read counters let tests assert on how often the engine actually
/// touched the container.
///
/// # Examples
///
/// ```
/// use comix_archive::backend::MockBackend;
/// use comix_archive::{Backend, EntryRef};
///
/// let backend = MockBackend::with_entries([
///     ("002.png", b"second".to_vec()),
///     ("001.png", b"first".to_vec()),
/// ])
/// .with_broken("002.png");
/// assert!(backend.read_entry(&EntryRef::Member("002.png".into())).is_err());
/// assert_eq!(backend.reads(), 1);
/// ```
pub struct MockBackend {
    format: Format,
    entries: Vec<(String, Vec<u8>)>,
    broken: HashSet<String>,
    damaged_listing: bool,
    info: Option<DocumentInfo>,
    solid: Option<SolidStore>,
    delay: Option<Duration>,
    reads: AtomicUsize,
    head_reads: AtomicUsize,
    closed: AtomicBool,
}

impl MockBackend {
    /// Create a ZIP-flavoured mock with the given members. Names ending in
    /// `/` are listed as directories.
    pub fn with_entries(entries: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        Self {
            format: Format::Zip,
            entries: entries.into_iter().map(|(name, data)| (name.into(), data.into())).collect(),
            broken: HashSet::new(),
            damaged_listing: false,
            info: None,
            solid: None,
            delay: None,
            reads: AtomicUsize::new(0),
            head_reads: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Reads of this member fail. In a solid mock, extraction stops there,
    /// so every later member fails too.
    pub fn with_broken(mut self, name: impl Into<String>) -> Self {
        self.broken.insert(name.into());
        self
    }

    /// Report the listing as having been rebuilt or cut short.
    pub fn with_damaged_listing(mut self) -> Self {
        self.damaged_listing = true;
        self
    }

    pub fn with_document_info(mut self, info: DocumentInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Sleep this long in every full read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Behave like a solid archive: one extraction pass serves every read.
    pub fn solid(mut self) -> Self {
        self.solid = Some(SolidStore::new(None));
        self
    }

    /// Number of full entry reads requested.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }

    /// Number of head-only reads requested.
    pub fn head_reads(&self) -> usize {
        self.head_reads.load(Ordering::Acquire)
    }

    /// Extraction passes run (solid mocks only).
    pub fn extractions(&self) -> usize {
        self.solid.as_ref().map_or(0, SolidStore::extractions)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn data(&self, name: &str) -> Result<&[u8]> {
        if self.broken.contains(name) {
            exn::bail!(ErrorKind::EntryRead(format!("{name}: mock damage")));
        }
        match self.entries.iter().rev().find(|(n, _)| n == name) {
            Some((_, data)) => Ok(data),
            None => exn::bail!(ErrorKind::EntryNotFound(name.to_string())),
        }
    }

    fn member_name(entry: &EntryRef) -> Result<&str> {
        match entry {
            EntryRef::Member(name) => Ok(name),
            EntryRef::Page(_) => exn::bail!(ErrorKind::EntryNotFound(entry.to_string())),
        }
    }
}

impl Backend for MockBackend {
    fn format(&self) -> Format {
        self.format
    }

    fn access(&self) -> Access {
        if self.solid.is_some() { Access::Solid } else { Access::Random }
    }

    fn list_entries(&self) -> Result<Listing> {
        let entries = self
            .entries
            .iter()
            .map(|(name, data)| {
                if name.ends_with('/') {
                    Entry::directory(name.as_str())
                } else {
                    Entry::member(name.as_str(), data.len() as u64)
                }
            })
            .collect();
        Ok(Listing { entries, damaged: self.damaged_listing })
    }

    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        if self.is_closed() {
            exn::bail!(ErrorKind::Closed);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let name = Self::member_name(entry)?;
        match &self.solid {
            Some(store) => store.read(name, |writer| {
                for (member, _) in self.entries.iter().filter(|(n, _)| !n.ends_with('/')) {
                    writer.write(member, self.data(member)?)?;
                }
                Ok(())
            }),
            None => Ok(self.data(name)?.to_vec()),
        }
    }

    fn read_entry_head(&self, entry: &EntryRef, len: usize) -> Result<Vec<u8>> {
        self.head_reads.fetch_add(1, Ordering::AcqRel);
        if self.is_closed() {
            exn::bail!(ErrorKind::Closed);
        }
        let data = self.data(Self::member_name(entry)?)?;
        Ok(data[..data.len().min(len)].to_vec())
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        self.info.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(store) = &self.solid {
            store.close();
        }
    }
}
