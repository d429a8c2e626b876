//! Container backend trait and implementations.
//!
//! Backends are blocking: they do file I/O and decompression directly and
//! are meant to be driven from a blocking thread pool (the engine uses
//! `tokio::task::spawn_blocking`). All methods take `&self` and must be safe
//! to call concurrently for distinct entries.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod pdf;
mod rar;
mod recover;
mod sevenz;
mod tar;
mod zip;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::pdf::PdfBackend;
pub use self::rar::RarBackend;
pub use self::sevenz::SevenZipBackend;
pub use self::tar::TarBackend;
pub use self::zip::ZipBackend;
use crate::error::Result;
use crate::models::{Access, DocumentInfo, EntryRef, Listing};
use comix_format::{Format, ImageFormat};

/// Bytes read from an entry to recognise its image signature.
pub const PROBE_LEN: usize = 16;

/// Largest buffer reserved up front from a size the archive declares.
/// Reads past it grow the buffer as data actually arrives.
const RESERVE_CAP: u64 = 64 << 20;

/// Initial capacity for a member that claims to be `declared` bytes long.
pub(crate) fn reserve_for(declared: u64) -> usize {
    declared.min(RESERVE_CAP) as usize
}

/// Unified interface for comic containers.
///
/// # Lifecycle
///
/// A backend is created by [`open`](crate::open), which performs the
/// structural scan. [`close`](Self::close) releases every file handle,
/// decoder and scratch directory the backend holds; it is idempotent, and
/// any read after it fails with [`Closed`](crate::error::ErrorKind::Closed).
/// Dropping a backend releases the same resources.
///
/// # Examples
///
/// ```no_run
/// use comix_archive::{Backend, EntryRef};
/// # use comix_archive::error::Result;
/// # fn example(backend: &dyn Backend) -> Result<()> {
/// let listing = backend.list_entries()?;
/// for entry in listing.entries.iter().filter(|e| !e.is_dir) {
///     let head = backend.read_entry_head(&entry.entry_ref, 16)?;
///     println!("{}: starts with {:02x?}", entry.name, head);
/// }
/// # Ok(())
/// # }
/// ```
pub trait Backend: Send + Sync {
    fn format(&self) -> Format;

    /// Whether members can be read independently. Decided once, when the
    /// backend is opened.
    fn access(&self) -> Access {
        Access::Random
    }

    /// The container's structural index, in stored order. Never decodes
    /// image data.
    fn list_entries(&self) -> Result<Listing>;

    /// Read one entry in full.
    ///
    /// Failures are local to the entry:
    /// [`EntryRead`](crate::error::ErrorKind::EntryRead) for damaged data,
    /// [`EntryNotFound`](crate::error::ErrorKind::EntryNotFound) for an
    /// unknown reference.
    fn read_entry(&self, entry: &EntryRef) -> Result<Vec<u8>>;

    /// Read at most `len` leading bytes of an entry.
    ///
    /// The default reads the whole entry; backends with cheap partial reads
    /// override it.
    fn read_entry_head(&self, entry: &EntryRef, len: usize) -> Result<Vec<u8>> {
        let mut bytes = self.read_entry(entry)?;
        bytes.truncate(len);
        Ok(bytes)
    }

    /// Recognise the image format of an entry from its leading bytes.
    /// `Ok(None)` means the entry is readable but isn't an image we know.
    fn probe(&self, entry: &EntryRef) -> Result<Option<ImageFormat>> {
        Ok(ImageFormat::from_magic_bytes(&self.read_entry_head(entry, PROBE_LEN)?))
    }

    /// Document-level metadata carried by the container format itself
    /// (only PDF has any).
    fn document_info(&self) -> Option<DocumentInfo> {
        None
    }

    /// Release every resource held by the backend. Idempotent.
    fn close(&self);
}
