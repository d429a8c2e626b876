//! Read-only access to comic containers.
//!
//! Every supported container sits behind the [`Backend`] trait, chosen once
//! per file by [`open`] from the [`Format`] the sniffer detected. Backends
//! do their structural work (central directory, header chain, page tree)
//! when they are opened, hand back a [`Listing`], and read individual
//! entries on demand.

pub mod backend;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod fixtures;
mod models;
mod solid;

pub use crate::backend::Backend;
pub use crate::models::{Access, DocumentInfo, Entry, EntryRef, Listing};
pub use crate::solid::SolidStore;
use crate::backend::{PdfBackend, RarBackend, SevenZipBackend, TarBackend, ZipBackend};
use crate::error::Result;
use comix_format::Format;
use comix_render::PdfRasterizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

pub type BackendHandle = Arc<dyn Backend>;

/// Everything a backend may need besides the file itself.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Parent directory for solid-archive scratch space. `None` uses the
    /// system temporary directory.
    pub scratch_dir: Option<PathBuf>,
    pub rasterizer: PdfRasterizer,
}

impl OpenOptions {
    pub fn new(rasterizer: PdfRasterizer) -> Self {
        Self { scratch_dir: None, rasterizer }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// Open the backend for `format`, doing the container's structural scan.
///
/// # Errors
///
/// [`Structure`](crate::error::ErrorKind::Structure) when no usable index
/// can be built; [`NotFound`](crate::error::ErrorKind::NotFound) and
/// [`Io`](crate::error::ErrorKind::Io) for the file itself.
#[instrument(skip(path, options), fields(path = %path.display()))]
pub fn open(path: &Path, format: Format, options: &OpenOptions) -> Result<BackendHandle> {
    let scratch = options.scratch_dir.clone();
    Ok(match format {
        Format::Zip => Arc::new(ZipBackend::open(path)?),
        Format::Rar => Arc::new(RarBackend::open(path, scratch)?),
        Format::Tar => Arc::new(TarBackend::open(path)?),
        Format::SevenZip => Arc::new(SevenZipBackend::open(path, scratch)?),
        Format::Pdf => Arc::new(PdfBackend::open(path, options.rasterizer.clone())?),
    })
}
