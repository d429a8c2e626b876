use crate::error::{ErrorKind, Result};
use crate::models::{IntegrityStatus, PageEntry};
use comix_archive::BackendHandle;
use comix_archive::error::ErrorKind as ArchiveErrorKind;
use comix_cache::{ContainerKey, PageCache, Slot};
use comix_format::Format;
use comix_meta::ComicMetadata;
use comix_render::{PageImage, scale};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub(crate) struct Inner {
    pub path: PathBuf,
    pub format: Format,
    pub key: ContainerKey,
    /// Whether `key` was read from the file, so changes to it can be seen.
    pub tracked: bool,
    pub backend: BackendHandle,
    pub pages: Vec<PageEntry>,
    pub skipped: BTreeMap<usize, String>,
    pub integrity: IntegrityStatus,
    pub metadata: ComicMetadata,
    pub cache: Arc<PageCache>,
    pub closed: AtomicBool,
    pub late_failures: Mutex<BTreeMap<usize, String>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.backend.close();
    }
}

impl Inner {
    /// Refuse to serve anything once closed, or once the file on disk is
    /// no longer the one that was indexed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        if self.tracked {
            let unchanged = ContainerKey::for_file(&self.path).is_ok_and(|current| current == self.key);
            if !unchanged {
                tracing::warn!(path = %self.path.display(), "Comic changed on disk since it was opened");
                exn::bail!(ErrorKind::SourceChanged(self.path.clone()));
            }
        }
        Ok(())
    }

    fn record_late_failure(&self, index: usize, reason: &str) {
        tracing::warn!(path = %self.path.display(), index, reason, "Page failed after open");
        let mut failures = self.late_failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.entry(index).or_insert_with(|| reason.to_string());
    }

    /// The page at its native size, through the cache.
    pub fn native_page(&self, index: usize, token: &CancellationToken) -> Result<PageImage> {
        let slot = Slot::Page { index, max_dimension: None };
        if let Some(hit) = self.cache.get(&self.key, slot) {
            return Ok(hit);
        }
        let page = self.page(index)?;
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let bytes = match self.backend.read_entry(&page.entry_ref) {
            Ok(bytes) => bytes,
            Err(err) if matches!(&*err, ArchiveErrorKind::Closed) => return Err(err).or_raise(|| ErrorKind::Closed),
            Err(err) => {
                let reason = (*err).to_string();
                self.record_late_failure(index, &reason);
                return Err(err).or_raise(|| ErrorKind::EntryRead { index, reason });
            },
        };
        let image = match PageImage::from_bytes(bytes) {
            Ok(image) => image,
            Err(err) => {
                let reason = format!("{}: {}", page.name, *err);
                self.record_late_failure(index, &reason);
                return Err(err).or_raise(|| ErrorKind::EntryRead { index, reason });
            },
        };
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        self.cache.insert(&self.key, slot, image.clone());
        Ok(image)
    }

    /// A page that exists and wasn't skipped while opening.
    fn page(&self, index: usize) -> Result<&PageEntry> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| ErrorKind::PageOutOfRange { index, page_count: self.pages.len() })?;
        if let Some(reason) = self.skipped.get(&index) {
            exn::bail!(ErrorKind::SkippedPage { index, reason: reason.clone() });
        }
        Ok(page)
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    pub fn read_page(&self, index: usize, max_dimension: Option<u32>, token: &CancellationToken) -> Result<PageImage> {
        self.ensure_open()?;
        self.page(index)?;
        let slot = Slot::Page { index, max_dimension };
        if let Some(hit) = self.cache.get(&self.key, slot) {
            return Ok(hit);
        }
        let native = self.native_page(index, token)?;
        let Some(max_dimension) = max_dimension.filter(|max| native.longest_side() > *max) else {
            return Ok(native);
        };
        let scaled = match scale::fit(&native, max_dimension) {
            Ok(scaled) => scaled,
            Err(err) => {
                let reason = (*err).to_string();
                self.record_late_failure(index, &reason);
                return Err(err).or_raise(|| ErrorKind::EntryRead { index, reason });
            },
        };
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        self.cache.insert(&self.key, slot, scaled.clone());
        Ok(scaled)
    }
}

/// An open comic.
///
/// Cloning is cheap and every clone shares the same backend, so pages can
/// be read from several tasks at once. The backend's file handles and
/// scratch space are released by [`close`](Self::close), or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct ComicContainer {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for ComicContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComicContainer")
            .field("path", &self.inner.path)
            .field("format", &self.inner.format)
            .field("page_count", &self.inner.pages.len())
            .field("integrity", &self.inner.integrity)
            .finish_non_exhaustive()
    }
}

impl ComicContainer {
    pub fn source_path(&self) -> &Path {
        &self.inner.path
    }

    pub fn format(&self) -> Format {
        self.inner.format
    }

    /// Fixed when the container is opened; skipped pages are included.
    pub fn page_count(&self) -> usize {
        self.inner.pages.len()
    }

    pub fn pages(&self) -> &[PageEntry] {
        &self.inner.pages
    }

    pub fn integrity(&self) -> &IntegrityStatus {
        &self.inner.integrity
    }

    pub fn metadata(&self) -> &ComicMetadata {
        &self.inner.metadata
    }

    /// Pages that failed when read after the container was opened, with
    /// the first failure seen for each. These don't change
    /// [`integrity`](Self::integrity).
    pub fn late_failures(&self) -> BTreeMap<usize, String> {
        self.inner.late_failures.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Read a page, downsampled so its longest side is at most
    /// `max_dimension` (never upscaled). `None` returns the page as stored.
    ///
    /// Dropping the returned future cancels the read; a cancelled read never
    /// populates the cache.
    pub async fn read_page(&self, index: usize, max_dimension: Option<u32>) -> Result<PageImage> {
        let inner = Arc::clone(&self.inner);
        self.run_blocking(move |token| inner.read_page(index, max_dimension, &token)).await
    }

    /// [`read_page`](Self::read_page) for callers already on a blocking
    /// thread.
    pub fn read_page_blocking(&self, index: usize, max_dimension: Option<u32>) -> Result<PageImage> {
        self.inner.read_page(index, max_dimension, &CancellationToken::new())
    }

    /// Derive the cover: the page the metadata marks as front cover, else
    /// the first page in reading order that fully decodes. With a
    /// `max_dimension` the result is a JPEG thumbnail.
    pub async fn cover(&self, max_dimension: Option<u32>) -> Result<PageImage> {
        let inner = Arc::clone(&self.inner);
        self.run_blocking(move |token| inner.cover(max_dimension, &token)).await
    }

    pub fn cover_blocking(&self, max_dimension: Option<u32>) -> Result<PageImage> {
        self.inner.cover(max_dimension, &CancellationToken::new())
    }

    /// Release the backend's file handles, decoders and scratch space.
    /// Idempotent. Every later read fails with
    /// [`Closed`](ErrorKind::Closed); cached pages are not served either.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(path = %self.inner.path.display(), "Closing container");
            self.inner.backend.close();
        }
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
    {
        let token = CancellationToken::new();
        // Cancels the blocking work if this future is dropped first.
        let _guard = token.clone().drop_guard();
        tokio::task::spawn_blocking(move || work(token)).await.or_raise(|| ErrorKind::Task)?
    }
}
