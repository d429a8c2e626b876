use crate::container::{ComicContainer, Inner};
use crate::error::{ErrorKind, Result};
use crate::index;
use crate::models::IntegrityStatus;
use comix_archive::error::ErrorKind as ArchiveErrorKind;
use comix_archive::{Access, BackendHandle, EntryRef, OpenOptions};
use comix_cache::error::ErrorKind as CacheErrorKind;
use comix_cache::{ContainerKey, PageCache};
use comix_config::EngineConfig;
use comix_format::error::ErrorKind as FormatErrorKind;
use comix_meta::{Sources, comicinfo};
use comix_render::PdfRasterizer;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Opens comics. Holds the configuration and the page cache shared by
/// every container it opens; clone it freely.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    cache: Arc<PageCache>,
    options: OpenOptions,
}

impl Engine {
    /// An engine with its own cache, sized by the configuration.
    pub fn new(config: EngineConfig) -> Self {
        let cache = Arc::new(PageCache::new(config.cache_budget_bytes));
        Self::with_cache(config, cache)
    }

    /// An engine sharing an existing cache.
    pub fn with_cache(config: EngineConfig, cache: Arc<PageCache>) -> Self {
        let rasterizer = PdfRasterizer::new(config.pdf_render_dimension, config.pdftoppm.clone());
        let mut options = OpenOptions::new(rasterizer);
        if let Some(dir) = &config.scratch_dir {
            options = options.with_scratch_dir(dir);
        }
        Self { config: Arc::new(config), cache, options }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// Open a comic: detect the format, index the pages and normalize the
    /// metadata. Page images are decoded later, on request.
    ///
    /// Dropping the future abandons the open; a partially opened container
    /// releases its backend.
    ///
    /// # Errors
    ///
    /// [`UnknownFormat`](ErrorKind::UnknownFormat) for files that aren't
    /// comics, [`Unreadable`](ErrorKind::Unreadable) when no page index can
    /// be built, [`NotFound`](ErrorKind::NotFound) and
    /// [`Io`](ErrorKind::Io) for the file itself.
    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<ComicContainer> {
        let path = path.into();
        let engine = self.clone();
        self.run_blocking(move |token| engine.open_inner(&path, &token)).await
    }

    pub fn open_blocking(&self, path: &Path) -> Result<ComicContainer> {
        self.open_inner(path, &CancellationToken::new())
    }

    /// Open a comic through a backend the caller built. `path` names the
    /// comic for metadata and caching; it doesn't have to exist.
    pub async fn open_with_backend(&self, path: impl Into<PathBuf>, backend: BackendHandle) -> Result<ComicContainer> {
        let path = path.into();
        let engine = self.clone();
        self.run_blocking(move |token| {
            let key = container_key(&path).ok();
            engine.assemble(path, key, backend, &token)
        })
        .await
    }

    pub fn open_with_backend_blocking(&self, path: &Path, backend: BackendHandle) -> Result<ComicContainer> {
        self.assemble(path.to_path_buf(), container_key(path).ok(), backend, &CancellationToken::new())
    }

    /// Classify a file without keeping it open. An unreadable container is
    /// reported as [`IntegrityStatus::Unreadable`] rather than an error.
    ///
    /// # Errors
    ///
    /// Everything [`open`](Self::open) reports except
    /// [`Unreadable`](ErrorKind::Unreadable).
    pub async fn check(&self, path: impl Into<PathBuf>) -> Result<IntegrityStatus> {
        match self.open(path).await {
            Ok(container) => {
                let status = container.integrity().clone();
                container.close();
                Ok(status)
            },
            Err(err) if matches!(&*err, ErrorKind::Unreadable(_)) => {
                tracing::info!(error = %(*err).to_string(), "Container is unreadable");
                Ok(IntegrityStatus::Unreadable)
            },
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, path, token), fields(path = %path.display()))]
    fn open_inner(&self, path: &Path, token: &CancellationToken) -> Result<ComicContainer> {
        let format = comix_format::identify(path).map_err(|err| {
            let kind = match &*err {
                FormatErrorKind::NotFound(path) => ErrorKind::NotFound(path.clone()),
                FormatErrorKind::Io => ErrorKind::Io,
                _ => ErrorKind::UnknownFormat(path.to_path_buf()),
            };
            err.raise(kind)
        })?;
        let key = container_key(path)?;
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let backend = comix_archive::open(path, format, &self.options).map_err(|err| {
            let kind = match &*err {
                ArchiveErrorKind::NotFound(path) => ErrorKind::NotFound(path.clone()),
                ArchiveErrorKind::PermissionDenied(path) => ErrorKind::PermissionDenied(path.clone()),
                ArchiveErrorKind::Io(_) => ErrorKind::Io,
                other => ErrorKind::Unreadable(other.to_string()),
            };
            err.raise(kind)
        })?;
        self.assemble(path.to_path_buf(), Some(key), backend, token)
    }

    /// Index pages and extract metadata from an opened backend. The backend
    /// is closed on every error path. Without a `key` read from the file,
    /// changes to it can't be detected.
    fn assemble(
        &self,
        path: PathBuf,
        key: Option<ContainerKey>,
        backend: BackendHandle,
        token: &CancellationToken,
    ) -> Result<ComicContainer> {
        let result = self.assemble_inner(path, key, Arc::clone(&backend), token);
        if result.is_err() {
            backend.close();
        }
        result
    }

    fn assemble_inner(
        &self,
        path: PathBuf,
        key: Option<ContainerKey>,
        backend: BackendHandle,
        token: &CancellationToken,
    ) -> Result<ComicContainer> {
        let listing = backend.list_entries().map_err(|err| {
            let kind = ErrorKind::Unreadable((*err).to_string());
            err.raise(kind)
        })?;
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let probe = self.config.probe_on_open && backend.access() == Access::Random;
        let index = index::build(&listing, backend.as_ref(), probe);
        if index.pages.is_empty() {
            exn::bail!(ErrorKind::Unreadable("container holds no page images".to_string()));
        }
        if token.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }

        let members = listing.entries.iter().filter(|entry| !entry.is_dir).map(|entry| entry.name.as_str());
        let sidecar = comicinfo::locate(members).and_then(|name| {
            match backend.read_entry(&EntryRef::Member(name.to_string())) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::warn!(entry = name, error = %(*err).to_string(), "ComicInfo.xml could not be read");
                    None
                },
            }
        });
        let document_info = backend.document_info();
        let stem = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
        let metadata = comix_meta::extract(&Sources {
            stem: &stem,
            comic_info: sidecar.as_deref(),
            document_info: document_info.as_ref(),
        });

        let skipped_pages = index.skipped.keys().copied().collect();
        let integrity = IntegrityStatus::from_damage(skipped_pages, index.structure_damaged);
        tracing::info!(
            format = %backend.format(),
            pages = index.pages.len(),
            skipped = index.skipped.len(),
            structure_damaged = index.structure_damaged,
            source = ?metadata.source,
            "Opened comic"
        );
        let tracked = key.is_some();
        let key = key.unwrap_or_else(|| ContainerKey::new(&path, SystemTime::UNIX_EPOCH, 0));
        Ok(ComicContainer {
            inner: Arc::new(Inner {
                path,
                format: backend.format(),
                key,
                tracked,
                backend,
                pages: index.pages,
                skipped: index.skipped,
                integrity,
                metadata,
                cache: Arc::clone(&self.cache),
                closed: AtomicBool::new(false),
                late_failures: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();
        tokio::task::spawn_blocking(move || work(token)).await.or_raise(|| ErrorKind::Task)?
    }
}

fn container_key(path: &Path) -> Result<ContainerKey> {
    ContainerKey::for_file(path).map_err(|err| {
        let kind = match &*err {
            CacheErrorKind::FileNotFound(path) => ErrorKind::NotFound(path.clone()),
            CacheErrorKind::Io(_) => ErrorKind::Io,
        };
        err.raise(kind)
    })
}
