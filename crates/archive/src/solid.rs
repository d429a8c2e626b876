//! One-time extraction for solid archives.
//!
//! A solid RAR or 7z compresses every member into one stream, so reading
//! page 40 means decompressing pages 1 to 39 first. Instead of paying that
//! per page, the first read extracts every member into a scratch directory;
//! all later reads are plain file reads.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};
use tempfile::TempDir;

/// Scratch storage for a solid archive, extracted at most once.
///
/// Concurrent readers block on the same [`OnceLock`] until the single
/// extraction pass completes. If the pass fails part-way, members written
/// before the failure stay readable and the rest report
/// [`EntryRead`](ErrorKind::EntryRead).
pub struct SolidStore {
    parent: Option<PathBuf>,
    state: OnceLock<Extracted>,
    extractions: AtomicUsize,
    closed: AtomicBool,
}

struct Extracted {
    dir: RwLock<Option<TempDir>>,
    members: HashMap<String, PathBuf>,
    aborted: Option<String>,
}

/// Handed to an extraction pass to store each member as it is decompressed.
pub struct ScratchWriter<'a> {
    dir: &'a Path,
    members: HashMap<String, PathBuf>,
}

impl ScratchWriter<'_> {
    /// Store one member. Names are never used as paths on disk, so hostile
    /// member names (`../../etc/passwd`) can't escape the scratch directory.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.dir.join(format!("{:06}.bin", self.members.len()));
        std::fs::write(&path, data).map_err(ErrorKind::Io)?;
        self.members.insert(name.to_string(), path);
        Ok(())
    }
}

impl SolidStore {
    /// Scratch directories are created under `parent`, or the system
    /// temporary directory.
    pub fn new(parent: Option<PathBuf>) -> Self {
        Self {
            parent,
            state: OnceLock::new(),
            extractions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Read a member, running `extract` first if no extraction has happened
    /// yet. `extract` is ignored on every call but the first.
    pub fn read<F>(&self, name: &str, extract: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&mut ScratchWriter<'_>) -> Result<()>,
    {
        if self.closed.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Closed);
        }
        let extracted = self.state.get_or_init(|| self.extract(extract));
        let Some(path) = extracted.members.get(name) else {
            match &extracted.aborted {
                Some(reason) => exn::bail!(ErrorKind::EntryRead(format!("{name}: {reason}"))),
                None => exn::bail!(ErrorKind::EntryNotFound(name.to_string())),
            }
        };
        let dir = extracted.dir.read().unwrap_or_else(PoisonError::into_inner);
        if dir.is_none() {
            exn::bail!(ErrorKind::Closed);
        }
        std::fs::read(path).or_raise(|| ErrorKind::EntryRead(name.to_string()))
    }

    fn extract<F>(&self, extract: F) -> Extracted
    where
        F: FnOnce(&mut ScratchWriter<'_>) -> Result<()>,
    {
        self.extractions.fetch_add(1, Ordering::AcqRel);
        let mut builder = tempfile::Builder::new();
        builder.prefix("comix-");
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        let dir = match dir {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "Unable to create scratch directory for solid archive");
                return Extracted {
                    dir: RwLock::new(None),
                    members: HashMap::new(),
                    aborted: Some(e.to_string()),
                };
            },
        };
        let mut writer = ScratchWriter { dir: dir.path(), members: HashMap::new() };
        let aborted = match extract(&mut writer) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, extracted = writer.members.len(), "Solid extraction stopped early");
                Some(e.to_string())
            },
        };
        tracing::debug!(members = writer.members.len(), scratch = %dir.path().display(), "Solid archive extracted");
        Extracted {
            members: writer.members,
            dir: RwLock::new(Some(dir)),
            aborted,
        }
    }

    /// How many extraction passes have run. Never more than one.
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::Acquire)
    }

    /// Location of the scratch directory, once extracted and until closed.
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        let extracted = self.state.get()?;
        let dir = extracted.dir.read().unwrap_or_else(PoisonError::into_inner);
        dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Delete the scratch directory. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(extracted) = self.state.get() {
            let mut dir = extracted.dir.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(dir) = dir.take() {
                tracing::trace!(scratch = %dir.path().display(), "Removing solid scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn extract_two(writer: &mut ScratchWriter<'_>) -> Result<()> {
        std::thread::sleep(Duration::from_millis(20));
        writer.write("001.jpg", b"first")?;
        writer.write("002.jpg", b"second")
    }

    #[test]
    fn concurrent_readers_share_one_extraction() {
        let store = Arc::new(SolidStore::new(None));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "001.jpg" } else { "002.jpg" };
                    store.read(name, extract_two).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let expected: &[u8] = if i % 2 == 0 { b"first" } else { b"second" };
            assert_eq!(handle.join().unwrap(), expected);
        }
        assert_eq!(store.extractions(), 1);
    }

    #[test]
    fn aborted_extraction_keeps_earlier_members() {
        let store = SolidStore::new(None);
        let extract = |writer: &mut ScratchWriter<'_>| -> Result<()> {
            writer.write("001.jpg", b"first")?;
            exn::bail!(ErrorKind::EntryRead("002.jpg".to_string()))
        };
        assert_eq!(store.read("001.jpg", extract).unwrap(), b"first");
        let err = store.read("002.jpg", |_| Ok(())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryRead(_)));
        assert_eq!(store.extractions(), 1);
    }

    #[test]
    fn unknown_member() {
        let store = SolidStore::new(None);
        let err = store.read("nope.jpg", extract_two).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryNotFound(name) if name == "nope.jpg"));
    }

    #[test]
    fn close_removes_scratch() {
        let parent = tempfile::tempdir().unwrap();
        let store = SolidStore::new(Some(parent.path().to_path_buf()));
        store.read("001.jpg", extract_two).unwrap();
        let scratch = store.scratch_dir().unwrap();
        assert!(scratch.starts_with(parent.path()));
        assert!(scratch.exists());
        store.close();
        store.close();
        assert!(!scratch.exists());
        assert!(matches!(&*store.read("001.jpg", extract_two).unwrap_err(), ErrorKind::Closed));
    }
}
