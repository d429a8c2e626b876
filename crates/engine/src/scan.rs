//! Finding comics on disk.

use crate::error::{Error, ErrorKind, Result};
use async_stream::stream;
use comix_format::Format;
use futures::Stream;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    Comic(PathBuf),
    Descend(PathBuf),
    Skip,
}

fn map_io_error(err: std::io::Error, path: &Path) -> Error {
    let kind = match err.kind() {
        IoErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        IoErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => {
            tracing::debug!(path = %path.display(), error = %err, "Directory walk failed");
            ErrorKind::Io
        },
    };
    exn::Exn::from(kind)
}

async fn process_entry(entry: DirEntry, recursive: bool) -> Result<WalkEntry> {
    let path = entry.path();
    if entry.file_name().to_string_lossy().starts_with('.') {
        return Ok(WalkEntry::Skip);
    }
    // Follows symlinks, unlike `DirEntry::file_type`.
    let metadata = fs::metadata(&path).await.map_err(|e| map_io_error(e, &path))?;
    if metadata.is_dir() {
        return Ok(if recursive { WalkEntry::Descend(path) } else { WalkEntry::Skip });
    }
    if metadata.is_file() && Format::from_path(&path).is_some() {
        return Ok(WalkEntry::Comic(path));
    }
    Ok(WalkEntry::Skip)
}

/// Stream the path of every file under `root` with a comic extension
/// (`.cbz`, `.cbr`, `.cbt`, `.cb7`, their archive equivalents, `.pdf`).
///
/// Hidden files and directories are skipped. Nothing is opened: the format
/// is confirmed by [`Engine::open`](crate::Engine::open). Unreadable
/// directories yield an error and the walk carries on.
pub fn discover(root: impl Into<PathBuf>, recursive: bool) -> impl Stream<Item = Result<PathBuf>> {
    let mut stack = vec![root.into()];
    stream! {
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(map_io_error(err, &current));
                    continue 'dirs;
                },
            };
            'entries: loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(err) => {
                        yield Err(map_io_error(err, &current));
                        continue 'dirs;
                    },
                };
                match process_entry(entry, recursive).await {
                    Ok(WalkEntry::Comic(path)) => yield Ok(path),
                    Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => yield Err(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use rstest::rstest;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for file in ["a.cbz", "b.PDF", "notes.txt", ".hidden.cbr", "series/c.cb7", "series/deeper/d.cbt", ".git/e.cbz"] {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"").unwrap();
        }
        dir
    }

    #[rstest]
    #[case(false, &["a.cbz", "b.PDF"])]
    #[case(true, &["a.cbz", "b.PDF", "series/c.cb7", "series/deeper/d.cbt"])]
    #[tokio::test]
    async fn finds_comics(#[case] recursive: bool, #[case] expected: &[&str]) {
        let dir = tree();
        let mut found: Vec<PathBuf> = discover(dir.path(), recursive).try_collect().await.unwrap();
        found.sort();
        let mut expected: Vec<PathBuf> = expected.iter().map(|name| dir.path().join(name)).collect();
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let results: Vec<Result<PathBuf>> = discover(dir.path().join("nope"), true).collect().await;
        assert_eq!(results.len(), 1);
        let err = results.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
