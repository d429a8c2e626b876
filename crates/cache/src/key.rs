use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;

/// Identity of one version of a container file.
///
/// The digest covers the path, modification time and size, so editing or
/// replacing the file yields a new key. The path and modification time are
/// kept alongside so the cache can tell when a newer key supersedes an
/// older one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    digest: blake3::Hash,
    path: PathBuf,
    modified: i128,
}

impl ContainerKey {
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime, size: u64) -> Self {
        let path = path.into();
        let modified = OffsetDateTime::from(modified).unix_timestamp_nanos();
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        // Separates the path from the fixed-width fields.
        hasher.update(&[0]);
        hasher.update(&modified.to_le_bytes());
        hasher.update(&size.to_le_bytes());
        Self { digest: hasher.finalize(), path, modified }
    }

    /// Key for the file as it currently is on disk.
    pub fn for_file(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            IoErrorKind::NotFound => ErrorKind::FileNotFound(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        })?;
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(Self::new(path, modified, metadata.len()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn digest(&self) -> blake3::Hash {
        self.digest
    }

    /// Modification time in nanoseconds since the Unix epoch.
    pub(crate) fn modified(&self) -> i128 {
        self.modified
    }
}

impl Display for ContainerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", &self.digest.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn identity_changes_with_file() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let key = ContainerKey::new("/comics/a.cbz", now, 100);
        assert_eq!(key, ContainerKey::new("/comics/a.cbz", now, 100));
        assert_ne!(key, ContainerKey::new("/comics/a.cbz", now, 101));
        assert_ne!(key, ContainerKey::new("/comics/a.cbz", now + Duration::from_nanos(1), 100));
        assert_ne!(key, ContainerKey::new("/comics/b.cbz", now, 100));
    }

    #[test]
    fn for_file_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cbz");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        let key = ContainerKey::for_file(&path).unwrap();
        assert_eq!(key.path(), path);
        assert_eq!(key.to_string().len(), 16);

        let err = ContainerKey::for_file(&dir.path().join("missing.cbz")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }
}
