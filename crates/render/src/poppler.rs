use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::instrument;

/// Poppler's `pdftoppm`, used for pages that aren't a single embedded scan.
#[derive(Clone, Debug)]
pub(crate) struct Pdftoppm {
    path: PathBuf,
}

impl Pdftoppm {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn discover() -> Result<Self> {
        match which::which("pdftoppm") {
            Ok(path) => {
                tracing::debug!(pdftoppm = %path.display(), "Discovered pdftoppm");
                Ok(Self { path })
            },
            Err(_) => {
                tracing::info!("pdftoppm executable not found in PATH");
                exn::bail!(ErrorKind::RasterizerNotFound)
            },
        }
    }

    /// Render one page (1-based) to PNG, scaled so its longest side is
    /// `dimension` pixels.
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub(crate) fn render(&self, source: &Path, page: u32, dimension: u32) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
        let prefix = scratch.path().join("page");
        let page = page.to_string();
        let output = Command::new(&self.path)
            .args(["-png", "-singlefile", "-f", &page, "-l", &page, "-scale-to", &dimension.to_string()])
            .arg(source)
            .arg(&prefix)
            .output()
            .or_raise(|| ErrorKind::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(stderr = %stderr.trim(), "pdftoppm failed");
            exn::bail!(ErrorKind::RasterizerFailed(output.status.code().unwrap_or(-1)));
        }
        std::fs::read(prefix.with_extension("png")).or_raise(|| ErrorKind::Io)
    }
}
