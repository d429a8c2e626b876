//! Engine configuration.
//!
//! Layered lowest to highest precedence:
//!
//! 1. built-in defaults ([`EngineConfig::default`]),
//! 2. a configuration file (TOML, or YAML/JSON by extension), by default
//!    `config.toml` in the platform config directory,
//! 3. environment variables prefixed with `COMIX_`, e.g.
//!    `COMIX_CACHE_BUDGET_BYTES=67108864`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const ENV_PREFIX: &str = "COMIX_";
const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Total bytes of decoded pages and covers kept in memory. Zero
    /// disables caching.
    pub cache_budget_bytes: u64,
    /// Longest side of generated cover thumbnails, in pixels.
    pub cover_max_dimension: u32,
    /// Longest side PDF pages are rasterized at, in pixels.
    pub pdf_render_dimension: u32,
    /// Read the first bytes of every page while opening to find damaged
    /// entries early. Solid archives are never probed.
    pub probe_on_open: bool,
    /// Parent directory for solid-archive extraction. Defaults to the system
    /// temporary directory.
    pub scratch_dir: Option<PathBuf>,
    /// Explicit `pdftoppm` binary. Defaults to searching `PATH`.
    pub pdftoppm: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: 256 * MIB,
            cover_max_dimension: 450,
            pdf_render_dimension: 2400,
            probe_on_open: true,
            scratch_dir: None,
            pdftoppm: None,
        }
    }
}

impl EngineConfig {
    /// The default configuration file location, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "comix").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load defaults, then `path` (or [`default_path`](Self::default_path)
    /// when `None`), then the environment. A missing file is skipped.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = &path {
            tracing::debug!(path = %path.display(), exists = path.exists(), "Configuration file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cover_max_dimension == 0 {
            exn::bail!(ErrorKind::Invalid("cover_max_dimension must be at least 1".to_string()));
        }
        if self.pdf_render_dimension == 0 {
            exn::bail!(ErrorKind::Invalid("pdf_render_dimension must be at least 1".to_string()));
        }
        if let Some(dir) = &self.scratch_dir
            && !dir.is_dir()
        {
            exn::bail!(ErrorKind::Invalid(format!("scratch_dir is not a directory: {}", dir.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|jail| {
            let config = EngineConfig::load(Some(&jail.directory().join("missing.toml"))).unwrap();
            assert_eq!(config, EngineConfig::default());
            assert_eq!(config.cache_budget_bytes, 256 * MIB);
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("comix.toml", "cache_budget_bytes = 1024\ncover_max_dimension = 300\n")?;
            jail.set_env("COMIX_COVER_MAX_DIMENSION", "600");
            jail.set_env("COMIX_PROBE_ON_OPEN", "false");
            let config = EngineConfig::load(Some(&jail.directory().join("comix.toml"))).unwrap();
            assert_eq!(config.cache_budget_bytes, 1024);
            assert_eq!(config.cover_max_dimension, 600);
            assert!(!config.probe_on_open);
            assert_eq!(config.pdf_render_dimension, 2400);
            Ok(())
        });
    }

    #[rstest]
    #[case("comix.yaml", "pdf_render_dimension: 1200\n")]
    #[case("comix.json", r#"{"pdf_render_dimension": 1200}"#)]
    fn other_file_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = EngineConfig::load(Some(&jail.directory().join(name))).unwrap();
            assert_eq!(config.pdf_render_dimension, 1200);
            Ok(())
        });
    }

    #[test]
    fn rejects_bad_values() {
        Jail::expect_with(|jail| {
            jail.create_file("zero.toml", "cover_max_dimension = 0")?;
            let err = EngineConfig::load(Some(&jail.directory().join("zero.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));

            jail.create_file("typo.toml", "cache_budget_bytes = \"lots\"")?;
            let err = EngineConfig::load(Some(&jail.directory().join("typo.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
            Ok(())
        });
    }

    #[test]
    fn scratch_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig { scratch_dir: Some(dir.path().to_path_buf()), ..Default::default() };
        assert!(config.validate().is_ok());
        config.scratch_dir = Some(dir.path().join("nope"));
        assert!(config.validate().is_err());
    }
}
