//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults,
//! 2. a configuration file: the one given explicitly, or else `shelf.toml`,
//!    `shelf.yaml` or `shelf.json` in the working directory if present,
//! 3. environment variables prefixed `SHELF_`, with `__` separating nested
//!    keys (`SHELF_JANITOR__EXPIRATION=3600`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SHELF_";
const DEFAULT_FILES: [&str; 3] = ["shelf.toml", "shelf.yaml", "shelf.json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Private storage root for replicas, covers and downloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub janitor: JanitorConfig,
    pub warm_up: WarmUpConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Local folder standing in for the remote store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Shared links understood by the local remote, mapped to folders below `root`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Seconds between sweeps.
    pub interval: u64,
    /// Seconds a download may go unused before it is deleted.
    pub expiration: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: 24 * 60 * 60,
            expiration: 48 * 60 * 60,
        }
    }
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmUpConfig {
    /// Covers fetched concurrently by one pass.
    pub concurrency: usize,
}

impl Default for WarmUpConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

impl Config {
    /// Assemble the configuration sources without extracting them.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                for candidate in DEFAULT_FILES.iter().map(Path::new).filter(|p| p.is_file()) {
                    tracing::debug!(path = %candidate.display(), "Loading configuration file");
                    figment = merge_file(figment, candidate)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.janitor.interval == 0 {
            exn::bail!(ErrorKind::Invalid("janitor.interval must be greater than zero"));
        }
        if self.janitor.expiration == 0 {
            exn::bail!(ErrorKind::Invalid("janitor.expiration must be greater than zero"));
        }
        if self.warm_up.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("warm_up.concurrency must be greater than zero"));
        }
        Ok(())
    }

    /// The configured storage root, or the platform cache directory.
    pub fn storage_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.storage_root {
            return Ok(root.clone());
        }
        let dirs = ProjectDirs::from("", "", "shelf").ok_or_raise(|| ErrorKind::NoStorageRoot)?;
        Ok(dirs.cache_dir().to_path_buf())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.janitor.interval(), Duration::from_secs(86_400));
            assert_eq!(config.janitor.expiration(), Duration::from_secs(172_800));
            assert_eq!(config.warm_up.concurrency, 8);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shelf.toml",
                r#"
                    storage_root = "/var/cache/shelf"
                    [remote]
                    root = "/mnt/books"
                    [remote.links]
                    "https://www.dropbox.com/scl/fo/abc" = "Shared/Calibre"
                    [janitor]
                    expiration = 3600
                "#,
            )?;
            jail.set_env("SHELF_WARM_UP__CONCURRENCY", "3");
            jail.set_env("SHELF_JANITOR__EXPIRATION", "60");
            let config = Config::load(None).unwrap();
            assert_eq!(config.storage_root().unwrap(), Path::new("/var/cache/shelf"));
            assert_eq!(config.remote.root.as_deref(), Some(Path::new("/mnt/books")));
            assert_eq!(
                config.remote.links.get("https://www.dropbox.com/scl/fo/abc").map(PathBuf::as_path),
                Some(Path::new("Shared/Calibre"))
            );
            assert_eq!(config.janitor.expiration, 60);
            assert_eq!(config.janitor.interval, 86_400);
            assert_eq!(config.warm_up.concurrency, 3);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.yml", "warm_up:\n  concurrency: 2\n")?;
            let config = Config::load(Some(Path::new("custom.yml"))).unwrap();
            assert_eq!(config.warm_up.concurrency, 2);
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        Jail::expect_with(|jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            jail.create_file("shelf.ini", "")?;
            let err = Config::load(Some(Path::new("shelf.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("SHELF_JANITOR__INTERVAL")]
    #[case("SHELF_JANITOR__EXPIRATION")]
    #[case("SHELF_WARM_UP__CONCURRENCY")]
    fn test_zero_is_rejected(#[case] variable: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(variable, "0");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_wrong_type() {
        Jail::expect_with(|jail| {
            jail.set_env("SHELF_WARM_UP__CONCURRENCY", "many");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }
}
