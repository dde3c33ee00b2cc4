use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

/// User configuration, read from `~/.plantpipe/plantpipe.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline document used when no file is given on the command line.
    pub default_document: Option<String>,
    /// Extra root sentinel names, on top of the built-in ones.
    #[serde(default)]
    pub root_sentinels: Vec<String>,
    /// Extra upstream keys, e.g. `upstream_pcd = "point_cloud"`.
    #[serde(default)]
    pub upstream_roles: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub generic_upstream_roles: bool,
    #[serde(default)]
    pub strict_catalog: bool,
    /// Extra catalog entries, e.g. `Segmentation3D = "geometry"`.
    #[serde(default)]
    pub catalog: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_document: None,
            root_sentinels: Vec::new(),
            upstream_roles: BTreeMap::new(),
            generic_upstream_roles: true,
            strict_catalog: false,
            catalog: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn plantpipe_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or(Error::NoHomeDir)?
            .join(".plantpipe"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::plantpipe_dir()?.join("plantpipe.toml"))
    }

    /// Configured default document with `~/` expanded.
    pub fn default_document_path(&self) -> Option<PathBuf> {
        self.default_document.as_deref().map(expand_tilde)
    }

    /// Load the user configuration, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            default_document = ?config.default_document,
            root_sentinels = config.root_sentinels.len(),
            upstream_roles = config.upstream_roles.len(),
            strict_catalog = config.strict_catalog,
            "config loaded"
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
