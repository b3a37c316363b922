// src/config.rs

//! Configuration consumed by a session
//!
//! The package manager's own configuration file is parsed elsewhere; this
//! module only describes the already-parsed structure, plus a JSON loader
//! so the binary can be driven from a file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Signature verification level for a repository or the whole engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigLevel {
    /// Use the engine-wide default
    #[default]
    Default,
    /// Never look at signatures
    Never,
    /// Fetch signatures when available
    Optional,
    /// Signatures must be present
    Required,
}

impl SigLevel {
    /// Resolve `Default` against a fallback level
    pub fn or(self, fallback: SigLevel) -> SigLevel {
        match self {
            SigLevel::Default => fallback,
            level => level,
        }
    }
}

/// One configured sync repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(default)]
    pub sig_level: SigLevel,
    /// Server URL templates, may contain `$repo` and `$arch`
    #[serde(default)]
    pub servers: Vec<String>,
}

impl RepositoryConfig {
    pub fn new(name: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sig_level: SigLevel::Default,
            servers,
        }
    }
}

/// Parsed package manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root_dir: PathBuf,
    /// The real (privileged) database path
    pub db_path: PathBuf,
    pub arch: Option<String>,
    pub ignore_pkgs: Vec<String>,
    pub ignore_groups: Vec<String>,
    pub sig_level: SigLevel,
    pub gpg_dir: PathBuf,
    pub cache_dirs: Vec<PathBuf>,
    pub repositories: Vec<RepositoryConfig>,
    pub verbose_pkg_lists: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            db_path: PathBuf::from("/var/lib/pacman/"),
            arch: None,
            ignore_pkgs: Vec::new(),
            ignore_groups: Vec::new(),
            sig_level: SigLevel::Optional,
            gpg_dir: PathBuf::from("/etc/pacman.d/gnupg/"),
            cache_dirs: vec![PathBuf::from("/var/cache/pacman/pkg/")],
            repositories: Vec::new(),
            verbose_pkg_lists: false,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&content)
    }

    /// Parse a configuration from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {}", e)))
    }
}

/// A package tracked against a baseline version
///
/// `name` may be `repository/name` to pin the package to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedPackage {
    pub name: String,
    pub version: String,
}

impl WatchedPackage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Split a pinned name into `(Some(repository), package)`
    pub fn split_name(&self) -> (Option<&str>, &str) {
        match self.name.split_once('/') {
            Some((repo, name)) => (Some(repo), name),
            None => (None, &self.name),
        }
    }
}

/// Load a watch list from a JSON array of `{name, version}` objects
pub fn load_watched(path: &Path) -> Result<Vec<WatchedPackage>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| Error::ConfigError(format!("Invalid watch list: {}", e)))
}
