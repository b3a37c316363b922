// src/engine/mod.rs

//! Query/transaction engine interface
//!
//! The dependency solver and installed-package index are external
//! collaborators. Everything the rest of the crate needs from them goes
//! through the [`Engine`] trait; [`archdb::ArchDbEngine`] is a file-backed
//! implementation working directly on a pacman-style database tree.

pub mod archdb;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::SigLevel;
use crate::error::Result;
use crate::version::Depend;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

pub use archdb::ArchDbEngine;

/// A package as seen by the engine, installed or from a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub description: String,
    pub architecture: Option<String>,
    /// Repository the package comes from, `local` for installed packages
    pub repository: String,
    /// File name of the package archive (repository packages only)
    pub filename: Option<String>,
    pub installed_size: u64,
    /// Compressed archive size as advertised by the repository
    pub compressed_size: u64,
    pub groups: Vec<String>,
    pub depends: Vec<Depend>,
    pub conflicts: Vec<Depend>,
    pub provides: Vec<Depend>,
    pub replaces: Vec<Depend>,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            architecture: None,
            repository: repository.into(),
            filename: None,
            installed_size: 0,
            compressed_size: 0,
            groups: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            replaces: Vec::new(),
        }
    }

    /// Whether this package satisfies a dependency expression
    pub fn satisfies(&self, dep: &Depend) -> bool {
        dep.is_satisfied_by(&self.name, &self.version, &self.provides)
    }
}

/// Engine-wide options taken from the configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub arch: Option<String>,
    pub ignore_pkgs: Vec<String>,
    pub ignore_groups: Vec<String>,
    pub default_sig_level: SigLevel,
    pub gpg_dir: PathBuf,
    pub cache_dirs: Vec<PathBuf>,
}

/// Result of a metadata refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbUpdate {
    /// New metadata was downloaded
    Updated,
    /// The local copy was already current
    UpToDate,
}

/// Lifecycle of the single engine transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Initialized,
    Prepared,
    Failed,
    Released,
}

impl TransactionState {
    /// Whether a new transaction may be opened
    pub fn can_open(&self) -> bool {
        matches!(self, TransactionState::Idle | TransactionState::Released)
    }
}

/// A dependency that would be left unsatisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub target: String,
    pub depend: Depend,
}

/// Two packages that cannot be installed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub package1: String,
    pub package2: String,
    pub reason: Depend,
}

/// Why the engine refused to prepare a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareFailure {
    InvalidArch(Vec<String>),
    UnsatisfiedDeps(Vec<MissingDependency>),
    ConflictingDeps(Vec<Conflict>),
    Other(String),
}

impl fmt::Display for PrepareFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareFailure::InvalidArch(_) => write!(f, "package architecture is not valid"),
            PrepareFailure::UnsatisfiedDeps(_) => write!(f, "could not satisfy dependencies"),
            PrepareFailure::ConflictingDeps(_) => write!(f, "conflicting dependencies"),
            PrepareFailure::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Outcome reported at the end of one repository's sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Failure,
    NotNeeded,
}

/// Severity of an engine log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
}

/// Question the engine asks while computing a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    /// Replace an installed package with one from a repository
    Replace {
        old: String,
        new: String,
        repository: String,
    },
}

/// Callbacks invoked synchronously on the calling thread
///
/// Every method has a no-op (or logging) default so callers only implement
/// what they display.
pub trait Observer {
    /// Number of repositories about to be refreshed
    fn on_sync_dbs(&mut self, _count: usize) {}

    fn on_sync_db_start(&mut self, _repository: &str) {}

    fn on_sync_db_end(&mut self, _outcome: SyncOutcome) {}

    /// Bytes received for a file; `total` is 0 when unknown
    fn on_download_progress(&mut self, _filename: &str, _transferred: u64, _total: u64) {}

    /// Answer an engine question; the default accepts
    fn on_question(&mut self, _question: &Question) -> bool {
        true
    }

    fn on_log(&mut self, level: LogLevel, message: &str) {
        debug!("engine ({:?}): {}", level, message);
    }
}

/// Observer that keeps every default
#[derive(Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Operations consumed from the query/transaction engine
///
/// Repository lists are always returned in registration order and
/// installed packages in index enumeration order.
pub trait Engine {
    /// Apply architecture, ignore lists, signature level, GnuPG dir and cache dirs
    fn set_options(&mut self, options: EngineOptions) -> Result<()>;

    fn register_syncdb(&mut self, name: &str, sig_level: SigLevel) -> Result<()>;

    fn add_server(&mut self, repository: &str, url: &str) -> Result<()>;

    /// Names of the registered repositories
    fn syncdbs(&self) -> Vec<String>;

    /// Refresh one repository's metadata, allowing network access
    fn update_db(&mut self, repository: &str, observer: &mut dyn Observer) -> Result<DbUpdate>;

    fn transaction_state(&self) -> TransactionState;

    fn trans_init(&mut self) -> Result<()>;

    /// Compute a full system upgrade into the open transaction
    fn sync_sysupgrade(&mut self, observer: &mut dyn Observer) -> Result<()>;

    fn trans_prepare(&mut self) -> std::result::Result<(), PrepareFailure>;

    /// Packages the prepared transaction would install
    fn trans_add(&self) -> Vec<Package>;

    /// Installed packages the prepared transaction would remove
    fn trans_remove(&self) -> Vec<Package>;

    fn trans_release(&mut self) -> Result<()>;

    fn local_package(&self, name: &str) -> Option<Package>;

    fn local_packages(&self) -> Vec<Package>;

    fn sync_package(&self, repository: &str, name: &str) -> Option<Package>;

    /// Whether the ignore policy excludes this package from upgrades
    fn should_ignore(&self, package: &Package) -> bool;

    /// Bytes that would have to be downloaded for this package
    fn download_size(&self, package: &Package) -> u64;

    fn vercmp(&self, a: &str, b: &str) -> std::cmp::Ordering {
        crate::version::vercmp(a, b)
    }
}
