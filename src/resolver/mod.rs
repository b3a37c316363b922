// src/resolver/mod.rs

//! Read-only queries over synchronized engine state
//!
//! - [`upgrade`]: packages a full system upgrade would change
//! - [`watched`]: user-selected packages checked against baseline versions
//! - [`foreign`]: installed packages no repository carries
//!
//! Results are [`PackageChange`] records in discovery order.

pub mod foreign;
pub mod upgrade;
pub mod watched;

pub use foreign::detect_foreign;
pub use upgrade::{UpgradeMode, compute_upgrade};
pub use watched::match_watched;

use std::fmt;

/// Displayed in place of a version when there is none
pub const NONE_VERSION: &str = "none";

/// New version shown for watched packages that were not found
pub const NOT_FOUND_VERSION: &str = "-";

/// Description shown for watched packages that were not found
pub const NOT_FOUND_DESCRIPTION: &str = "<package not found>";

/// Version and size of the currently installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub size: u64,
}

/// One package that would change, or a watched package's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageChange {
    /// Package a full upgrade would install; `old` is `None` for new packages
    Upgrade {
        repository: String,
        name: String,
        description: String,
        old: Option<InstalledVersion>,
        new_version: String,
        download_size: u64,
        new_size: u64,
    },
    /// Installed package the upgrade would remove (preview mode only)
    Removal {
        repository: String,
        name: String,
        description: String,
        old: InstalledVersion,
    },
    /// Watched package with a newer version available
    Watched {
        repository: String,
        name: String,
        description: String,
        old_version: String,
        new_version: String,
        download_size: u64,
        new_size: u64,
        ignored: bool,
    },
    /// Watched package that no eligible repository carries
    NotFound { name: String, baseline: String },
}

impl PackageChange {
    pub fn repository(&self) -> Option<&str> {
        match self {
            PackageChange::Upgrade { repository, .. }
            | PackageChange::Removal { repository, .. }
            | PackageChange::Watched { repository, .. } => Some(repository),
            PackageChange::NotFound { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PackageChange::Upgrade { name, .. }
            | PackageChange::Removal { name, .. }
            | PackageChange::Watched { name, .. }
            | PackageChange::NotFound { name, .. } => name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            PackageChange::Upgrade { description, .. }
            | PackageChange::Removal { description, .. }
            | PackageChange::Watched { description, .. } => description,
            PackageChange::NotFound { .. } => NOT_FOUND_DESCRIPTION,
        }
    }

    pub fn old_version(&self) -> &str {
        match self {
            PackageChange::Upgrade { old, .. } => {
                old.as_ref().map_or(NONE_VERSION, |o| o.version.as_str())
            }
            PackageChange::Removal { old, .. } => &old.version,
            PackageChange::Watched { old_version, .. } => old_version,
            PackageChange::NotFound { baseline, .. } => baseline,
        }
    }

    pub fn new_version(&self) -> &str {
        match self {
            PackageChange::Upgrade { new_version, .. }
            | PackageChange::Watched { new_version, .. } => new_version,
            PackageChange::Removal { .. } => NONE_VERSION,
            PackageChange::NotFound { .. } => NOT_FOUND_VERSION,
        }
    }

    pub fn old_size(&self) -> u64 {
        match self {
            PackageChange::Upgrade { old, .. } => old.as_ref().map_or(0, |o| o.size),
            PackageChange::Removal { old, .. } => old.size,
            PackageChange::Watched { .. } | PackageChange::NotFound { .. } => 0,
        }
    }

    pub fn new_size(&self) -> u64 {
        match self {
            PackageChange::Upgrade { new_size, .. } | PackageChange::Watched { new_size, .. } => {
                *new_size
            }
            PackageChange::Removal { .. } | PackageChange::NotFound { .. } => 0,
        }
    }

    pub fn download_size(&self) -> u64 {
        match self {
            PackageChange::Upgrade { download_size, .. }
            | PackageChange::Watched { download_size, .. } => *download_size,
            PackageChange::Removal { .. } | PackageChange::NotFound { .. } => 0,
        }
    }

    /// Whether the ignore policy currently holds this package back
    pub fn is_ignored(&self) -> bool {
        matches!(self, PackageChange::Watched { ignored: true, .. })
    }
}

impl fmt::Display for PackageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repository() {
            Some(repository) => write!(f, "{}/{}", repository, self.name())?,
            None => write!(f, "{}", self.name())?,
        }
        write!(f, " {} -> {}", self.old_version(), self.new_version())?;
        if self.is_ignored() {
            write!(f, " [ignored]")?;
        }
        Ok(())
    }
}
