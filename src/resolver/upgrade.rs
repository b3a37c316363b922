// src/resolver/upgrade.rs

//! Full system upgrade computation

use super::{InstalledVersion, PackageChange};
use crate::engine::{Engine, Observer, PrepareFailure};
use crate::error::{Error, Result};
use crate::sync::require_repositories;
use crate::version::DepMod;
use tracing::{debug, warn};

/// Longest single line of preparation failure detail, newline included
const MAX_DETAIL_LINE: usize = 254;

/// Longest preparation failure detail overall
const MAX_DETAILS: usize = 1023;

/// Whether the upgrade is real or previewed on behalf of a simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeMode {
    #[default]
    Real,
    /// Also report the packages the upgrade would remove
    Preview,
}

/// Releases the engine's transaction when dropped
struct TransactionGuard<'a, E: Engine + ?Sized> {
    engine: &'a mut E,
}

impl<E: Engine + ?Sized> Drop for TransactionGuard<'_, E> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.trans_release() {
            warn!("Failed to release transaction: {}", e);
        }
    }
}

/// Compute the packages a full system upgrade would change
///
/// The transaction is released on every path once it was opened. An
/// empty result means no updates.
pub fn compute_upgrade<E: Engine + ?Sized>(
    engine: &mut E,
    mode: UpgradeMode,
    observer: &mut dyn Observer,
) -> Result<Vec<PackageChange>> {
    require_repositories(engine)?;

    engine.trans_init()?;
    let guard = TransactionGuard { engine };

    guard.engine.sync_sysupgrade(observer)?;

    if let Err(failure) = guard.engine.trans_prepare() {
        debug!("transaction preparation failed: {}", failure);
        return Err(prepare_error(&failure));
    }

    let engine = &*guard.engine;
    let mut changes = Vec::new();

    for pkg in engine.trans_add() {
        // Not installed yet when the upgrade pulls in a new package (e.g. after a split)
        let old = engine.local_package(&pkg.name).map(|old| InstalledVersion {
            version: old.version,
            size: old.installed_size,
        });

        changes.push(PackageChange::Upgrade {
            download_size: engine.download_size(&pkg),
            new_size: pkg.installed_size,
            new_version: pkg.version,
            repository: pkg.repository,
            name: pkg.name,
            description: pkg.description,
            old,
        });
    }

    if mode == UpgradeMode::Preview {
        for pkg in engine.trans_remove() {
            let old = engine.local_package(&pkg.name).unwrap_or_else(|| pkg.clone());

            changes.push(PackageChange::Removal {
                repository: pkg.repository,
                name: pkg.name,
                description: pkg.description,
                old: InstalledVersion {
                    version: old.version,
                    size: old.installed_size,
                },
            });
        }
    }

    debug!("{} package changes", changes.len());
    Ok(changes)
}

/// Turn an engine preparation failure into an itemized error
fn prepare_error(failure: &PrepareFailure) -> Error {
    let lines: Vec<String> = match failure {
        PrepareFailure::InvalidArch(packages) => packages
            .iter()
            .map(|pkg| format!("- Package {} does not have a valid architecture\n", pkg))
            .collect(),
        PrepareFailure::UnsatisfiedDeps(missing) => missing
            .iter()
            .map(|miss| format!("- {} requires {}\n", miss.target, miss.depend))
            .collect(),
        PrepareFailure::ConflictingDeps(conflicts) => conflicts
            .iter()
            .map(|conflict| {
                // The constraint only adds information when it is versioned
                if conflict.reason.modifier == DepMod::Any {
                    format!("- {} and {} are in conflict\n", conflict.package1, conflict.package2)
                } else {
                    format!(
                        "- {} and {} are in conflict ({})\n",
                        conflict.package1, conflict.package2, conflict.reason
                    )
                }
            })
            .collect(),
        PrepareFailure::Other(_) => Vec::new(),
    };

    let mut details = String::new();
    for line in &lines {
        let body = truncate(line.trim_end_matches('\n'), MAX_DETAIL_LINE - 1);
        if details.len() + body.len() + 1 > MAX_DETAILS {
            break;
        }
        details.push_str(body);
        details.push('\n');
    }

    Error::PrepareFailed {
        reason: failure.to_string(),
        details,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
