// src/resolver/foreign.rs

//! Installed packages that no repository carries

use crate::engine::{Engine, Package};
use crate::error::Result;
use crate::sync::require_repositories;

/// List installed packages absent from every registered repository
///
/// Names in `ignore` are never reported. Packages come back in installed
/// index order.
pub fn detect_foreign<E: Engine + ?Sized>(engine: &E, ignore: &[String]) -> Result<Vec<Package>> {
    let repositories = require_repositories(engine)?;

    Ok(engine
        .local_packages()
        .into_iter()
        .filter(|pkg| !ignore.contains(&pkg.name))
        .filter(|pkg| {
            !repositories
                .iter()
                .any(|repo| engine.sync_package(repo, &pkg.name).is_some())
        })
        .collect())
}
