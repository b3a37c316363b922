// src/resolver/watched.rs

//! Watched package matching

use super::PackageChange;
use crate::config::WatchedPackage;
use crate::engine::Engine;
use crate::error::Result;
use crate::sync::require_repositories;
use std::cmp::Ordering;
use tracing::debug;

/// Check each watched package against the repositories
///
/// An entry named `repo/name` only looks in `repo`. The first repository
/// (in registration order) carrying the package decides: a record is
/// produced only when its version is newer than the baseline. Entries no
/// eligible repository carries produce a [`PackageChange::NotFound`].
pub fn match_watched<E: Engine + ?Sized>(
    engine: &E,
    watched: &[WatchedPackage],
) -> Result<Vec<PackageChange>> {
    let repositories = require_repositories(engine)?;
    let mut changes = Vec::new();

    for entry in watched {
        let (pin, name) = entry.split_name();

        let found = repositories
            .iter()
            .filter(|repo| pin.is_none_or(|pin| pin == repo.as_str()))
            .find_map(|repo| engine.sync_package(repo, name));

        let Some(pkg) = found else {
            debug!("watched package {} not found", entry.name);
            changes.push(PackageChange::NotFound {
                name: entry.name.clone(),
                baseline: entry.version.clone(),
            });
            continue;
        };

        if engine.vercmp(&pkg.version, &entry.version) != Ordering::Greater {
            continue;
        }

        changes.push(PackageChange::Watched {
            name: if pin.is_some() {
                entry.name.clone()
            } else {
                pkg.name.clone()
            },
            download_size: engine.download_size(&pkg),
            ignored: engine.should_ignore(&pkg),
            old_version: entry.version.clone(),
            new_size: pkg.installed_size,
            new_version: pkg.version,
            repository: pkg.repository,
            description: pkg.description,
        });
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Package;
    use crate::engine::mock::MockEngine;
    use crate::error::Error;

    fn pkg(name: &str, version: &str, repo: &str) -> Package {
        let mut pkg = Package::new(name, version, repo);
        pkg.installed_size = 2048;
        pkg.compressed_size = 512;
        pkg
    }

    fn engine() -> MockEngine {
        MockEngine::new()
            .with_repo("core", vec![pkg("foo", "1.1", "core")])
            .with_repo("extra", vec![pkg("foo", "2.0", "extra"), pkg("bar", "0.9", "extra")])
    }

    #[test]
    fn test_pinned_repository() {
        let engine = engine();
        let watched = vec![WatchedPackage::new("core/foo", "1.0")];

        let changes = match_watched(&engine, &watched).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name(), "core/foo");
        assert_eq!(changes[0].repository(), Some("core"));
        assert_eq!(changes[0].old_version(), "1.0");
        assert_eq!(changes[0].new_version(), "1.1");
        assert_eq!(changes[0].download_size(), 512);
        assert_eq!(changes[0].new_size(), 2048);
    }

    #[test]
    fn test_first_repository_wins() {
        let engine = engine();
        let watched = vec![WatchedPackage::new("foo", "1.1")];

        // core carries foo 1.1 which is not newer, extra's 2.0 is never consulted
        assert!(match_watched(&engine, &watched).unwrap().is_empty());
    }

    #[test]
    fn test_pin_to_later_repository() {
        let engine = engine();
        let watched = vec![WatchedPackage::new("extra/foo", "1.1")];

        let changes = match_watched(&engine, &watched).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].repository(), Some("extra"));
        assert_eq!(changes[0].new_version(), "2.0");
    }

    #[test]
    fn test_not_found() {
        let engine = engine();
        let watched = vec![
            WatchedPackage::new("missing", "1.0"),
            WatchedPackage::new("core/bar", "0.1"),
        ];

        let changes = match_watched(&engine, &watched).unwrap();
        assert_eq!(changes.len(), 2);
        for change in &changes {
            assert!(matches!(change, PackageChange::NotFound { .. }));
            assert_eq!(change.new_version(), "-");
            assert_eq!(change.description(), "<package not found>");
        }
        assert_eq!(changes[1].name(), "core/bar");
        assert_eq!(changes[1].old_version(), "0.1");
    }

    #[test]
    fn test_ignored_flag() {
        let mut engine = engine();
        engine.ignored.push("bar".to_string());
        let watched = vec![WatchedPackage::new("bar", "0.5")];

        let changes = match_watched(&engine, &watched).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_ignored());
    }

    #[test]
    fn test_order_follows_watch_list() {
        let engine = engine();
        let watched = vec![
            WatchedPackage::new("bar", "0.1"),
            WatchedPackage::new("gone", "1"),
            WatchedPackage::new("extra/foo", "1.0"),
        ];

        let names: Vec<_> = match_watched(&engine, &watched)
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["bar", "gone", "extra/foo"]);
    }

    #[test]
    fn test_requires_repositories() {
        let engine = MockEngine::new();
        let err = match_watched(&engine, &[]).unwrap_err();
        assert!(matches!(err, Error::NoRepositories));
    }
}
