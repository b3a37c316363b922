// src/session.rs

//! Caller-owned session tying a mirror to an engine
//!
//! A [`Session`] borrows the [`MirrorStore`] for its lifetime, so the
//! mirror cannot be removed while an engine is bound to it. Closing the
//! session releases the engine; removing the mirror is a separate call on
//! the store.

use crate::config::{Config, WatchedPackage};
use crate::engine::{Engine, EngineOptions, NoopObserver, Observer, Package};
use crate::error::Result;
use crate::mirror::{Established, MirrorStore};
use crate::repository::register_repositories;
use crate::resolver::{self, PackageChange, UpgradeMode};
use crate::sync;
use std::path::Path;
use tracing::{debug, info};

pub struct Session<'m, E: Engine> {
    store: &'m mut MirrorStore,
    engine: E,
    mirror: Established,
    mode: UpgradeMode,
    observer: Box<dyn Observer>,
    verbose_pkg_lists: bool,
}

impl<'m, E: Engine> Session<'m, E> {
    /// Establish the mirror of `config.db_path` and bind an engine to it
    ///
    /// `init` receives the root directory and the mirror path and builds
    /// the engine. Options from `config` are applied and every configured
    /// repository is registered. On failure the mirror stays in `store`
    /// for the caller to keep or remove.
    pub fn open<F>(
        store: &'m mut MirrorStore,
        config: &Config,
        mode: UpgradeMode,
        init: F,
    ) -> Result<Self>
    where
        F: FnOnce(&Path, &Path) -> Result<E>,
    {
        let mirror = store.establish(&config.db_path)?;
        debug!("binding engine to {}", mirror.path.display());

        let mut engine = init(&config.root_dir, &mirror.path)?;
        engine.set_options(EngineOptions {
            arch: config.arch.clone(),
            ignore_pkgs: config.ignore_pkgs.clone(),
            ignore_groups: config.ignore_groups.clone(),
            default_sig_level: config.sig_level,
            gpg_dir: config.gpg_dir.clone(),
            cache_dirs: config.cache_dirs.clone(),
        })?;
        register_repositories(&mut engine, &config.repositories, config.arch.as_deref())?;

        info!(
            "Session opened on {} ({} repositories)",
            mirror.path.display(),
            config.repositories.len()
        );

        Ok(Self {
            store,
            engine,
            mirror,
            mode,
            observer: Box::new(NoopObserver),
            verbose_pkg_lists: config.verbose_pkg_lists,
        })
    }

    /// Replace the observer receiving progress, questions and log lines
    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn mirror_path(&self) -> &Path {
        &self.mirror.path
    }

    /// Whether the mirror existed already and was reused
    pub fn reused(&self) -> bool {
        self.mirror.reused
    }

    pub fn mode(&self) -> UpgradeMode {
        self.mode
    }

    pub fn verbose_pkg_lists(&self) -> bool {
        self.verbose_pkg_lists
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &MirrorStore {
        &*self.store
    }

    /// Refresh every repository's metadata
    pub fn sync_all(&mut self) -> Result<()> {
        sync::sync_all(
            &mut self.engine,
            self.store.synced_mut(),
            self.observer.as_mut(),
        )
    }

    /// Packages a full system upgrade would change, in the session's mode
    pub fn compute_upgrade(&mut self) -> Result<Vec<PackageChange>> {
        resolver::compute_upgrade(&mut self.engine, self.mode, self.observer.as_mut())
    }

    pub fn watched(&self, watched: &[WatchedPackage]) -> Result<Vec<PackageChange>> {
        resolver::match_watched(&self.engine, watched)
    }

    pub fn foreign(&self, ignore: &[String]) -> Result<Vec<Package>> {
        resolver::detect_foreign(&self.engine, ignore)
    }

    /// Release the engine, leaving the mirror in the store
    pub fn close(self) {
        debug!("closing session on {}", self.mirror.path.display());
        drop(self.engine);
    }
}
