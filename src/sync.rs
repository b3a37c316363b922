// src/sync.rs

//! Metadata refresh for every registered repository
//!
//! Repositories are processed sequentially in registration order; the
//! first failure aborts the remaining ones.

use crate::engine::{DbUpdate, Engine, Observer, SyncOutcome};
use crate::error::{Error, Result};
use crate::mirror::SyncedDbSet;
use tracing::{debug, info};

/// Fail with [`Error::NoRepositories`] unless a repository is registered
pub fn require_repositories<E: Engine + ?Sized>(engine: &E) -> Result<Vec<String>> {
    let repositories = engine.syncdbs();
    if repositories.is_empty() {
        return Err(Error::NoRepositories);
    }
    Ok(repositories)
}

/// Refresh every repository, recording the ones that changed in `synced`
pub fn sync_all<E: Engine + ?Sized>(
    engine: &mut E,
    synced: &mut SyncedDbSet,
    observer: &mut dyn Observer,
) -> Result<()> {
    let repositories = require_repositories(engine)?;
    observer.on_sync_dbs(repositories.len());

    for repo in &repositories {
        observer.on_sync_db_start(repo);

        let update = match engine.update_db(repo, observer) {
            Ok(update) => update,
            Err(e) => {
                observer.on_sync_db_end(SyncOutcome::Failure);
                return Err(Error::SyncError {
                    repo: repo.clone(),
                    message: e.to_string(),
                });
            }
        };

        let outcome = match update {
            DbUpdate::UpToDate => {
                debug!("{} is up to date", repo);
                SyncOutcome::NotNeeded
            }
            DbUpdate::Updated => {
                synced.insert(repo);
                debug!("{} was updated", repo);
                SyncOutcome::Success
            }
        };
        observer.on_sync_db_end(outcome);
    }

    info!("Synchronized {} repositories", repositories.len());
    Ok(())
}
