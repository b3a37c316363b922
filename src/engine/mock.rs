// src/engine/mock.rs

//! Scripted engine for unit tests

use super::{DbUpdate, Engine, EngineOptions, Observer, Package, PrepareFailure, TransactionState};
use crate::config::SigLevel;
use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockEngine {
    pub options: Option<EngineOptions>,
    pub repos: Vec<(String, SigLevel, Vec<String>, Vec<Package>)>,
    pub local: Vec<Package>,
    /// Scripted metadata refresh results; unscripted repositories are up to date
    pub updates: HashMap<String, std::result::Result<DbUpdate, String>>,
    pub fail_register: Option<String>,
    pub prepare_failure: Option<PrepareFailure>,
    pub add: Vec<Package>,
    pub remove: Vec<Package>,
    pub ignored: Vec<String>,
    pub state: Option<TransactionState>,
    pub update_calls: Vec<String>,
    pub init_count: usize,
    pub release_count: usize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, name: &str, packages: Vec<Package>) -> Self {
        self.repos
            .push((name.to_string(), SigLevel::Default, Vec::new(), packages));
        self
    }

    pub fn with_local(mut self, packages: Vec<Package>) -> Self {
        self.local = packages;
        self
    }

    fn current_state(&self) -> TransactionState {
        self.state.unwrap_or(TransactionState::Idle)
    }
}

impl Engine for MockEngine {
    fn set_options(&mut self, options: EngineOptions) -> Result<()> {
        self.options = Some(options);
        Ok(())
    }

    fn register_syncdb(&mut self, name: &str, sig_level: SigLevel) -> Result<()> {
        if self.fail_register.as_deref() == Some(name) {
            return Err(Error::ConfigError(format!("invalid database name '{}'", name)));
        }
        self.repos
            .push((name.to_string(), sig_level, Vec::new(), Vec::new()));
        Ok(())
    }

    fn add_server(&mut self, repository: &str, url: &str) -> Result<()> {
        let repo = self
            .repos
            .iter_mut()
            .find(|r| r.0 == repository)
            .ok_or_else(|| Error::NotFoundError(repository.to_string()))?;
        repo.2.push(url.to_string());
        Ok(())
    }

    fn syncdbs(&self) -> Vec<String> {
        self.repos.iter().map(|r| r.0.clone()).collect()
    }

    fn update_db(&mut self, repository: &str, _observer: &mut dyn Observer) -> Result<DbUpdate> {
        self.update_calls.push(repository.to_string());
        match self.updates.get(repository) {
            Some(Ok(update)) => Ok(*update),
            Some(Err(message)) => Err(Error::DownloadError(message.clone())),
            None => Ok(DbUpdate::UpToDate),
        }
    }

    fn transaction_state(&self) -> TransactionState {
        self.current_state()
    }

    fn trans_init(&mut self) -> Result<()> {
        if !self.current_state().can_open() {
            return Err(Error::TransactionError("a transaction is already in progress".to_string()));
        }
        self.init_count += 1;
        self.state = Some(TransactionState::Initialized);
        Ok(())
    }

    fn sync_sysupgrade(&mut self, _observer: &mut dyn Observer) -> Result<()> {
        Ok(())
    }

    fn trans_prepare(&mut self) -> std::result::Result<(), PrepareFailure> {
        match self.prepare_failure.clone() {
            Some(failure) => {
                self.state = Some(TransactionState::Failed);
                Err(failure)
            }
            None => {
                self.state = Some(TransactionState::Prepared);
                Ok(())
            }
        }
    }

    fn trans_add(&self) -> Vec<Package> {
        self.add.clone()
    }

    fn trans_remove(&self) -> Vec<Package> {
        self.remove.clone()
    }

    fn trans_release(&mut self) -> Result<()> {
        self.release_count += 1;
        self.state = Some(TransactionState::Released);
        Ok(())
    }

    fn local_package(&self, name: &str) -> Option<Package> {
        self.local.iter().find(|p| p.name == name).cloned()
    }

    fn local_packages(&self) -> Vec<Package> {
        self.local.clone()
    }

    fn sync_package(&self, repository: &str, name: &str) -> Option<Package> {
        self.repos
            .iter()
            .find(|r| r.0 == repository)
            .and_then(|r| r.3.iter().find(|p| p.name == name))
            .cloned()
    }

    fn should_ignore(&self, package: &Package) -> bool {
        self.ignored.contains(&package.name)
    }

    fn download_size(&self, package: &Package) -> u64 {
        package.compressed_size
    }
}
