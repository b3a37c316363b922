// src/engine/archdb.rs

//! File-backed engine over a pacman-style database tree
//!
//! Installed packages are read from `<dbpath>/local`, repository metadata
//! from `<dbpath>/sync/<repo>.db`. Metadata refresh relies on the database
//! files' modification times (sent as `If-Modified-Since`), which is why
//! the mirror preserves them.

use super::{
    Conflict, DbUpdate, Engine, EngineOptions, LogLevel, MissingDependency, Observer, Package,
    PrepareFailure, Question, TransactionState,
};
use crate::config::SigLevel;
use crate::error::{Error, Result};
use crate::mirror::write_atomic;
use crate::repository::archive::{self, LOCAL_REPOSITORY};
use crate::repository::client::{FetchOutcome, Fetcher};
use filetime::FileTime;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// One registered sync repository
#[derive(Debug)]
struct SyncDb {
    name: String,
    sig_level: SigLevel,
    servers: Vec<String>,
    packages: Vec<Package>,
}

/// Engine reading pacman's on-disk database format
pub struct ArchDbEngine {
    root_dir: PathBuf,
    db_path: PathBuf,
    options: EngineOptions,
    fetcher: Box<dyn Fetcher>,
    local: Vec<Package>,
    syncdbs: Vec<SyncDb>,
    state: TransactionState,
    add: Vec<Package>,
    remove: Vec<Package>,
}

impl std::fmt::Debug for ArchDbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchDbEngine")
            .field("root_dir", &self.root_dir)
            .field("db_path", &self.db_path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ArchDbEngine {
    /// Initialize the engine on a root and database path
    pub fn new(root_dir: &Path, db_path: &Path, fetcher: Box<dyn Fetcher>) -> Result<Self> {
        if !db_path.is_dir() {
            return Err(Error::InitError(format!(
                "database path {} is not a directory",
                db_path.display()
            )));
        }

        let local = archive::read_local_db(&db_path.join("local"))?;
        info!(
            "Engine initialized on {} ({} installed packages)",
            db_path.display(),
            local.len()
        );

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            db_path: db_path.to_path_buf(),
            options: EngineOptions::default(),
            fetcher,
            local,
            syncdbs: Vec::new(),
            state: TransactionState::Idle,
            add: Vec::new(),
            remove: Vec::new(),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn db_file(&self, repository: &str) -> PathBuf {
        self.db_path.join("sync").join(format!("{}.db", repository))
    }

    fn find_syncdb(&self, repository: &str) -> Result<usize> {
        self.syncdbs
            .iter()
            .position(|db| db.name == repository)
            .ok_or_else(|| Error::NotFoundError(format!("database {} is not registered", repository)))
    }

    /// Parse the local copy of a sync database; no copy yet means no packages
    fn load_packages(&self, repository: &str) -> Result<Vec<Package>> {
        let path = self.db_file(repository);
        if !path.exists() {
            debug!("{} has no local copy yet", repository);
            return Ok(Vec::new());
        }

        archive::read_sync_db(&path, repository)
    }

    /// Fetch `<server>/<file>` from the first server that answers
    fn fetch_from_servers(
        &self,
        servers: &[String],
        file: &str,
        since: Option<SystemTime>,
        observer: &mut dyn Observer,
    ) -> Result<FetchOutcome> {
        let mut last_error = None;

        for server in servers {
            let url = format!("{}/{}", server.trim_end_matches('/'), file);
            match self.fetcher.fetch(&url, since) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    observer.on_log(LogLevel::Error, &format!("failed retrieving file '{}' from {}: {}", file, server, e));
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::DownloadError(format!("no servers configured for {}", file))
        }))
    }

    fn is_ignored_name(&self, name: &str) -> bool {
        self.options.ignore_pkgs.iter().any(|p| p == name)
    }

    /// Installed packages that remain after the transaction, plus additions
    fn final_package_set(&self) -> Vec<&Package> {
        self.local
            .iter()
            .filter(|pkg| {
                !self.remove.iter().any(|r| r.name == pkg.name)
                    && !self.add.iter().any(|a| a.name == pkg.name)
            })
            .chain(self.add.iter())
            .collect()
    }

    fn check_architectures(&self) -> Vec<String> {
        let Some(arch) = self.options.arch.as_deref() else {
            return Vec::new();
        };

        self.add
            .iter()
            .filter(|pkg| {
                pkg.architecture
                    .as_deref()
                    .is_some_and(|a| a != "any" && a != arch)
            })
            .map(|pkg| format!("{}-{}", pkg.name, pkg.version))
            .collect()
    }

    fn check_dependencies(&self, final_set: &[&Package]) -> Vec<MissingDependency> {
        let mut missing = Vec::new();

        // Installed packages are only held to dependencies they already had
        for pkg in final_set {
            let added = self.add.iter().any(|a| a.name == pkg.name);
            for dep in &pkg.depends {
                if !added && !self.local.iter().any(|installed| installed.satisfies(dep)) {
                    continue;
                }
                if !final_set.iter().any(|candidate| candidate.satisfies(dep)) {
                    missing.push(MissingDependency {
                        target: pkg.name.clone(),
                        depend: dep.clone(),
                    });
                }
            }
        }

        missing
    }

    fn check_conflicts(&self, final_set: &[&Package]) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = Vec::new();

        for new in &self.add {
            for other in final_set {
                if other.name == new.name {
                    continue;
                }

                let pair = new
                    .conflicts
                    .iter()
                    .find(|c| other.satisfies(c))
                    .map(|c| (new.name.clone(), other.name.clone(), c.clone()))
                    .or_else(|| {
                        other
                            .conflicts
                            .iter()
                            .find(|c| new.satisfies(c))
                            .map(|c| (other.name.clone(), new.name.clone(), c.clone()))
                    });

                if let Some((package1, package2, reason)) = pair {
                    let seen = conflicts.iter().any(|c| {
                        (c.package1 == package1 && c.package2 == package2)
                            || (c.package1 == package2 && c.package2 == package1)
                    });
                    if !seen {
                        conflicts.push(Conflict {
                            package1,
                            package2,
                            reason,
                        });
                    }
                }
            }
        }

        conflicts
    }
}

fn store_download(path: &Path, data: &[u8], last_modified: Option<SystemTime>) -> Result<()> {
    write_atomic(path, data)?;
    if let Some(modified) = last_modified {
        if let Err(e) = filetime::set_file_mtime(path, FileTime::from_system_time(modified)) {
            warn!("Unable to change time of {}: {}", path.display(), e);
        }
    }
    Ok(())
}

impl Engine for ArchDbEngine {
    fn set_options(&mut self, options: EngineOptions) -> Result<()> {
        if options.gpg_dir.as_os_str().is_empty() {
            return Err(Error::InitError("GPGDir must not be empty".to_string()));
        }
        debug!("Engine options: {:?}", options);
        self.options = options;
        Ok(())
    }

    fn register_syncdb(&mut self, name: &str, sig_level: SigLevel) -> Result<()> {
        if name.is_empty() || name.contains('/') || name == LOCAL_REPOSITORY {
            return Err(Error::ConfigError(format!("invalid database name '{}'", name)));
        }
        if self.syncdbs.iter().any(|db| db.name == name) {
            return Err(Error::ConfigError(format!("database {} already registered", name)));
        }

        let packages = self.load_packages(name)?;
        debug!("Registered {} ({} packages)", name, packages.len());
        self.syncdbs.push(SyncDb {
            name: name.to_string(),
            sig_level,
            servers: Vec::new(),
            packages,
        });
        Ok(())
    }

    fn add_server(&mut self, repository: &str, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(Error::ConfigError("invalid server URL".to_string()));
        }
        let index = self.find_syncdb(repository)?;
        self.syncdbs[index].servers.push(url.trim_end_matches('/').to_string());
        Ok(())
    }

    fn syncdbs(&self) -> Vec<String> {
        self.syncdbs.iter().map(|db| db.name.clone()).collect()
    }

    fn update_db(&mut self, repository: &str, observer: &mut dyn Observer) -> Result<DbUpdate> {
        let index = self.find_syncdb(repository)?;
        let servers = self.syncdbs[index].servers.clone();
        let sig_level = self.syncdbs[index].sig_level.or(self.options.default_sig_level);

        let sync_dir = self.db_path.join("sync");
        fs::create_dir_all(&sync_dir).map_err(|e| {
            Error::IoError(format!("Unable to create folder {}: {}", sync_dir.display(), e))
        })?;

        let db_file = self.db_file(repository);
        let since = fs::metadata(&db_file).and_then(|m| m.modified()).ok();
        let filename = format!("{}.db", repository);

        let (data, last_modified) = match self.fetch_from_servers(&servers, &filename, since, observer)? {
            FetchOutcome::NotModified => return Ok(DbUpdate::UpToDate),
            FetchOutcome::Fetched {
                data,
                last_modified,
            } => (data, last_modified),
        };
        observer.on_download_progress(&filename, data.len() as u64, data.len() as u64);

        // Nothing touches disk until the signature is in hand, otherwise a
        // stamped database would read as current on the next sync
        let sig_name = format!("{}.sig", filename);
        let signature = if sig_level == SigLevel::Never {
            None
        } else {
            match self.fetch_from_servers(&servers, &sig_name, None, observer) {
                Ok(FetchOutcome::Fetched {
                    data,
                    last_modified,
                }) => Some((data, last_modified)),
                Ok(FetchOutcome::NotModified) => None,
                Err(e) if sig_level == SigLevel::Required => return Err(e),
                Err(e) => {
                    debug!("No signature for {}: {}", repository, e);
                    None
                }
            }
        };

        store_download(&db_file, &data, last_modified)?;
        if let Some((sig_data, sig_modified)) = signature {
            store_download(&sync_dir.join(&sig_name), &sig_data, sig_modified)?;
        }

        match self.load_packages(repository) {
            Ok(packages) => self.syncdbs[index].packages = packages,
            Err(e) => {
                // Drop the bad copy so the next sync downloads it again
                if let Err(remove_err) = fs::remove_file(&db_file) {
                    warn!("Unable to remove {}: {}", db_file.display(), remove_err);
                }
                return Err(e);
            }
        }
        Ok(DbUpdate::Updated)
    }

    fn transaction_state(&self) -> TransactionState {
        self.state
    }

    fn trans_init(&mut self) -> Result<()> {
        if !self.state.can_open() {
            return Err(Error::TransactionError(
                "a transaction is already in progress".to_string(),
            ));
        }
        self.add.clear();
        self.remove.clear();
        self.state = TransactionState::Initialized;
        Ok(())
    }

    fn sync_sysupgrade(&mut self, observer: &mut dyn Observer) -> Result<()> {
        if self.state != TransactionState::Initialized {
            return Err(Error::TransactionError("transaction not initialized".to_string()));
        }

        let mut add: Vec<Package> = Vec::new();
        let mut remove: Vec<Package> = Vec::new();

        for installed in &self.local {
            if self.should_ignore(installed) {
                observer.on_log(LogLevel::Warning, &format!("{}: ignoring package upgrade", installed.name));
                continue;
            }

            // Replacements take precedence over plain upgrades
            let replacer = self.syncdbs.iter().find_map(|db| {
                db.packages.iter().find(|candidate| {
                    candidate.name != installed.name
                        && !self.should_ignore(candidate)
                        && candidate
                            .replaces
                            .iter()
                            .any(|r| r.is_satisfied_by(&installed.name, &installed.version, &[]))
                })
            });

            if let Some(replacer) = replacer {
                let question = Question::Replace {
                    old: installed.name.clone(),
                    new: replacer.name.clone(),
                    repository: replacer.repository.clone(),
                };
                if observer.on_question(&question) {
                    if !add.iter().any(|p| p.name == replacer.name) {
                        add.push(replacer.clone());
                    }
                    remove.push(installed.clone());
                    continue;
                }
            }

            let candidate = self
                .syncdbs
                .iter()
                .find_map(|db| db.packages.iter().find(|p| p.name == installed.name));

            if let Some(candidate) = candidate {
                match self.vercmp(&candidate.version, &installed.version) {
                    Ordering::Greater => {
                        if !add.iter().any(|p| p.name == candidate.name) {
                            add.push(candidate.clone());
                        }
                    }
                    Ordering::Less => observer.on_log(
                        LogLevel::Warning,
                        &format!(
                            "{}: local ({}) is newer than {} ({})",
                            installed.name, installed.version, candidate.repository, candidate.version
                        ),
                    ),
                    Ordering::Equal => {}
                }
            }
        }

        debug!("sysupgrade: {} to add, {} to remove", add.len(), remove.len());
        self.add = add;
        self.remove = remove;
        Ok(())
    }

    fn trans_prepare(&mut self) -> std::result::Result<(), PrepareFailure> {
        if self.state != TransactionState::Initialized {
            return Err(PrepareFailure::Other("transaction not initialized".to_string()));
        }

        if self.add.is_empty() && self.remove.is_empty() {
            self.state = TransactionState::Prepared;
            return Ok(());
        }

        let invalid = self.check_architectures();
        if !invalid.is_empty() {
            self.state = TransactionState::Failed;
            return Err(PrepareFailure::InvalidArch(invalid));
        }

        let final_set = self.final_package_set();

        let missing = self.check_dependencies(&final_set);
        if !missing.is_empty() {
            self.state = TransactionState::Failed;
            return Err(PrepareFailure::UnsatisfiedDeps(missing));
        }

        let conflicts = self.check_conflicts(&final_set);
        if !conflicts.is_empty() {
            self.state = TransactionState::Failed;
            return Err(PrepareFailure::ConflictingDeps(conflicts));
        }

        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn trans_add(&self) -> Vec<Package> {
        self.add.clone()
    }

    fn trans_remove(&self) -> Vec<Package> {
        self.remove.clone()
    }

    fn trans_release(&mut self) -> Result<()> {
        if self.state.can_open() {
            return Err(Error::TransactionError("no transaction to release".to_string()));
        }
        self.add.clear();
        self.remove.clear();
        self.state = TransactionState::Released;
        Ok(())
    }

    fn local_package(&self, name: &str) -> Option<Package> {
        self.local.iter().find(|p| p.name == name).cloned()
    }

    fn local_packages(&self) -> Vec<Package> {
        self.local.clone()
    }

    fn sync_package(&self, repository: &str, name: &str) -> Option<Package> {
        self.syncdbs
            .iter()
            .find(|db| db.name == repository)
            .and_then(|db| db.packages.iter().find(|p| p.name == name))
            .cloned()
    }

    fn should_ignore(&self, package: &Package) -> bool {
        self.is_ignored_name(&package.name)
            || package
                .groups
                .iter()
                .any(|g| self.options.ignore_groups.contains(g))
    }

    fn download_size(&self, package: &Package) -> u64 {
        let Some(filename) = package.filename.as_deref() else {
            return 0;
        };

        let cached = self
            .options
            .cache_dirs
            .iter()
            .any(|dir| dir.join(filename).is_file());

        if cached { 0 } else { package.compressed_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoopObserver;
    use crate::version::Depend;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Fetcher that always fails, for engines that never sync
    struct OfflineFetcher;

    impl Fetcher for OfflineFetcher {
        fn fetch(&self, url: &str, _since: Option<SystemTime>) -> Result<FetchOutcome> {
            Err(Error::DownloadError(format!("offline: {}", url)))
        }
    }

    /// Fetcher serving fixed files by name, honoring If-Modified-Since
    struct StaticFetcher {
        files: HashMap<String, (Vec<u8>, SystemTime)>,
    }

    impl StaticFetcher {
        fn new(files: &[(&str, &[u8])]) -> Self {
            let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
            StaticFetcher {
                files: files
                    .iter()
                    .map(|(name, data)| (name.to_string(), (data.to_vec(), modified)))
                    .collect(),
            }
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str, since: Option<SystemTime>) -> Result<FetchOutcome> {
            let name = url.rsplit('/').next().unwrap_or(url);
            let (data, modified) = self
                .files
                .get(name)
                .ok_or_else(|| Error::DownloadError(format!("404 Not Found: {}", url)))?;
            if since.is_some_and(|t| t >= *modified) {
                return Ok(FetchOutcome::NotModified);
            }
            Ok(FetchOutcome::Fetched {
                data: data.clone(),
                last_modified: Some(*modified),
            })
        }
    }

    fn sync_db_bytes(name: &str, version: &str) -> Vec<u8> {
        let desc = format!("%NAME%\n{}\n\n%VERSION%\n{}\n\n%ARCH%\nx86_64\n", name, version);
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(desc.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}-{}/desc", name, version), desc.as_bytes())
            .unwrap();
        builder.into_inner().unwrap()
    }

    fn served_engine(dir: &Path, fetcher: StaticFetcher, sig_level: SigLevel) -> ArchDbEngine {
        let mut engine = ArchDbEngine::new(dir, dir, Box::new(fetcher)).unwrap();
        engine.register_syncdb("core", sig_level).unwrap();
        engine.add_server("core", "https://mirror.test/core/os/x86_64").unwrap();
        engine
    }

    fn write_local(db_path: &Path, name: &str, version: &str, extra: &str) {
        let dir = db_path.join("local").join(format!("{}-{}", name, version));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("desc"),
            format!("%NAME%\n{}\n\n%VERSION%\n{}\n\n%SIZE%\n10\n\n{}", name, version, extra),
        )
        .unwrap();
    }

    fn engine_with(dir: &Path, repo: Vec<Package>) -> ArchDbEngine {
        fs::create_dir_all(dir.join("sync")).unwrap();
        let mut engine = ArchDbEngine::new(dir, dir, Box::new(OfflineFetcher)).unwrap();
        engine
            .set_options(EngineOptions {
                arch: Some("x86_64".to_string()),
                gpg_dir: PathBuf::from("/etc/pacman.d/gnupg"),
                ..EngineOptions::default()
            })
            .unwrap();
        engine.register_syncdb("core", SigLevel::Default).unwrap();
        engine.syncdbs[0].packages = repo;
        engine
    }

    fn repo_pkg(name: &str, version: &str) -> Package {
        let mut pkg = Package::new(name, version, "core");
        pkg.architecture = Some("x86_64".to_string());
        pkg
    }

    #[test]
    fn test_new_requires_directory() {
        let result = ArchDbEngine::new(Path::new("/"), Path::new("/nonexistent/db"), Box::new(OfflineFetcher));
        assert!(matches!(result.unwrap_err(), Error::InitError(_)));
    }

    #[test]
    fn test_sysupgrade_picks_newer_versions() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "");
        write_local(dir.path(), "bar", "2.0-1", "");
        let mut engine = engine_with(dir.path(), vec![repo_pkg("foo", "1.1-1"), repo_pkg("bar", "1.9-1")]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        engine.trans_prepare().unwrap();

        let add = engine.trans_add();
        assert_eq!(add.len(), 1);
        assert_eq!(add[0].name, "foo");
        assert_eq!(engine.transaction_state(), TransactionState::Prepared);

        engine.trans_release().unwrap();
        assert_eq!(engine.transaction_state(), TransactionState::Released);
    }

    #[test]
    fn test_second_transaction_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());

        engine.trans_init().unwrap();
        assert!(matches!(engine.trans_init().unwrap_err(), Error::TransactionError(_)));
        engine.trans_release().unwrap();
        engine.trans_init().unwrap();
    }

    #[test]
    fn test_release_without_transaction_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());
        assert!(engine.trans_release().is_err());
    }

    #[test]
    fn test_ignored_packages_not_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "");
        let mut engine = engine_with(dir.path(), vec![repo_pkg("foo", "1.1-1")]);
        engine.options.ignore_pkgs = vec!["foo".to_string()];

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        engine.trans_prepare().unwrap();
        assert!(engine.trans_add().is_empty());
    }

    #[test]
    fn test_ignore_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());
        engine.options.ignore_groups = vec!["gnome".to_string()];

        let mut pkg = repo_pkg("nautilus", "46.0-1");
        assert!(!engine.should_ignore(&pkg));
        pkg.groups.push("gnome".to_string());
        assert!(engine.should_ignore(&pkg));
    }

    #[test]
    fn test_replacement_goes_to_remove_set() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "oldname", "1.0-1", "");
        let mut newname = repo_pkg("newname", "2.0-1");
        newname.replaces.push(Depend::any("oldname"));
        let mut engine = engine_with(dir.path(), vec![newname]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        engine.trans_prepare().unwrap();

        assert_eq!(engine.trans_add()[0].name, "newname");
        assert_eq!(engine.trans_remove()[0].name, "oldname");
    }

    #[test]
    fn test_prepare_reports_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "");
        let mut foo = repo_pkg("foo", "1.1-1");
        foo.depends.push(Depend::parse("libbar>=2"));
        let mut engine = engine_with(dir.path(), vec![foo]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        match engine.trans_prepare() {
            Err(PrepareFailure::UnsatisfiedDeps(missing)) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].target, "foo");
                assert_eq!(missing[0].depend.to_string(), "libbar>=2");
            }
            other => panic!("expected unsatisfied dependencies, got {:?}", other),
        }
        assert_eq!(engine.transaction_state(), TransactionState::Failed);
        engine.trans_release().unwrap();
    }

    #[test]
    fn test_prepare_reports_conflict() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "");
        write_local(dir.path(), "bar", "1.0-1", "");
        let mut foo = repo_pkg("foo", "1.1-1");
        foo.conflicts.push(Depend::any("bar"));
        let mut engine = engine_with(dir.path(), vec![foo]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        match engine.trans_prepare() {
            Err(PrepareFailure::ConflictingDeps(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].package1, "foo");
                assert_eq!(conflicts[0].package2, "bar");
            }
            other => panic!("expected conflicts, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_reports_invalid_arch() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "");
        let mut foo = repo_pkg("foo", "1.1-1");
        foo.architecture = Some("aarch64".to_string());
        let mut engine = engine_with(dir.path(), vec![foo]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        assert_eq!(
            engine.trans_prepare(),
            Err(PrepareFailure::InvalidArch(vec!["foo-1.1-1".to_string()]))
        );
    }

    #[test]
    fn test_download_size_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());
        engine.options.cache_dirs = vec![cache.clone()];

        let mut pkg = repo_pkg("foo", "1.1-1");
        pkg.filename = Some("foo-1.1-1-x86_64.pkg.tar.zst".to_string());
        pkg.compressed_size = 4096;
        assert_eq!(engine.download_size(&pkg), 4096);

        fs::write(cache.join("foo-1.1-1-x86_64.pkg.tar.zst"), b"pkg").unwrap();
        assert_eq!(engine.download_size(&pkg), 0);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());
        assert!(engine.register_syncdb("core", SigLevel::Default).is_err());
        assert!(engine.register_syncdb("", SigLevel::Default).is_err());
    }

    #[test]
    fn test_update_without_servers_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with(dir.path(), Vec::new());
        assert!(engine.update_db("core", &mut NoopObserver).is_err());
    }

    #[test]
    fn test_missing_required_signature_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let db = sync_db_bytes("foo", "1.1-1");
        let mut engine = served_engine(
            dir.path(),
            StaticFetcher::new(&[("core.db", &db)]),
            SigLevel::Required,
        );

        assert!(engine.update_db("core", &mut NoopObserver).is_err());
        assert!(!dir.path().join("sync/core.db").exists());
        // Still a failure, not a stale "not modified"
        assert!(engine.update_db("core", &mut NoopObserver).is_err());

        engine.fetcher = Box::new(StaticFetcher::new(&[("core.db", &db), ("core.db.sig", b"sig")]));
        assert_eq!(engine.update_db("core", &mut NoopObserver).unwrap(), DbUpdate::Updated);
        assert!(dir.path().join("sync/core.db.sig").exists());
        assert_eq!(engine.syncdbs[0].packages.len(), 1);
        assert_eq!(engine.update_db("core", &mut NoopObserver).unwrap(), DbUpdate::UpToDate);
    }

    #[test]
    fn test_optional_signature_may_be_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db = sync_db_bytes("foo", "1.1-1");
        let mut engine = served_engine(
            dir.path(),
            StaticFetcher::new(&[("core.db", &db)]),
            SigLevel::Optional,
        );

        assert_eq!(engine.update_db("core", &mut NoopObserver).unwrap(), DbUpdate::Updated);
        assert!(dir.path().join("sync/core.db").exists());
        assert!(!dir.path().join("sync/core.db.sig").exists());
    }

    #[test]
    fn test_register_corrupt_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sync")).unwrap();
        fs::write(dir.path().join("sync/core.db"), b"\x1f\x8bgarbage").unwrap();
        let mut engine = ArchDbEngine::new(dir.path(), dir.path(), Box::new(OfflineFetcher)).unwrap();

        let result = engine.register_syncdb("core", SigLevel::Default);
        assert!(matches!(result.unwrap_err(), Error::ParseError(_)));
        assert!(engine.syncdbs().is_empty());
    }

    #[test]
    fn test_update_corrupt_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = served_engine(
            dir.path(),
            StaticFetcher::new(&[("core.db", b"\x1f\x8bgarbage")]),
            SigLevel::Never,
        );

        let result = engine.update_db("core", &mut NoopObserver);
        assert!(matches!(result.unwrap_err(), Error::ParseError(_)));
        assert!(!dir.path().join("sync/core.db").exists());
        assert!(engine.update_db("core", &mut NoopObserver).is_err());
    }

    #[test]
    fn test_empty_transaction_ignores_broken_installed_package() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "foo", "1.0-1", "%DEPENDS%\nghost\n\n");
        let mut engine = engine_with(dir.path(), vec![repo_pkg("foo", "1.0-1")]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        assert_eq!(engine.trans_prepare(), Ok(()));
        assert!(engine.trans_add().is_empty());
        assert_eq!(engine.transaction_state(), TransactionState::Prepared);
        engine.trans_release().unwrap();
    }

    #[test]
    fn test_upgrade_ignores_unrelated_broken_package() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "orphan", "1.0-1", "%DEPENDS%\nghost\n\n");
        write_local(dir.path(), "foo", "1.0-1", "");
        let mut engine = engine_with(dir.path(), vec![repo_pkg("foo", "1.1-1")]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        assert_eq!(engine.trans_prepare(), Ok(()));
        assert_eq!(engine.trans_add()[0].name, "foo");
    }

    #[test]
    fn test_upgrade_breaking_installed_dependency_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_local(dir.path(), "app", "1.0-1", "%DEPENDS%\nlibfoo<1.1\n\n");
        write_local(dir.path(), "libfoo", "1.0-1", "");
        let mut engine = engine_with(dir.path(), vec![repo_pkg("libfoo", "1.1-1")]);

        engine.trans_init().unwrap();
        engine.sync_sysupgrade(&mut NoopObserver).unwrap();
        match engine.trans_prepare() {
            Err(PrepareFailure::UnsatisfiedDeps(missing)) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].target, "app");
            }
            other => panic!("expected unsatisfied dependencies, got {:?}", other),
        }
    }
}
