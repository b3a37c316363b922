// src/mirror.rs

//! Unprivileged shadow of the package database
//!
//! The shadow lives in a directory owned by the current user:
//!
//! - `<mirror>/local` is a symlink to the real installed-package index
//! - `<mirror>/sync/` holds copies of the real repository databases
//! - `<mirror>/sync/<file>.ts` are staleness markers for `.db`/`.db.sig`
//!   copies, zero-length files whose mtime is the source mtime at the time
//!   of the last copy
//!
//! A shadow at a fixed path is reused across runs as long as its `local`
//! symlink still points into the same real database path. On reuse, a
//! database copy is only refreshed when its source changed since it was
//! last copied; otherwise the copy (which may have been synced since) is
//! kept as is.

use crate::error::{Error, Result};
use filetime::FileTime;
use std::collections::HashSet;
use std::fs::{self, DirBuilder, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, symlink};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest path accepted for anything inside the mirror
pub const PATH_MAX: usize = 4096;

const MARKER_SUFFIX: &str = "ts";
const TEMP_PREFIX: &str = "pacshadow-";

/// Repositories copied fresh since the shadow was last recreated
///
/// The sync step adds repositories it actually updated; a later mirror
/// refresh that copies a fresh database for one of them removes it again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedDbSet {
    names: HashSet<String>,
}

impl SyncedDbSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository, returns false if it was already present
    pub fn insert(&mut self, name: &str) -> bool {
        if self.names.contains(name) {
            return false;
        }
        self.names.insert(name.to_string())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of [`MirrorStore::establish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    pub path: PathBuf,
    /// Whether an existing shadow was kept instead of recreated
    pub reused: bool,
}

/// Kind of file found in a sync directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKind {
    Database,
    Signature,
    Other,
}

impl MetadataKind {
    fn of(file_name: &str) -> Self {
        if file_name.ends_with(".db") {
            MetadataKind::Database
        } else if file_name.ends_with(".db.sig") {
            MetadataKind::Signature
        } else {
            MetadataKind::Other
        }
    }

    fn is_tracked(&self) -> bool {
        !matches!(self, MetadataKind::Other)
    }
}

/// Owner of the shadow directory across sessions
#[derive(Debug, Default)]
pub struct MirrorStore {
    fixed_path: Option<PathBuf>,
    current: Option<PathBuf>,
    synced: SyncedDbSet,
}

impl MirrorStore {
    /// Store that creates a new ephemeral directory on every establish
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps its shadow at `path` and reuses it when valid
    pub fn with_fixed_path(path: impl Into<PathBuf>) -> Self {
        Self {
            fixed_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Path of the current shadow, if one was established
    pub fn path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn fixed_path(&self) -> Option<&Path> {
        self.fixed_path.as_deref()
    }

    pub fn synced(&self) -> &SyncedDbSet {
        &self.synced
    }

    pub fn synced_mut(&mut self) -> &mut SyncedDbSet {
        &mut self.synced
    }

    /// Create or reuse the shadow of `real_dbpath`
    ///
    /// Any failure (including a single file copy) fails the whole call; a
    /// freshly created shadow is removed again in that case.
    pub fn establish(&mut self, real_dbpath: &Path) -> Result<Established> {
        check_length(&real_dbpath.join("sync"))?;

        if let Some(fixed) = self.fixed_path.clone() {
            debug!("checking local db {}", fixed.display());

            if is_reusable(&fixed, real_dbpath)? {
                info!("Reusing database mirror {}", fixed.display());
                self.current = Some(fixed.clone());
                refresh_sync_dir(&fixed, real_dbpath, false, &mut self.synced)?;
                return Ok(Established {
                    path: fixed,
                    reused: true,
                });
            }

            self.synced.clear();
            DirBuilder::new().mode(0o700).create(&fixed).map_err(|e| {
                Error::MirrorError(format!("Unable to create folder {}: {}", fixed.display(), e))
            })?;
            self.populate(&fixed, real_dbpath)?;
            return Ok(Established {
                path: fixed,
                reused: false,
            });
        }

        if let Some(previous) = self.current.take() {
            debug!("removing previous mirror {}", previous.display());
            if let Err(e) = fs::remove_dir_all(&previous) {
                warn!("Unable to remove {}: {}", previous.display(), e);
            }
        }

        self.synced.clear();
        let folder = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(|e| Error::MirrorError(format!("Unable to create temp folder: {}", e)))?
            .keep();
        debug!("created tmp folder {}", folder.display());

        self.populate(&folder, real_dbpath)?;
        Ok(Established {
            path: folder,
            reused: false,
        })
    }

    /// Fill a freshly created directory; removes it again on failure
    fn populate(&mut self, folder: &Path, real_dbpath: &Path) -> Result<()> {
        match create_layout(folder, real_dbpath)
            .and_then(|()| refresh_sync_dir(folder, real_dbpath, true, &mut self.synced))
        {
            Ok(()) => {
                info!("Created database mirror {}", folder.display());
                self.current = Some(folder.to_path_buf());
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(folder) {
                    warn!("Unable to remove {}: {}", folder.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    /// Forget the current shadow, deleting it unless `keep` is set
    pub fn remove(&mut self, keep: bool) -> Result<()> {
        let Some(path) = self.current.take() else {
            return Ok(());
        };

        if keep {
            debug!("keeping mirror {}", path.display());
            return Ok(());
        }

        info!("Removing database mirror {}", path.display());
        fs::remove_dir_all(&path).map_err(|e| {
            Error::IoError(format!("Failed to remove {}: {}", path.display(), e))
        })
    }
}

fn check_length(path: &Path) -> Result<()> {
    if path.as_os_str().len() >= PATH_MAX {
        return Err(Error::PathTooLong(path.to_path_buf()));
    }
    Ok(())
}

fn marker_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".");
    name.push(MARKER_SUFFIX);
    PathBuf::from(name)
}

/// Whether an existing directory is a shadow of `real_dbpath`
///
/// Anything at `path` that is not a valid shadow is deleted.
fn is_reusable(path: &Path, real_dbpath: &Path) -> Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("..doesn't exist");
            return Ok(false);
        }
        Err(e) => {
            return Err(Error::MirrorError(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            )));
        }
    };

    if !metadata.is_dir() {
        debug!("..not a folder, replacing it");
        fs::remove_file(path).map_err(|e| {
            Error::MirrorError(format!("Failed to remove {}: {}", path.display(), e))
        })?;
        return Ok(false);
    }

    let link = path.join("local");
    check_length(&link)?;

    let valid = match fs::read_link(&link) {
        Ok(target) => {
            let same = target.file_name().is_some_and(|n| n == "local")
                && target.parent() == Some(real_dbpath);
            if !same {
                debug!("different dbpath ({} vs {})", target.display(), real_dbpath.display());
            }
            same
        }
        Err(e) => {
            debug!("symlink 'local' not found or invalid: {}", e);
            false
        }
    };

    let valid = valid && {
        let has_sync = path.join("sync").is_dir();
        if !has_sync {
            debug!("sync folder missing");
        }
        has_sync
    };

    if !valid {
        debug!("removing {}", path.display());
        fs::remove_dir_all(path).map_err(|e| {
            Error::MirrorError(format!("Failed to remove {}: {}", path.display(), e))
        })?;
    }

    Ok(valid)
}

/// Create the `local` symlink and the empty `sync` directory
fn create_layout(folder: &Path, real_dbpath: &Path) -> Result<()> {
    let target = real_dbpath.join("local");
    let link = folder.join("local");
    check_length(&target)?;
    check_length(&link)?;

    symlink(&target, &link).map_err(|e| {
        Error::MirrorError(format!("Unable to create symlink {}: {}", link.display(), e))
    })?;
    debug!("created symlink {}", link.display());

    let sync_dir = folder.join("sync");
    check_length(&sync_dir)?;
    DirBuilder::new().mode(0o700).create(&sync_dir).map_err(|e| {
        Error::MirrorError(format!("Unable to create folder {}: {}", sync_dir.display(), e))
    })?;
    debug!("created folder {}", sync_dir.display());

    Ok(())
}

/// Copy the real sync directory's regular files into the shadow
///
/// With `fresh` set everything is copied. Otherwise `.db`/`.db.sig` copies
/// are kept when their marker matches the source's mtime.
fn refresh_sync_dir(
    folder: &Path,
    real_dbpath: &Path,
    fresh: bool,
    synced: &mut SyncedDbSet,
) -> Result<()> {
    let source_dir = real_dbpath.join("sync");
    let entries = fs::read_dir(&source_dir).map_err(|e| {
        Error::MirrorError(format!("Unable to open folder {}: {}", source_dir.display(), e))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::MirrorError(format!("Unable to read folder {}: {}", source_dir.display(), e))
        })?;
        let file_name = entry.file_name();
        let source = entry.path();
        check_length(&source)?;

        let source_meta = fs::metadata(&source).map_err(|e| {
            Error::MirrorError(format!("Unable to stat {}: {}", source.display(), e))
        })?;
        if !source_meta.is_file() {
            debug!("ignoring non-regular file: {}", source.display());
            continue;
        }

        let dest = folder.join("sync").join(&file_name);
        let marker = marker_path(&dest);
        check_length(&marker)?;

        let name = file_name.to_string_lossy();
        let kind = MetadataKind::of(&name);

        if !fresh && kind.is_tracked() && is_fresh(&dest, &marker, &source_meta) {
            debug!("keeping current {}", dest.display());
            continue;
        }

        copy_file(&source, &dest)?;

        if kind.is_tracked() {
            stamp(&dest, &marker, &source_meta);
        }

        if kind == MetadataKind::Database {
            let repo = name.strip_suffix(".db").unwrap_or(&name);
            if synced.remove(repo) {
                debug!("{} no longer pending as synced", repo);
            }
        }
    }

    Ok(())
}

/// A copy is fresh when it exists and its marker carries the source mtime
fn is_fresh(dest: &Path, marker: &Path, source_meta: &fs::Metadata) -> bool {
    if fs::metadata(dest).is_err() {
        return false;
    }

    match fs::metadata(marker) {
        Ok(marker_meta) => {
            FileTime::from_last_modification_time(&marker_meta).unix_seconds()
                == FileTime::from_last_modification_time(source_meta).unix_seconds()
        }
        Err(_) => false,
    }
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    debug!("copying {} to {}", source.display(), dest.display());

    fs::read(source)
        .map_err(Error::from)
        .and_then(|contents| write_atomic(dest, &contents))
        .map_err(|e| Error::MirrorError(format!("Copy failed for {}: {}", source.display(), e)))
}

/// Give the copy the source's times and record them in its marker
///
/// Failures only cost a redundant download later, so they are logged.
fn stamp(dest: &Path, marker: &Path, source_meta: &fs::Metadata) {
    let atime = FileTime::from_last_access_time(source_meta);
    let mtime = FileTime::from_last_modification_time(source_meta);

    match filetime::set_file_times(dest, atime, mtime) {
        Ok(()) => debug!("updated time for {}", dest.display()),
        Err(e) => warn!("Unable to change time of {}: {}", dest.display(), e),
    }

    if let Err(e) = OpenOptions::new().create(true).append(true).open(marker) {
        warn!("Unable to create {}: {}", marker.display(), e);
        return;
    }

    match filetime::set_file_times(marker, atime, mtime) {
        Ok(()) => debug!("updated time for {}", marker.display()),
        Err(e) => warn!("Unable to change time of {}: {}", marker.display(), e),
    }
}

/// Write a file through a temporary sibling and an atomic rename
pub(crate) fn write_atomic(dest_path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = dest_path.with_extension("part");

    fs::write(&temp_path, data).map_err(|e| {
        Error::IoError(format!("Failed to write {}: {}", temp_path.display(), e))
    })?;

    fs::rename(&temp_path, dest_path).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            temp_path.display(),
            dest_path.display(),
            e
        ))
    })
}
