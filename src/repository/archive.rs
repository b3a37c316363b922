// src/repository/archive.rs

//! Arch Linux database parsing
//!
//! Sync databases are tarballs (plain, gzip, xz or zstd) holding one
//! `<name>-<version>/desc` entry per package in a text format with
//! `%FIELD%` markers; older databases split dependencies into a separate
//! `depends` entry. The installed-package index uses the same `desc`
//! format, one directory per package.

use crate::engine::Package;
use crate::error::{Error, Result};
use crate::version::Depend;
use flate2::read::GzDecoder;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, info};
use xz2::read::XzDecoder;

/// Repository name given to installed packages
pub const LOCAL_REPOSITORY: &str = "local";

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

type Fields = HashMap<String, Vec<String>>;

/// Parse a desc file into its `%FIELD%` sections
pub fn parse_desc(content: &str) -> Fields {
    let mut fields = HashMap::new();
    let mut current_field: Option<String> = None;
    let mut values: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.len() > 2 && trimmed.starts_with('%') && trimmed.ends_with('%') {
            if let Some(field) = current_field.take() {
                fields.insert(field, std::mem::take(&mut values));
            }
            current_field = Some(trimmed[1..trimmed.len() - 1].to_string());
        } else if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }

    if let Some(field) = current_field {
        fields.insert(field, values);
    }

    fields
}

fn first<'a>(fields: &'a Fields, key: &str) -> Option<&'a String> {
    fields.get(key).and_then(|v| v.first())
}

fn depends(fields: &Fields, key: &str) -> Vec<Depend> {
    fields
        .get(key)
        .map(|values| values.iter().map(|v| Depend::parse(v)).collect())
        .unwrap_or_default()
}

/// Build a package from desc fields; `extra` holds a separate depends entry
pub fn package_from_fields(fields: &Fields, extra: Option<&Fields>, repository: &str) -> Result<Package> {
    let name = first(fields, "NAME")
        .ok_or_else(|| Error::ParseError("Missing %NAME% field".to_string()))?;
    let version = first(fields, "VERSION")
        .ok_or_else(|| Error::ParseError(format!("Missing %VERSION% field for {}", name)))?;

    let mut package = Package::new(name.as_str(), version.as_str(), repository);
    package.description = first(fields, "DESC").cloned().unwrap_or_default();
    package.architecture = first(fields, "ARCH").cloned();
    package.filename = first(fields, "FILENAME").cloned();
    // Local databases call it SIZE, sync databases ISIZE
    package.installed_size = first(fields, "ISIZE")
        .or_else(|| first(fields, "SIZE"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    package.compressed_size = first(fields, "CSIZE").and_then(|s| s.parse().ok()).unwrap_or(0);
    package.groups = fields.get("GROUPS").cloned().unwrap_or_default();

    for source in std::iter::once(fields).chain(extra) {
        package.depends.extend(depends(source, "DEPENDS"));
        package.conflicts.extend(depends(source, "CONFLICTS"));
        package.provides.extend(depends(source, "PROVIDES"));
        package.replaces.extend(depends(source, "REPLACES"));
    }

    Ok(package)
}

/// Decompress a database (handles plain tar, .gz, .xz or .zst)
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();

    if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress gzip database: {}", e)))?;
        debug!("Decompressed gzip database");
    } else if data.starts_with(&XZ_MAGIC) {
        XzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress xz database: {}", e)))?;
        debug!("Decompressed xz database");
    } else if data.starts_with(&ZSTD_MAGIC) {
        decompressed = zstd::decode_all(data)
            .map_err(|e| Error::ParseError(format!("Failed to decompress zstd database: {}", e)))?;
        debug!("Decompressed zstd database");
    } else {
        decompressed.extend_from_slice(data);
    }

    Ok(decompressed)
}

/// Read every package of a sync database file
pub fn read_sync_db(path: &Path, repository: &str) -> Result<Vec<Package>> {
    let data = fs::read(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let decompressed = decompress(&data)?;

    // Entries are grouped by their package directory
    let mut descs: BTreeMap<String, Fields> = BTreeMap::new();
    let mut extras: HashMap<String, Fields> = HashMap::new();

    let mut archive = Archive::new(decompressed.as_slice());
    let entries = archive
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", path.display(), e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| Error::ParseError(format!("Failed to read tarball entry: {}", e)))?;

        let entry_path = entry
            .path()
            .map_err(|e| Error::ParseError(format!("Invalid path in tarball: {}", e)))?
            .to_string_lossy()
            .into_owned();

        let Some((dir, file)) = entry_path.trim_end_matches('/').rsplit_once('/') else {
            continue;
        };
        if file != "desc" && file != "depends" {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", entry_path, e)))?;

        let fields = parse_desc(&content);
        if file == "desc" {
            descs.insert(dir.to_string(), fields);
        } else {
            extras.insert(dir.to_string(), fields);
        }
    }

    let packages = descs
        .iter()
        .map(|(dir, fields)| package_from_fields(fields, extras.get(dir), repository))
        .collect::<Result<Vec<_>>>()?;

    info!("Parsed {} packages from {}", packages.len(), path.display());
    Ok(packages)
}

/// Read the installed-package index, sorted by package name
pub fn read_local_db(local_dir: &Path) -> Result<Vec<Package>> {
    let entries = match fs::read_dir(local_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No local database at {}", local_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(Error::IoError(format!(
                "Unable to open folder {}: {}",
                local_dir.display(),
                e
            )));
        }
    };

    let mut packages = Vec::new();
    for entry in entries {
        let entry = entry?;
        let desc_path = entry.path().join("desc");
        if !desc_path.is_file() {
            continue;
        }

        let content = fs::read_to_string(&desc_path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", desc_path.display(), e))
        })?;
        let extra = fs::read_to_string(entry.path().join("depends"))
            .ok()
            .map(|c| parse_desc(&c));

        packages.push(package_from_fields(&parse_desc(&content), extra.as_ref(), LOCAL_REPOSITORY)?);
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Loaded {} installed packages", packages.len());
    Ok(packages)
}
