// src/repository/client.rs

//! Transport for repository database downloads
//!
//! The engine only sees the [`Fetcher`] trait, so callers can plug in
//! their own transport. [`HttpFetcher`] handles `http(s)://` with retries
//! and conditional requests, and `file://` straight from disk.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP date format (RFC 7231 IMF-fixdate)
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Result of a conditional download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote file is not newer than the given time
    NotModified,
    Fetched {
        data: Vec<u8>,
        last_modified: Option<SystemTime>,
    },
}

/// Pluggable download transport
pub trait Fetcher {
    /// Download `url` unless it is not newer than `if_modified_since`
    fn fetch(&self, url: &str, if_modified_since: Option<SystemTime>) -> Result<FetchOutcome>;
}

/// HTTP client wrapper with retry support
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn fetch_http(&self, url: &str, if_modified_since: Option<SystemTime>) -> Result<FetchOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut request = self.client.get(url);
            if let Some(since) = if_modified_since {
                request = request.header(IF_MODIFIED_SINCE, format_http_date(since));
            }

            match request.send() {
                Ok(response) => {
                    if response.status() == StatusCode::NOT_MODIFIED {
                        debug!("{} not modified", url);
                        return Ok(FetchOutcome::NotModified);
                    }

                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let last_modified = response
                        .headers()
                        .get(LAST_MODIFIED)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_http_date);

                    let data = response.bytes().map_err(|e| {
                        Error::DownloadError(format!("Failed to read response from {}: {}", url, e))
                    })?;

                    info!("Downloaded {} ({} bytes)", url, data.len());
                    return Ok(FetchOutcome::Fetched {
                        data: data.to_vec(),
                        last_modified,
                    });
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, if_modified_since: Option<SystemTime>) -> Result<FetchOutcome> {
        match url.strip_prefix("file://") {
            Some(path) => fetch_file(Path::new(path), if_modified_since),
            None => self.fetch_http(url, if_modified_since),
        }
    }
}

/// Serve a local file with the same conditional semantics as HTTP
pub fn fetch_file(path: &Path, if_modified_since: Option<SystemTime>) -> Result<FetchOutcome> {
    let metadata = fs::metadata(path).map_err(|e| {
        Error::DownloadError(format!("Failed to retrieve {}: {}", path.display(), e))
    })?;
    let modified = metadata.modified()?;

    // HTTP dates have second precision
    if let Some(since) = if_modified_since {
        if unix_seconds(modified) <= unix_seconds(since) {
            debug!("{} not modified", path.display());
            return Ok(FetchOutcome::NotModified);
        }
    }

    let data = fs::read(path).map_err(|e| {
        Error::DownloadError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(FetchOutcome::Fetched {
        data,
        last_modified: Some(modified),
    })
}

fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}
