// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for pacshadow
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// A path exceeded the platform limit
    #[error("Internal error: Path too long: {}", .0.display())]
    PathTooLong(PathBuf),

    /// The shadow database could not be set up
    #[error("Unable to create local copy of database: {0}")]
    MirrorError(String),

    /// Invalid configuration (server templates, missing architecture, ...)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed database or configuration contents
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Transport failure while fetching repository metadata
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Engine refused a repository or one of its servers
    #[error("Could not register database {repo}: {message}")]
    RegisterError { repo: String, message: String },

    /// Metadata refresh failed for a repository
    #[error("Failed to update {repo}: {message}")]
    SyncError { repo: String, message: String },

    /// Operation needs at least one registered repository
    #[error("no repositories configured")]
    NoRepositories,

    /// Transaction could not be opened, computed or released
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Transaction preparation failed (dependency issues, conflicts, ...)
    #[error("Failed to prepare transaction: {reason}\n{details}")]
    PrepareFailed { reason: String, details: String },

    /// Lookup for a required entity failed
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Engine initialization error
    #[error("Failed to initialize engine: {0}")]
    InitError(String),
}

impl Error {
    /// Whether this error comes from transaction preparation.
    ///
    /// Such failures mean upgrades exist but the list of packages cannot
    /// be compiled (missing dependencies, conflicts, bad architectures).
    pub fn is_dependency_issue(&self) -> bool {
        matches!(self, Error::PrepareFailed { .. })
    }
}

/// Result type alias using pacshadow's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_failed_message() {
        let err = Error::PrepareFailed {
            reason: "could not satisfy dependencies".to_string(),
            details: "- foo requires bar>=2\n".to_string(),
        };
        assert!(err.is_dependency_issue());
        assert_eq!(
            err.to_string(),
            "Failed to prepare transaction: could not satisfy dependencies\n- foo requires bar>=2\n"
        );
    }

    #[test]
    fn test_other_errors_are_not_dependency_issues() {
        assert!(!Error::NoRepositories.is_dependency_issue());
        assert_eq!(Error::NoRepositories.to_string(), "no repositories configured");
    }
}
