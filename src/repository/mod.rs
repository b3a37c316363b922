// src/repository/mod.rs

//! Repository registration and metadata transport
//!
//! This module provides functionality for:
//! - Resolving server URL templates (`$repo`, `$arch`)
//! - Registering configured repositories with the engine
//! - Downloading repository databases ([`client`])
//! - Parsing sync and local databases ([`archive`])

pub mod archive;
pub mod client;

use crate::config::RepositoryConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use tracing::debug;

/// Substitute `$repo` and `$arch` in a server URL template
pub fn resolve_server(template: &str, repository: &str, arch: Option<&str>) -> Result<String> {
    let server = template.replace("$repo", repository);

    match arch {
        Some(arch) => Ok(server.replace("$arch", arch)),
        None if server.contains("$arch") => Err(Error::ConfigError(format!(
            "Server {} contains the $arch variable, but no Architecture was defined",
            template
        ))),
        None => Ok(server),
    }
}

/// Register every configured repository and its servers with the engine
///
/// Stops at the first failure; nothing is rolled back.
pub fn register_repositories<E: Engine + ?Sized>(
    engine: &mut E,
    repositories: &[RepositoryConfig],
    arch: Option<&str>,
) -> Result<()> {
    for repo in repositories {
        debug!("register {}", repo.name);
        engine
            .register_syncdb(&repo.name, repo.sig_level)
            .map_err(|e| Error::RegisterError {
                repo: repo.name.clone(),
                message: e.to_string(),
            })?;

        for template in &repo.servers {
            let server = resolve_server(template, &repo.name, arch)?;

            debug!("add server {} into {}", server, repo.name);
            engine
                .add_server(&repo.name, &server)
                .map_err(|e| Error::RegisterError {
                    repo: repo.name.clone(),
                    message: format!("could not add server {}: {}", server, e),
                })?;
        }
    }

    Ok(())
}
