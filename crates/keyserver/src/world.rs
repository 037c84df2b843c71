//! loading a configuration into a ready [`AppState`].
//!
//! every file the configuration names is read and checked here, and every
//! grant is compiled, so that a server which starts never fails a request
//! because of its own configuration.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyserver_authority::Authority;
use keyserver_grants::{CompileError, GrantsEngine, Resources};
use keyserver_state::TokenRegistry;
use keyserver_types::{AuthorityConfig, AuthorityKind, Config, Directory};
use thiserror::Error;
use tracing::{debug, info};

use crate::AppState;

/// errors from loading a configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// a static file could not be opened.
    #[error("static file {name} at {path:?} is not readable: {source}")]
    StaticFile {
        /// configured name.
        name: String,
        /// resolved path.
        path: PathBuf,
        /// underlying error.
        source: std::io::Error,
    },

    /// a static file name would escape the static directory.
    #[error("invalid static file name: {0:?}")]
    InvalidStaticName(String),

    /// an authority was configured with an empty name.
    #[error("an authority name is required")]
    EmptyAuthorityName,

    /// an authority's key or certificate file could not be read.
    #[error("cannot read {path:?} for authority {name}: {source}")]
    AuthorityFile {
        /// authority name.
        name: String,
        /// file that failed.
        path: PathBuf,
        /// underlying error.
        source: std::io::Error,
    },

    /// an authority's material did not load.
    #[error("cannot load authority {name}: {source}")]
    Authority {
        /// authority name.
        name: String,
        /// underlying error.
        source: keyserver_authority::Error,
    },

    /// the authentication authority is not configured.
    #[error("authentication authority {0} is not configured")]
    UnknownAuthenticationAuthority(String),

    /// the authentication authority cannot verify client certificates.
    #[error("authentication authority {name} is a {kind} authority, not tls")]
    AuthenticationNotTls {
        /// authority name.
        name: String,
        /// its actual kind.
        kind: AuthorityKind,
    },

    /// the account or group tables are invalid.
    #[error(transparent)]
    Directory(#[from] keyserver_types::Error),

    /// a grant did not compile.
    #[error(transparent)]
    Grants(#[from] CompileError),
}

/// load everything `config` names and compile its grants.
pub fn load(config: &Config) -> Result<AppState, LoadError> {
    let static_files = resolve_static_files(&config.static_dir, &config.static_files)?;
    let authorities = load_authorities(&config.authority_dir, &config.authorities)?;

    let authentication = authorities
        .get(&config.authentication_authority)
        .ok_or_else(|| {
            LoadError::UnknownAuthenticationAuthority(config.authentication_authority.clone())
        })?;
    let authentication = authentication
        .as_tls()
        .cloned()
        .ok_or_else(|| LoadError::AuthenticationNotTls {
            name: config.authentication_authority.clone(),
            kind: authentication.kind(),
        })?;

    let directory = Arc::new(Directory::from_config(&config.groups, &config.accounts)?);
    let registry = Arc::new(TokenRegistry::new());
    let engine = GrantsEngine::compile(
        &config.grants,
        Resources {
            directory: &directory,
            authorities: &authorities,
            registry: &registry,
        },
    )?;

    info!(
        accounts = directory.account_count(),
        groups = directory.group_count(),
        authorities = authorities.len(),
        apis = engine.len(),
        static_files = static_files.len(),
        "loaded configuration"
    );

    Ok(AppState::new(
        engine,
        directory,
        authorities,
        registry,
        authentication,
        static_files,
    ))
}

fn resolve_static_files(
    dir: &Path,
    names: &[String],
) -> Result<HashMap<String, PathBuf>, LoadError> {
    let mut files = HashMap::with_capacity(names.len());
    for name in names {
        if name.is_empty() || name.contains('/') || name == ".." || name == "." {
            return Err(LoadError::InvalidStaticName(name.clone()));
        }
        let path = dir.join(name);
        std::fs::File::open(&path).map_err(|source| LoadError::StaticFile {
            name: name.clone(),
            path: path.clone(),
            source,
        })?;
        debug!(%name, ?path, "registered static file");
        files.insert(name.clone(), path);
    }
    Ok(files)
}

fn load_authorities(
    dir: &Path,
    configs: &BTreeMap<String, AuthorityConfig>,
) -> Result<HashMap<String, Authority>, LoadError> {
    let mut authorities = HashMap::with_capacity(configs.len());
    for (name, config) in configs {
        if name.is_empty() {
            return Err(LoadError::EmptyAuthorityName);
        }
        let read = |file: &str| {
            let path = dir.join(file);
            std::fs::read(&path).map_err(|source| LoadError::AuthorityFile {
                name: name.clone(),
                path,
                source,
            })
        };
        let key = read(&config.key)?;
        let cert = read(&config.cert)?;

        let authority =
            Authority::load(config.kind, &key, &cert).map_err(|source| LoadError::Authority {
                name: name.clone(),
                source,
            })?;
        debug!(authority = %name, kind = %config.kind, "loaded authority");
        authorities.insert(name.clone(), authority);
    }
    Ok(authorities)
}
