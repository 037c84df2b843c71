//! keyserver library - http handlers and application setup.
//!
//! this crate provides the http surface of the keyserver:
//! - [`handlers`]: `/apirequest`, `/pub/{authority}` and `/static/{name}`
//! - [`world`]: turning a [`Config`](keyserver_types::Config) into a ready [`AppState`]
//! - [`listener`]: tls termination feeding client certificates to the handlers
//! - [`cli`]: command-line interface implementation

#![warn(missing_docs)]

/// command-line interface implementation.
pub mod cli;
/// http request handlers.
pub mod handlers;
pub mod listener;
pub mod world;

pub use handlers::{ClientCertVerifier, PeerCertificates, TokenVerifier, Verifier};
pub use world::{LoadError, load};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use keyserver_authority::{Authority, TlsAuthority};
use keyserver_grants::GrantsEngine;
use keyserver_state::TokenRegistry;
use keyserver_types::Directory;

/// shared state for every request.
///
/// everything except the token registry is immutable once built.
#[derive(Clone)]
pub struct AppState {
    /// compiled grants.
    pub engine: GrantsEngine,
    /// accounts and groups.
    pub directory: Arc<Directory>,
    /// authorities by name, for `/pub`.
    pub authorities: Arc<HashMap<String, Authority>>,
    /// outstanding bootstrap tokens.
    pub registry: Arc<TokenRegistry>,
    /// authentication methods, in the order they are tried.
    pub verifiers: Arc<[Arc<dyn Verifier>]>,
    /// static file paths by name.
    pub static_files: Arc<HashMap<String, PathBuf>>,
}

impl AppState {
    /// assemble state from loaded parts.
    ///
    /// bootstrap tokens are tried before client certificates issued by
    /// `authentication`.
    pub fn new(
        engine: GrantsEngine,
        directory: Arc<Directory>,
        authorities: HashMap<String, Authority>,
        registry: Arc<TokenRegistry>,
        authentication: Arc<TlsAuthority>,
        static_files: HashMap<String, PathBuf>,
    ) -> Self {
        let verifiers: Vec<Arc<dyn Verifier>> = vec![
            Arc::new(TokenVerifier::new(registry.clone())),
            Arc::new(ClientCertVerifier::new(authentication)),
        ];
        Self {
            engine,
            directory,
            authorities: Arc::new(authorities),
            registry,
            verifiers: verifiers.into(),
            static_files: Arc::new(static_files),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("accounts", &self.directory.account_count())
            .field("authorities", &self.authorities.len())
            .field("registry", &self.registry)
            .field("static_files", &self.static_files.len())
            .finish_non_exhaustive()
    }
}

/// build the router over `state`.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/apirequest", post(handlers::apirequest))
        .route("/pub/{authority}", get(handlers::public_key))
        .route("/static/{name}", get(handlers::static_file))
        .with_state(state)
}
