//! caller authentication for `/apirequest`.
//!
//! a request is authenticated by the first [`Verifier`] that sees an attempt
//! in it: the `X-Bootstrap-Token` header first, then a client certificate.
//! once a verifier reports an attempt its verdict is final, even if a later
//! verifier would have accepted the request.
//!
//! ## Authentication Flow
//!
//! 1. Find the first verifier with an attempt
//! 2. Verify the attempt, yielding a principal
//! 3. Look up the account for the principal
//! 4. Reject accounts with direct authentication disabled
//! 5. Check the remote address against the account's ip limit

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use keyserver_authority::TlsAuthority;
use keyserver_state::{TokenError, TokenRegistry};
use keyserver_types::{Account, Directory};
use thiserror::Error;
use tracing::{info, warn};

use super::error::ApiError;
use crate::AppState;

/// header carrying a bootstrap token.
pub const TOKEN_HEADER: &str = "X-Bootstrap-Token";

/// der certificates the client presented, leaf first.
///
/// inserted as a request extension by whatever terminates tls in front of
/// the router.
#[derive(Debug, Clone, Default)]
pub struct PeerCertificates(pub Vec<Vec<u8>>);

/// error type for authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// no verifier found an attempt.
    #[error("no authentication method found in request")]
    NoAttempt,

    /// the token header is not valid text.
    #[error("malformed {TOKEN_HEADER} header")]
    InvalidHeader,

    /// the token could not be claimed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// the client certificate was rejected.
    #[error(transparent)]
    Certificate(#[from] keyserver_authority::Error),

    /// the principal has no account.
    #[error(transparent)]
    Directory(#[from] keyserver_types::Error),

    /// the account may only be reached through impersonation.
    #[error("account has disabled direct authentication: {0}")]
    DirectAuthDisabled(String),

    /// the request came from the wrong address.
    #[error("attempt to interact with api from wrong address: {found:?} instead of {expected}")]
    WrongAddress {
        /// the account's principal.
        principal: String,
        /// the address the account is limited to.
        expected: IpAddr,
        /// the address the request came from, if known.
        found: Option<IpAddr>,
    },
}

/// one way of authenticating a request.
pub trait Verifier: Send + Sync {
    /// short name for logs.
    fn name(&self) -> &'static str;

    /// true if the request carries credentials for this verifier.
    fn has_attempt(&self, parts: &Parts) -> bool;

    /// check the credentials and return the principal they prove.
    fn verify(&self, parts: &Parts) -> Result<String, AuthError>;
}

/// authenticates with a single-use bootstrap token.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    registry: Arc<TokenRegistry>,
}

impl TokenVerifier {
    /// verify tokens against `registry`.
    pub fn new(registry: Arc<TokenRegistry>) -> Self {
        Self { registry }
    }
}

impl Verifier for TokenVerifier {
    fn name(&self) -> &'static str {
        "token"
    }

    fn has_attempt(&self, parts: &Parts) -> bool {
        parts
            .headers
            .get(TOKEN_HEADER)
            .is_some_and(|value| !value.is_empty())
    }

    fn verify(&self, parts: &Parts) -> Result<String, AuthError> {
        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .ok_or(AuthError::NoAttempt)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;
        Ok(self.registry.claim(token)?)
    }
}

/// authenticates with a client certificate issued by a tls authority.
#[derive(Debug, Clone)]
pub struct ClientCertVerifier {
    authority: Arc<TlsAuthority>,
}

impl ClientCertVerifier {
    /// trust certificates issued by `authority`.
    pub fn new(authority: Arc<TlsAuthority>) -> Self {
        Self { authority }
    }
}

impl Verifier for ClientCertVerifier {
    fn name(&self) -> &'static str {
        "client-certificate"
    }

    fn has_attempt(&self, parts: &Parts) -> bool {
        parts
            .extensions
            .get::<PeerCertificates>()
            .is_some_and(|certs| !certs.0.is_empty())
    }

    fn verify(&self, parts: &Parts) -> Result<String, AuthError> {
        let certs = parts
            .extensions
            .get::<PeerCertificates>()
            .ok_or(AuthError::NoAttempt)?;
        Ok(self.authority.verify_client(&certs.0)?)
    }
}

/// resolve the account a request authenticates as.
pub fn authenticate(
    verifiers: &[Arc<dyn Verifier>],
    directory: &Directory,
    parts: &Parts,
) -> Result<Arc<Account>, AuthError> {
    let verifier = verifiers
        .iter()
        .find(|v| v.has_attempt(parts))
        .ok_or(AuthError::NoAttempt)?;
    let principal = verifier.verify(parts)?;
    let account = directory.account(&principal)?;

    if account.disable_direct_auth {
        return Err(AuthError::DirectAuthDisabled(principal));
    }
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if let Some(expected) = account.limit_ip
        && !account.allows_address(remote)
    {
        return Err(AuthError::WrongAddress {
            principal,
            expected,
            found: remote,
        });
    }

    info!(%principal, method = verifier.name(), "authenticated request");
    Ok(account)
}

/// the account an `/apirequest` call authenticated as.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Arc<Account>);

impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&state.verifiers, &state.directory, parts)
            .map(AuthenticatedAccount)
            .map_err(|err| {
                warn!(error = %err, "authentication failed");
                ApiError::Unauthorized
            })
    }
}
