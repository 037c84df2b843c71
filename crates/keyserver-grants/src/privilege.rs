//! privilege kinds and compiled privileges.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use keyserver_authority::{SshAuthority, StaticAuthority, TlsAuthority};
use keyserver_state::TokenRegistry;
use keyserver_types::{Account, AuthorityKind, Directory, Group};

use crate::error::{CompileError, PrivilegeError};

/// a grant parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// group of accounts the privilege may act on.
    Scope,
    /// authority to sign with or expose.
    Authority,
    /// host rather than user certificates.
    IsHost,
    /// certificate or token lifespan.
    Lifespan,
    /// certificate common name or ssh key id.
    CommonName,
    /// subject alternative names or ssh principals.
    AllowedNames,
    /// literal response contents.
    Contents,
}

impl Param {
    /// every parameter, in display order.
    pub const ALL: [Param; 7] = [
        Param::Scope,
        Param::Authority,
        Param::IsHost,
        Param::Lifespan,
        Param::CommonName,
        Param::AllowedNames,
        Param::Contents,
    ];

    /// the configuration key for this parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Param::Scope => "scope",
            Param::Authority => "authority",
            Param::IsHost => "is_host",
            Param::Lifespan => "lifespan",
            Param::CommonName => "common_name",
            Param::AllowedNames => "allowed_names",
            Param::Contents => "contents",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// the six privilege kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeKind {
    /// sign a tls certificate from a csr.
    SignTls,
    /// sign ssh certificates for a blob of public keys.
    SignSsh,
    /// issue a bootstrap token for an account in scope.
    BootstrapAccount,
    /// act as another account in scope for the rest of the batch.
    Impersonate,
    /// return fixed contents.
    ConstructConfiguration,
    /// return a static authority's secret key.
    FetchKey,
}

impl PrivilegeKind {
    /// parameters that must be present.
    pub fn required(self) -> &'static [Param] {
        match self {
            Self::SignTls => &[Param::Authority, Param::Lifespan, Param::CommonName],
            Self::SignSsh => &[
                Param::Authority,
                Param::Lifespan,
                Param::CommonName,
                Param::AllowedNames,
            ],
            Self::BootstrapAccount => &[Param::Scope, Param::Lifespan],
            Self::Impersonate => &[Param::Scope],
            Self::ConstructConfiguration => &[Param::Contents],
            Self::FetchKey => &[Param::Authority],
        }
    }

    /// parameters that may be present.
    pub fn optional(self) -> &'static [Param] {
        match self {
            Self::SignTls => &[Param::IsHost, Param::AllowedNames],
            Self::SignSsh => &[Param::IsHost],
            _ => &[],
        }
    }

    /// the authority kind this privilege uses, if any.
    pub fn authority_kind(self) -> Option<AuthorityKind> {
        match self {
            Self::SignTls => Some(AuthorityKind::Tls),
            Self::SignSsh => Some(AuthorityKind::Ssh),
            Self::FetchKey => Some(AuthorityKind::Static),
            _ => None,
        }
    }

    /// the configuration name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignTls => "sign-tls",
            Self::SignSsh => "sign-ssh",
            Self::BootstrapAccount => "bootstrap-account",
            Self::Impersonate => "impersonate",
            Self::ConstructConfiguration => "construct-configuration",
            Self::FetchKey => "fetch-key",
        }
    }
}

impl fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivilegeKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign-tls" => Ok(Self::SignTls),
            "sign-ssh" => Ok(Self::SignSsh),
            "bootstrap-account" => Ok(Self::BootstrapAccount),
            "impersonate" => Ok(Self::Impersonate),
            "construct-configuration" => Ok(Self::ConstructConfiguration),
            "fetch-key" => Ok(Self::FetchKey),
            other => Err(CompileError::UnknownKind(other.to_string())),
        }
    }
}

/// the mutable state of one request batch.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// the account operations currently act as.
    pub account: Arc<Account>,
}

impl OperationContext {
    /// start a batch acting as `account`.
    pub fn new(account: Arc<Account>) -> Self {
        Self { account }
    }

    /// the principal operations currently act as.
    pub fn principal(&self) -> &str {
        self.account.principal.as_str()
    }
}

/// a compiled privilege: all parameters validated and all templates expanded.
#[derive(Debug, Clone)]
pub enum Privilege {
    /// sign a tls certificate.
    SignTls {
        /// issuing authority.
        authority: Arc<TlsAuthority>,
        /// issue a host certificate.
        is_host: bool,
        /// certificate validity.
        lifespan: Duration,
        /// subject common name.
        common_name: String,
        /// subject alternative names.
        allowed_names: Vec<String>,
    },
    /// sign ssh certificates.
    SignSsh {
        /// issuing authority.
        authority: Arc<SshAuthority>,
        /// issue host certificates.
        is_host: bool,
        /// certificate validity.
        lifespan: Duration,
        /// certificate key id.
        key_id: String,
        /// valid principals.
        principals: Vec<String>,
    },
    /// issue a bootstrap token.
    BootstrapAccount {
        /// accounts that may be bootstrapped.
        scope: Arc<Group>,
        /// token lifespan.
        lifespan: Duration,
        /// where tokens are stored.
        registry: Arc<TokenRegistry>,
    },
    /// switch the batch to another account.
    Impersonate {
        /// accounts that may be impersonated.
        scope: Arc<Group>,
        /// where target accounts are looked up.
        directory: Arc<Directory>,
    },
    /// return fixed contents.
    ConstructConfiguration {
        /// the expanded contents.
        contents: String,
    },
    /// return a secret key.
    FetchKey {
        /// the authority holding the key.
        authority: Arc<StaticAuthority>,
    },
}

impl Privilege {
    /// the kind of this privilege.
    pub fn kind(&self) -> PrivilegeKind {
        match self {
            Self::SignTls { .. } => PrivilegeKind::SignTls,
            Self::SignSsh { .. } => PrivilegeKind::SignSsh,
            Self::BootstrapAccount { .. } => PrivilegeKind::BootstrapAccount,
            Self::Impersonate { .. } => PrivilegeKind::Impersonate,
            Self::ConstructConfiguration { .. } => PrivilegeKind::ConstructConfiguration,
            Self::FetchKey { .. } => PrivilegeKind::FetchKey,
        }
    }

    /// run the privilege on `body`.
    ///
    /// only `impersonate` modifies `ctx`.
    pub fn invoke(&self, ctx: &mut OperationContext, body: &str) -> Result<String, PrivilegeError> {
        match self {
            Self::SignTls {
                authority,
                is_host,
                lifespan,
                common_name,
                allowed_names,
            } => Ok(authority.sign(body, *is_host, *lifespan, common_name, allowed_names)?),

            Self::SignSsh {
                authority,
                is_host,
                lifespan,
                key_id,
                principals,
            } => Ok(authority.sign(body, *is_host, *lifespan, key_id, principals)?),

            Self::BootstrapAccount {
                scope,
                lifespan,
                registry,
            } => {
                if !scope.has_member(body) {
                    return Err(PrivilegeError::OutOfScope(body.to_string()));
                }
                Ok(registry.grant_token(body, *lifespan)?)
            }

            Self::Impersonate { scope, directory } => {
                if !scope.has_member(body) {
                    return Err(PrivilegeError::OutOfScope(body.to_string()));
                }
                ctx.account = directory.account(body)?;
                Ok(String::new())
            }

            Self::ConstructConfiguration { contents } => {
                expect_empty(body, PrivilegeKind::ConstructConfiguration)?;
                Ok(contents.clone())
            }

            Self::FetchKey { authority } => {
                expect_empty(body, PrivilegeKind::FetchKey)?;
                String::from_utf8(authority.private_key().to_vec())
                    .map_err(|_| PrivilegeError::BinaryKey)
            }
        }
    }
}

fn expect_empty(body: &str, kind: PrivilegeKind) -> Result<(), PrivilegeError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(PrivilegeError::UnexpectedBody(kind))
    }
}
