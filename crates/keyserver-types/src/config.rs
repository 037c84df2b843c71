//! configuration types for the keyserver

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// main configuration for the keyserver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// address to bind the http server to.
    pub listen_addr: String,

    /// directory that authority key and certificate paths are relative to.
    pub authority_dir: PathBuf,

    /// directory that static file names are relative to.
    pub static_dir: PathBuf,

    /// name of the tls authority whose client certificates authenticate callers.
    pub authentication_authority: String,

    /// the server's own tls identity. without it the api is served as
    /// plain http and only bootstrap tokens can authenticate.
    pub server_tls: Option<ServerTlsConfig>,

    /// files served unauthenticated from `static_dir`.
    pub static_files: Vec<String>,

    /// signing authorities by name.
    pub authorities: BTreeMap<String, AuthorityConfig>,

    /// groups by name.
    pub groups: BTreeMap<String, GroupConfig>,

    /// known accounts.
    pub accounts: Vec<AccountConfig>,

    /// grants by api name.
    pub grants: BTreeMap<String, GrantConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:20557".to_string(),
            authority_dir: PathBuf::from("/etc/keyserver/authorities"),
            static_dir: PathBuf::from("/etc/keyserver/static"),
            authentication_authority: "clustertls".to_string(),
            server_tls: None,
            static_files: Vec::new(),
            authorities: BTreeMap::new(),
            groups: BTreeMap::new(),
            accounts: Vec::new(),
            grants: BTreeMap::new(),
        }
    }
}

/// how the server obtains its serving certificate.
///
/// a fresh key is generated at startup and certified by `authority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTlsConfig {
    /// tls authority that signs the server certificate.
    pub authority: String,

    /// dns names and ip addresses the certificate is valid for.
    pub names: Vec<String>,

    /// how long the server certificate is valid, e.g. `24h`.
    #[serde(default = "default_server_lifespan")]
    pub lifespan: String,
}

fn default_server_lifespan() -> String {
    "24h".to_string()
}

/// kind of signing authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityKind {
    /// x.509 certificate authority.
    Tls,
    /// openssh certificate authority.
    Ssh,
    /// opaque secret with an associated public part.
    Static,
}

impl fmt::Display for AuthorityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tls => "tls",
            Self::Ssh => "ssh",
            Self::Static => "static",
        })
    }
}

/// a configured signing authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// which kind of authority this is.
    #[serde(rename = "type")]
    pub kind: AuthorityKind,

    /// private key file, relative to `authority_dir`.
    pub key: String,

    /// certificate or public key file, relative to `authority_dir`.
    pub cert: String,
}

/// a configured group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// parent group whose membership includes this group's accounts.
    #[serde(default)]
    pub subgroup_of: Option<String>,
}

/// a configured account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// unique principal.
    pub principal: String,

    /// group the account belongs to.
    #[serde(default)]
    pub group: Option<String>,

    /// only reachable through impersonation when set.
    #[serde(default)]
    pub disable_direct_auth: bool,

    /// restrict direct requests to the address in `metadata.ip`.
    #[serde(default)]
    pub limit_ip: bool,

    /// template variables for grants.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// a grant as written in configuration, before compilation.
///
/// which fields are required or allowed depends on `privilege`; the grants
/// crate checks that when it compiles the grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantConfig {
    /// group whose members receive the privilege.
    pub group: String,

    /// privilege kind, e.g. `sign-tls`.
    pub privilege: String,

    /// group of accounts the privilege may act on.
    pub scope: Option<String>,

    /// authority the privilege signs with or exposes.
    pub authority: Option<String>,

    /// issue host certificates instead of user certificates.
    pub is_host: Option<bool>,

    /// certificate or token lifespan, e.g. `24h`.
    pub lifespan: Option<String>,

    /// certificate common name or ssh key id (templated).
    pub common_name: Option<String>,

    /// subject alternative names or ssh principals (templated).
    pub allowed_names: Option<Vec<String>>,

    /// literal response contents (templated).
    pub contents: Option<String>,
}
