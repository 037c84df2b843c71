//! the closed set of authority kinds behind one handle.

use std::sync::Arc;

use keyserver_types::AuthorityKind;

use crate::Result;
use crate::ssh::SshAuthority;
use crate::static_authority::StaticAuthority;
use crate::tls::TlsAuthority;

/// a loaded signing authority. cloning is cheap.
#[derive(Debug, Clone)]
pub enum Authority {
    /// x.509 certificate authority.
    Tls(Arc<TlsAuthority>),
    /// openssh certificate authority.
    Ssh(Arc<SshAuthority>),
    /// opaque secret.
    Static(Arc<StaticAuthority>),
}

impl Authority {
    /// load an authority of the given kind from its key and cert bytes.
    pub fn load(kind: AuthorityKind, key: &[u8], cert: &[u8]) -> Result<Self> {
        Ok(match kind {
            AuthorityKind::Tls => Self::Tls(Arc::new(TlsAuthority::load(key, cert)?)),
            AuthorityKind::Ssh => Self::Ssh(Arc::new(SshAuthority::load(key, cert)?)),
            AuthorityKind::Static => Self::Static(Arc::new(StaticAuthority::load(key, cert)?)),
        })
    }

    /// which kind of authority this is.
    pub fn kind(&self) -> AuthorityKind {
        match self {
            Self::Tls(_) => AuthorityKind::Tls,
            Self::Ssh(_) => AuthorityKind::Ssh,
            Self::Static(_) => AuthorityKind::Static,
        }
    }

    /// the bytes served on the public endpoint for this authority.
    pub fn public_key(&self) -> &[u8] {
        match self {
            Self::Tls(a) => a.public_key(),
            Self::Ssh(a) => a.public_key(),
            Self::Static(a) => a.public_key(),
        }
    }

    /// the tls authority, if this is one.
    pub fn as_tls(&self) -> Option<&Arc<TlsAuthority>> {
        match self {
            Self::Tls(a) => Some(a),
            _ => None,
        }
    }

    /// the ssh authority, if this is one.
    pub fn as_ssh(&self) -> Option<&Arc<SshAuthority>> {
        match self {
            Self::Ssh(a) => Some(a),
            _ => None,
        }
    }

    /// the static authority, if this is one.
    pub fn as_static(&self) -> Option<&Arc<StaticAuthority>> {
        match self {
            Self::Static(a) => Some(a),
            _ => None,
        }
    }
}
