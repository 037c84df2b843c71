//! error types for authority loading and signing.

use thiserror::Error;

/// errors that can occur while loading an authority or signing with it.
#[derive(Debug, Error)]
pub enum Error {
    /// the private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// the certificate or public key could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// the public half does not belong to the private key.
    #[error("mismatched public and private keys")]
    KeyMismatch,

    /// ssh authority keys must be stored unencrypted.
    #[error("ssh authority key is encrypted")]
    EncryptedKey,

    /// a static authority was configured with no data.
    #[error("static authority {0} is empty")]
    Empty(&'static str),

    /// the certificate signing request is malformed or its signature is bad.
    #[error("invalid certificate signing request: {0}")]
    InvalidCsr(String),

    /// a request blob contained no parseable ssh public keys.
    #[error("no keys found")]
    NoKeysFound,

    /// ssh certificates must be valid for at least one second.
    #[error("lifespan is too short for certificate signature")]
    LifespanTooShort,

    /// the requested validity window cannot be represented.
    #[error("lifespan is out of range")]
    LifespanOutOfRange,

    /// the underlying signer failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// no client certificate was presented.
    #[error("client certificate must be present")]
    MissingClientCertificate,

    /// the presented client certificate is not valid under this authority.
    #[error("certificate not valid under this authority: {0}")]
    UntrustedClientCertificate(String),
}

impl From<rcgen::Error> for Error {
    fn from(err: rcgen::Error) -> Self {
        Error::Signing(err.to_string())
    }
}

impl From<ssh_key::Error> for Error {
    fn from(err: ssh_key::Error) -> Self {
        Error::Signing(err.to_string())
    }
}
