//! opaque secrets served by the `fetch-key` privilege.

use std::fmt;

use crate::error::Error;
use crate::Result;

/// a secret key with an associated public part. neither half is parsed.
pub struct StaticAuthority {
    key: Vec<u8>,
    cert: Vec<u8>,
}

impl fmt::Debug for StaticAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAuthority")
            .field("cert_len", &self.cert.len())
            .finish_non_exhaustive()
    }
}

impl StaticAuthority {
    /// wrap raw key and cert bytes. both must be non-empty.
    pub fn load(key: &[u8], cert: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::Empty("key"));
        }
        if cert.is_empty() {
            return Err(Error::Empty("cert"));
        }
        Ok(Self {
            key: key.to_vec(),
            cert: cert.to_vec(),
        })
    }

    /// the public half.
    pub fn public_key(&self) -> &[u8] {
        &self.cert
    }

    /// the secret half.
    pub fn private_key(&self) -> &[u8] {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let authority = StaticAuthority::load(b"secret", b"public").unwrap();
        assert_eq!(authority.private_key(), b"secret");
        assert_eq!(authority.public_key(), b"public");
        assert!(!format!("{authority:?}").contains("secret"));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(StaticAuthority::load(b"", b"x"), Err(Error::Empty("key"))));
        assert!(matches!(StaticAuthority::load(b"x", b""), Err(Error::Empty("cert"))));
    }
}
