//! openssh certificate authority.
//!
//! rsa authority keys sign with rsa-sha2-512 through the `rsa` crate and may
//! be stored either as openssh private keys or as pkcs#1 / pkcs#8 pem.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{BigUint, RsaPrivateKey};
use sha2::Sha512;
use signature::{SignatureEncoding, Signer};
use ssh_key::certificate::{Builder, CertType};
use ssh_key::private::RsaKeypair;
use ssh_key::public::{KeyData, RsaPublicKey};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, HashAlg, Mpint, PrivateKey, PublicKey, Signature};
use tracing::debug;

use crate::error::Error;
use crate::Result;

/// an ssh certificate authority holding an unencrypted private key.
pub struct SshAuthority {
    key: CaKey,
    public: Vec<u8>,
}

enum CaKey {
    Rsa(RsaCaKey),
    OpenSsh(PrivateKey),
}

impl CaKey {
    fn key_data(&self) -> KeyData {
        match self {
            Self::Rsa(key) => key.public.clone(),
            Self::OpenSsh(key) => key.public_key().key_data().clone(),
        }
    }

    fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            Self::OpenSsh(key) => key.algorithm(),
        }
    }
}

/// rsa signing key producing rsa-sha2-512 signatures.
struct RsaCaKey {
    signer: pkcs1v15::SigningKey<Sha512>,
    public: KeyData,
}

impl RsaCaKey {
    fn new(private: RsaPrivateKey) -> Result<Self> {
        let public = RsaPublicKey::try_from(&private.to_public_key())
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self {
            signer: pkcs1v15::SigningKey::new(private),
            public: KeyData::Rsa(public),
        })
    }

    fn from_keypair(keypair: &RsaKeypair) -> Result<Self> {
        let uint = |value: &Mpint| {
            value
                .as_positive_bytes()
                .map(BigUint::from_bytes_be)
                .ok_or_else(|| Error::InvalidKey("rsa key component is not positive".into()))
        };
        let private = RsaPrivateKey::from_components(
            uint(&keypair.public.n)?,
            uint(&keypair.public.e)?,
            uint(&keypair.private.d)?,
            vec![uint(&keypair.private.p)?, uint(&keypair.private.q)?],
        )
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Self::new(private)
    }
}

impl Signer<Signature> for RsaCaKey {
    fn try_sign(&self, message: &[u8]) -> signature::Result<Signature> {
        let raw = self.signer.try_sign(message)?;
        Signature::new(
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            raw.to_vec(),
        )
        .map_err(|_| signature::Error::new())
    }
}

impl From<&RsaCaKey> for KeyData {
    fn from(key: &RsaCaKey) -> KeyData {
        key.public.clone()
    }
}

impl fmt::Debug for SshAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshAuthority")
            .field("algorithm", &self.key.algorithm())
            .finish_non_exhaustive()
    }
}

impl SshAuthority {
    /// load an authority from a private key and its authorized-keys style
    /// public key line.
    ///
    /// the private key is an unencrypted openssh key, or an rsa key in
    /// pkcs#1 or pkcs#8 pem.
    pub fn load(private: &[u8], public_openssh: &[u8]) -> Result<Self> {
        let key = load_private_key(private)?;

        let text = std::str::from_utf8(public_openssh)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let public = PublicKey::from_openssh(text.trim())
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        if *public.key_data() != key.key_data() {
            return Err(Error::KeyMismatch);
        }

        Ok(Self {
            key,
            public: public_openssh.to_vec(),
        })
    }

    /// the authority's public key line, as loaded.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// sign one certificate per public key in `blob`.
    ///
    /// `blob` is read as authorized-keys lines. blank lines and `#` comments
    /// are skipped, and parsing stops at the first line that is not a key.
    /// every certificate shares the key id, validity window and principals.
    pub fn sign(
        &self,
        blob: &str,
        is_host: bool,
        lifespan: Duration,
        key_id: &str,
        principals: &[String],
    ) -> Result<String> {
        let keys = parse_authorized_keys(blob);
        if keys.is_empty() {
            return Err(Error::NoKeysFound);
        }
        if lifespan < Duration::from_secs(1) {
            return Err(Error::LifespanTooShort);
        }

        let valid_after = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Signing(e.to_string()))?
            .as_secs();
        let valid_before = valid_after
            .checked_add(lifespan.as_secs())
            .ok_or(Error::LifespanOutOfRange)?;
        let cert_type = if is_host {
            CertType::Host
        } else {
            CertType::User
        };

        let mut output = String::new();
        for key in keys {
            let mut builder =
                Builder::new_with_random_nonce(&mut OsRng, key.key_data().clone(), valid_after, valid_before)?;
            builder
                .serial(rand::random())?
                .key_id(key_id)?
                .cert_type(cert_type)?;
            for principal in principals {
                builder.valid_principal(principal)?;
            }
            let cert = match &self.key {
                CaKey::Rsa(key) => builder.sign(key)?,
                CaKey::OpenSsh(key) => builder.sign(key)?,
            };
            output.push_str(&cert.to_openssh()?);
            output.push('\n');
        }

        Ok(output)
    }
}

fn load_private_key(data: &[u8]) -> Result<CaKey> {
    let text = std::str::from_utf8(data).map_err(|e| Error::InvalidKey(e.to_string()))?;
    let key = match PrivateKey::from_openssh(text) {
        Ok(key) => key,
        Err(openssh) => {
            let private = RsaPrivateKey::from_pkcs1_pem(text)
                .or_else(|_| RsaPrivateKey::from_pkcs8_pem(text))
                .map_err(|_| Error::InvalidKey(openssh.to_string()))?;
            return RsaCaKey::new(private).map(CaKey::Rsa);
        }
    };
    if key.is_encrypted() {
        return Err(Error::EncryptedKey);
    }
    match key.key_data().rsa() {
        Some(keypair) => RsaCaKey::from_keypair(keypair).map(CaKey::Rsa),
        None => Ok(CaKey::OpenSsh(key)),
    }
}

fn parse_authorized_keys(blob: &str) -> Vec<PublicKey> {
    let mut keys = Vec::new();
    for line in blob.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match PublicKey::from_openssh(line) {
            Ok(key) => keys.push(key),
            Err(err) => {
                debug!(error = %err, "stopping at unparseable authorized key line");
                break;
            }
        }
    }
    keys
}
