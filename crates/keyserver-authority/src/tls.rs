//! x.509 certificate authority.
//!
//! issued certificates take nothing from the csr except its public key: the
//! subject, names and usages all come from the caller's grant.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use rcgen::{
    Certificate, CertificateParams, CertificateSigningRequestParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, PKCS_RSA_SHA256, SerialNumber,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use time::OffsetDateTime;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::Error;
use crate::Result;

/// serial number length in bytes, before clearing the top bit.
const SERIAL_BYTES: usize = 20;

/// an rsa-backed x.509 certificate authority.
pub struct TlsAuthority {
    key: KeyPair,
    issuer: Certificate,
    cert_pem: Vec<u8>,
    cert_der: Vec<u8>,
    subject: String,
}

impl fmt::Debug for TlsAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsAuthority")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl TlsAuthority {
    /// load an authority from a pem rsa private key (pkcs#1 or pkcs#8) and
    /// the pem certificate for that key.
    pub fn load(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self> {
        let key_text =
            std::str::from_utf8(key_pem).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let private = RsaPrivateKey::from_pkcs1_pem(key_text)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(key_text))
            .map_err(|e| Error::InvalidKey(e.to_string()))?;

        let (_, pem) = parse_x509_pem(cert_pem).map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let public = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|_| Error::InvalidCertificate("expected rsa public key in certificate".into()))?;
        if public != private.to_public_key() {
            return Err(Error::KeyMismatch);
        }
        let subject = cert.subject().to_string();

        let pkcs8 = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let key = KeyPair::from_pem_and_sign_algo(&pkcs8, &PKCS_RSA_SHA256)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;

        let cert_text = std::str::from_utf8(cert_pem)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let issuer = CertificateParams::from_ca_cert_pem(cert_text)
            .and_then(|params| params.self_signed(&key))
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;

        Ok(Self {
            key,
            issuer,
            cert_pem: cert_pem.to_vec(),
            cert_der: pem.contents,
            subject,
        })
    }

    /// the authority's certificate, pem-encoded as loaded.
    pub fn public_key(&self) -> &[u8] {
        &self.cert_pem
    }

    /// the authority's certificate in der.
    pub fn certificate_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// sign a certificate for the public key in `csr_pem`.
    ///
    /// `names` are split into ip addresses and dns names for the subject
    /// alternative name extension.
    pub fn sign(
        &self,
        csr_pem: &str,
        is_host: bool,
        lifespan: Duration,
        common_name: &str,
        names: &[String],
    ) -> Result<String> {
        verify_csr(csr_pem)?;
        let csr = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| Error::InvalidCsr(e.to_string()))?;

        let not_before = OffsetDateTime::now_utc();
        let not_after = time::Duration::try_from(lifespan)
            .ok()
            .and_then(|span| not_before.checked_add(span))
            .ok_or(Error::LifespanOutOfRange)?;

        // ip addresses become ip sans, everything else a dns san
        let mut params = CertificateParams::new(names.to_vec())
            .map_err(|e| Error::Signing(format!("invalid subject alternative name: {e}")))?;
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        params.distinguished_name = subject;
        params.not_before = not_before;
        params.not_after = not_after;
        params.serial_number = Some(random_serial());
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = if is_host {
            vec![
                ExtendedKeyUsagePurpose::ClientAuth,
                ExtendedKeyUsagePurpose::ServerAuth,
            ]
        } else {
            vec![ExtendedKeyUsagePurpose::ClientAuth]
        };
        params.use_authority_key_identifier_extension = true;

        let cert = params.signed_by(&csr.public_key, &self.issuer, &self.key)?;
        Ok(cert.pem())
    }

    /// check a client certificate chain against this authority and return
    /// the leaf certificate's common name.
    pub fn verify_client(&self, chain: &[Vec<u8>]) -> Result<String> {
        let leaf_der = chain.first().ok_or(Error::MissingClientCertificate)?;
        let untrusted = |msg: String| Error::UntrustedClientCertificate(msg);

        let (_, ca) = X509Certificate::from_der(&self.cert_der)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let (_, leaf) = X509Certificate::from_der(leaf_der).map_err(|e| untrusted(e.to_string()))?;

        leaf.verify_signature(Some(ca.public_key()))
            .map_err(|e| untrusted(e.to_string()))?;
        if !leaf.validity().is_valid() {
            return Err(untrusted("certificate is outside its validity window".into()));
        }
        let client_auth = leaf
            .extended_key_usage()
            .map_err(|e| untrusted(e.to_string()))?
            .is_some_and(|eku| eku.value.client_auth || eku.value.any);
        if !client_auth {
            return Err(untrusted("certificate lacks client auth usage".into()));
        }

        let common_name = leaf
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .ok_or_else(|| untrusted("certificate has no common name".into()))?;
        Ok(common_name.to_string())
    }
}

fn verify_csr(csr_pem: &str) -> Result<()> {
    let (_, pem) =
        parse_x509_pem(csr_pem.as_bytes()).map_err(|e| Error::InvalidCsr(e.to_string()))?;
    if pem.label != "CERTIFICATE REQUEST" {
        return Err(Error::InvalidCsr(format!("unexpected pem block {}", pem.label)));
    }
    let (_, request) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| Error::InvalidCsr(e.to_string()))?;
    request
        .verify_signature()
        .map_err(|e| Error::InvalidCsr(e.to_string()))
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_BYTES];
    rand::rng().fill(&mut bytes);
    // 159 bits keeps the encoded integer positive
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}
