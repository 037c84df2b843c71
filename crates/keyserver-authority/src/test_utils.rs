//! fixtures for tests: a test ca, an ssh ca, and helpers that produce
//! csrs, client certificates and ssh public keys.

use std::path::Path;
use std::time::Duration;

use rcgen::{CertificateParams, DnType, KeyPair};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, PrivateKey};
use x509_parser::pem::parse_x509_pem;

use crate::{Authority, TlsAuthority};
use keyserver_types::AuthorityKind;

/// pkcs#1 rsa key of the test ca.
pub const CA_KEY: &[u8] = include_bytes!("../testdata/ca.key");
/// the same key in pkcs#8.
pub const CA_KEY_PKCS8: &[u8] = include_bytes!("../testdata/ca.pkcs8.key");
/// self-signed certificate of the test ca.
pub const CA_CERT: &[u8] = include_bytes!("../testdata/ca.pem");
/// an unrelated ca certificate.
pub const OTHER_CERT: &[u8] = include_bytes!("../testdata/other.pem");
/// unencrypted ed25519 ssh ca key.
pub const SSH_CA_KEY: &[u8] = include_bytes!("../testdata/ssh_ca.key");
/// public half of [`SSH_CA_KEY`].
pub const SSH_CA_PUB: &[u8] = include_bytes!("../testdata/ssh_ca.pub");
/// rsa ssh ca key in openssh format.
pub const SSH_RSA_CA_KEY: &[u8] = include_bytes!("../testdata/ssh_rsa_ca.key");
/// the same key as pkcs#1 pem.
pub const SSH_RSA_CA_PEM: &[u8] = include_bytes!("../testdata/ssh_rsa_ca.pem");
/// public half of [`SSH_RSA_CA_KEY`].
pub const SSH_RSA_CA_PUB: &[u8] = include_bytes!("../testdata/ssh_rsa_ca.pub");
/// an unrelated ssh public key.
pub const OTHER_SSH_PUB: &[u8] = include_bytes!("../testdata/other_ssh.pub");

/// load the test tls ca.
pub fn tls_authority() -> Authority {
    Authority::load(AuthorityKind::Tls, CA_KEY, CA_CERT).expect("test ca loads")
}

/// load the test ssh ca.
pub fn ssh_authority() -> Authority {
    Authority::load(AuthorityKind::Ssh, SSH_CA_KEY, SSH_CA_PUB).expect("test ssh ca loads")
}

/// write the fixture files into `dir` under their testdata names.
pub fn write_fixtures(dir: &Path) {
    for (name, data) in [
        ("ca.key", CA_KEY),
        ("ca.pem", CA_CERT),
        ("ssh_ca.key", SSH_CA_KEY),
        ("ssh_ca.pub", SSH_CA_PUB),
        ("ssh_rsa_ca.pem", SSH_RSA_CA_PEM),
        ("ssh_rsa_ca.pub", SSH_RSA_CA_PUB),
        ("other_ssh.pub", OTHER_SSH_PUB),
    ] {
        std::fs::write(dir.join(name), data).expect("write fixture");
    }
}

/// generate a pem csr for a fresh key with the given subject and names.
pub fn generate_csr(common_name: &str, names: &[&str]) -> String {
    let key = KeyPair::generate().expect("generate key");
    csr_for(&key, common_name, names)
}

fn csr_for(key: &KeyPair, common_name: &str, names: &[&str]) -> String {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let mut params = CertificateParams::new(names).expect("csr params");
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
        .serialize_request(key)
        .expect("serialize csr")
        .pem()
        .expect("encode csr")
}

/// issue a der client certificate for `common_name` from `authority`.
pub fn issue_client_cert(authority: &TlsAuthority, common_name: &str) -> Vec<u8> {
    issue_client_identity(authority, common_name).0
}

/// issue a client certificate and return it with its pkcs#8 key, both der.
pub fn issue_client_identity(authority: &TlsAuthority, common_name: &str) -> (Vec<u8>, Vec<u8>) {
    let key = KeyPair::generate().expect("generate key");
    let csr = csr_for(&key, common_name, &[]);
    let pem = authority
        .sign(&csr, false, Duration::from_secs(3600), common_name, &[])
        .expect("sign client cert");
    let (_, block) = parse_x509_pem(pem.as_bytes()).expect("parse issued cert");
    (block.contents, key.serialize_der())
}

/// generate a fresh ed25519 key and return its authorized-keys line.
pub fn generate_ssh_public_key() -> String {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("generate ssh key");
    key.public_key().to_openssh().expect("encode ssh key")
}
