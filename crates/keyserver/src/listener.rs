//! tls termination for the api.
//!
//! client certificates are requested but optional, so a caller without one
//! can still present a bootstrap token. the chain a client presents is
//! attached to every request on its connection as [`PeerCertificates`],
//! together with the remote address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, body::Body, extract::ConnectInfo, http::Request};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use keyserver_authority::{Authority, TlsAuthority};
use keyserver_types::ServerTlsConfig;
use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::RootCertStore;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ServerConfig, ServerConnection, VerifierBuilderError, WebPkiClientVerifier};
use rustls_pemfile::certs;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use crate::PeerCertificates;

/// common name of the certificate the server issues itself.
pub const SERVER_COMMON_NAME: &str = "keyserver-autogen-tls";

/// errors from preparing the tls listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// the named authority is not configured.
    #[error("tls authority {0} is not configured")]
    UnknownAuthority(String),

    /// the named authority cannot issue x.509 certificates.
    #[error("authority {0} is not a tls authority")]
    NotTls(String),

    /// the server certificate lifespan does not parse.
    #[error("invalid server certificate lifespan {lifespan:?}: {source}")]
    Lifespan {
        /// the configured value.
        lifespan: String,
        /// underlying error.
        source: humantime::DurationError,
    },

    /// the server key or its csr could not be generated.
    #[error("failed to generate server key: {0}")]
    Key(#[from] rcgen::Error),

    /// the authority refused to issue the server certificate.
    #[error("failed to issue server certificate: {0}")]
    Issue(#[from] keyserver_authority::Error),

    /// the issued certificate did not parse.
    #[error("failed to read server certificate: {0}")]
    Pem(#[from] std::io::Error),

    /// the client certificate verifier could not be built.
    #[error("failed to build client verifier: {0}")]
    ClientVerifier(#[from] VerifierBuilderError),

    /// rustls rejected the configuration.
    #[error(transparent)]
    Tls(#[from] rustls::Error),
}

/// build the listener's tls configuration.
///
/// a fresh key is certified by the authority `server` names. client
/// certificates, when presented, must chain to `authentication`.
pub fn server_tls_config(
    authorities: &HashMap<String, Authority>,
    authentication: &str,
    server: &ServerTlsConfig,
) -> Result<Arc<ServerConfig>, ListenerError> {
    let issuer = tls_authority(authorities, &server.authority)?;
    let authentication = tls_authority(authorities, authentication)?;
    let (chain, key) = issue_server_identity(issuer, server)?;

    let provider = Arc::new(ring::default_provider());
    let mut roots = RootCertStore::empty();
    roots.add(CertificateDer::from(authentication.certificate_der().to_vec()))?;
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .allow_unauthenticated()
        .build()?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

fn tls_authority<'a>(
    authorities: &'a HashMap<String, Authority>,
    name: &str,
) -> Result<&'a TlsAuthority, ListenerError> {
    authorities
        .get(name)
        .ok_or_else(|| ListenerError::UnknownAuthority(name.to_string()))?
        .as_tls()
        .map(|authority| authority.as_ref())
        .ok_or_else(|| ListenerError::NotTls(name.to_string()))
}

fn issue_server_identity(
    issuer: &TlsAuthority,
    server: &ServerTlsConfig,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ListenerError> {
    let lifespan =
        humantime::parse_duration(&server.lifespan).map_err(|source| ListenerError::Lifespan {
            lifespan: server.lifespan.clone(),
            source,
        })?;

    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params
        .distinguished_name
        .push(DnType::CommonName, SERVER_COMMON_NAME);
    let csr = params.serialize_request(&key)?.pem()?;

    let cert_pem = issuer.sign(&csr, true, lifespan, SERVER_COMMON_NAME, &server.names)?;
    let chain = certs(&mut cert_pem.as_bytes()).collect::<Result<Vec<_>, _>>()?;
    info!(
        authority = %server.authority,
        names = ?server.names,
        lifespan = %server.lifespan,
        "issued server certificate"
    );
    Ok((chain, PrivatePkcs8KeyDer::from(key.serialize_der()).into()))
}

/// accept tls connections on `listener` and serve `app` on each of them.
pub async fn serve_tls(listener: TcpListener, tls_config: Arc<ServerConfig>, app: Router) {
    let acceptor = TlsAcceptor::from(tls_config);
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                let acceptor = acceptor.clone();
                let app = app.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, remote, acceptor, app).await {
                        debug!(error = %err, peer = %remote, "connection ended with error");
                    }
                });
            }
            Err(err) => {
                error!(?err, "api listener accept failed");
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let stream = acceptor.accept(stream).await?;
    let peer = peer_certificates(stream.get_ref().1);
    debug!(peer = %remote, client_certificate = peer.is_some(), "accepted tls connection");

    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let mut app = app.clone();
        let peer = peer.clone();
        async move {
            let (mut parts, body) = request.into_parts();
            if let Some(peer) = peer {
                parts.extensions.insert(peer);
            }
            parts.extensions.insert(ConnectInfo(remote));
            tower::Service::call(&mut app, Request::from_parts(parts, Body::new(body))).await
        }
    });

    Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service)
        .await
}

fn peer_certificates(connection: &ServerConnection) -> Option<PeerCertificates> {
    connection
        .peer_certificates()
        .filter(|chain| !chain.is_empty())
        .map(|chain| PeerCertificates(chain.iter().map(|cert| cert.to_vec()).collect()))
}
