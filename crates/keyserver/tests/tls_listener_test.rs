//! tests for the api served over a real tls listener.

mod keyserver_common;

use std::net::SocketAddr;
use std::sync::Arc;

use keyserver::handlers::TOKEN_HEADER;
use keyserver::listener;
use keyserver_authority::test_utils;
use keyserver_common::{KeyserverFixture, batch};
use keyserver_types::ServerTlsConfig;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;

const SERVER_NAME: &str = "keyserver.test";

async fn start(ks: &KeyserverFixture) -> SocketAddr {
    let server = ServerTlsConfig {
        authority: "clustertls".to_string(),
        names: vec![SERVER_NAME.to_string()],
        lifespan: "1h".to_string(),
    };
    let tls = listener::server_tls_config(&ks.state.authorities, "clustertls", &server).unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    tokio::spawn(listener::serve_tls(tcp, tls, ks.app.clone()));
    addr
}

fn client_config(ks: &KeyserverFixture, identity: Option<(Vec<u8>, Vec<u8>)>) -> Arc<ClientConfig> {
    let ca = ks.state.authorities["clustertls"].as_tls().unwrap();
    let mut roots = RootCertStore::empty();
    roots
        .add(CertificateDer::from(ca.certificate_der().to_vec()))
        .unwrap();

    let builder =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);
    let config = match identity {
        Some((cert, key)) => builder
            .with_client_auth_cert(
                vec![CertificateDer::from(cert)],
                PrivatePkcs8KeyDer::from(key).into(),
            )
            .unwrap(),
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

/// post `body` to `/apirequest` over http/1.1 and return the status line and body
async fn post(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
    headers: &[(&str, &str)],
    body: &str,
) -> (String, String) {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from(SERVER_NAME).unwrap();
    let mut stream = TlsConnector::from(config).connect(name, tcp).await.unwrap();

    let mut request = format!(
        "POST /apirequest HTTP/1.1\r\nHost: {SERVER_NAME}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    request.push_str(body);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    // the server may close without close_notify once the response is sent
    let _ = stream.read_to_end(&mut response).await;
    let response = String::from_utf8(response).unwrap();
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status = head.lines().next().unwrap().to_string();
    (status, body.to_string())
}

#[tokio::test]
async fn test_client_certificate_over_tls() {
    let ks = KeyserverFixture::new();
    let addr = start(&ks).await;
    let ca = ks.state.authorities["clustertls"].as_tls().unwrap();
    let admin = client_config(&ks, Some(test_utils::issue_client_identity(ca, "admin")));

    let (status, body) = post(addr, admin, &[], &batch(&[("bootstrap", "node7")])).await;
    assert!(status.starts_with("HTTP/1.1 200"), "status: {status}, body: {body}");
    let tokens: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(tokens.len(), 1);

    let anonymous = client_config(&ks, None);
    let (status, body) = post(
        addr,
        anonymous,
        &[(TOKEN_HEADER, tokens[0].as_str())],
        &batch(&[("get-local-config", "")]),
    )
    .await;
    assert!(status.starts_with("HTTP/1.1 200"), "status: {status}, body: {body}");
    let out: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(out, vec!["HOSTNAME=node7\n".to_string()]);
}

#[tokio::test]
async fn test_no_credentials_over_tls() {
    let ks = KeyserverFixture::new();
    let addr = start(&ks).await;

    let (status, body) = post(
        addr,
        client_config(&ks, None),
        &[],
        &batch(&[("get-local-config", "")]),
    )
    .await;
    assert!(status.starts_with("HTTP/1.1 401"), "status: {status}");
    assert_eq!(body, "Authentication failed.");
}

#[tokio::test]
async fn test_remote_address_reaches_ip_limit() {
    let ks = KeyserverFixture::new();
    let addr = start(&ks).await;
    let ca = ks.state.authorities["clustertls"].as_tls().unwrap();

    // pinned may only connect from 10.0.0.5
    let pinned = client_config(&ks, Some(test_utils::issue_client_identity(ca, "pinned")));
    let (status, _) = post(addr, pinned, &[], &batch(&[("get-local-config", "")])).await;
    assert!(status.starts_with("HTTP/1.1 401"), "status: {status}");

    let node = client_config(&ks, Some(test_utils::issue_client_identity(ca, "node8")));
    let (status, body) = post(addr, node, &[], &batch(&[("get-local-config", "")])).await;
    assert!(status.starts_with("HTTP/1.1 200"), "status: {status}");
    assert!(body.contains("HOSTNAME=node8"));
}
