//! shared test utilities for keyserver endpoint tests

#![allow(dead_code)] // Test utilities may not all be used in every test file

use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use keyserver::{AppState, PeerCertificates, create_app, handlers::TOKEN_HEADER};
use keyserver_authority::test_utils;
use keyserver_types::Config;
use tempfile::TempDir;
use tower::ServiceExt;

/// a cluster with an admin, two nodes, an ip-pinned node and an account
/// that cannot authenticate directly.
const CONFIG: &str = r#"
authentication_authority = "clustertls"
static_files = ["cluster.conf"]

[authorities.clustertls]
type = "tls"
key = "ca.key"
cert = "ca.pem"

[authorities.ssh-host]
type = "ssh"
key = "ssh_ca.key"
cert = "ssh_ca.pub"

[authorities.ssh-user]
type = "ssh"
key = "ssh_rsa_ca.pem"
cert = "ssh_rsa_ca.pub"

[authorities.etcd]
type = "static"
key = "etcd.key"
cert = "etcd.pub"

[groups.admins]

[groups.nodes]

[[accounts]]
principal = "admin"
group = "admins"

[[accounts]]
principal = "node7"
group = "nodes"
metadata = { hostname = "node7" }

[[accounts]]
principal = "node8"
group = "nodes"
metadata = { hostname = "node8" }

[[accounts]]
principal = "pinned"
group = "nodes"
limit_ip = true
metadata = { hostname = "pinned", ip = "10.0.0.5" }

[[accounts]]
principal = "hidden"
group = "nodes"
disable_direct_auth = true
metadata = { hostname = "hidden" }

[grants.bootstrap]
group = "admins"
privilege = "bootstrap-account"
scope = "nodes"
lifespan = "20m"

[grants.impersonate-node]
group = "admins"
privilege = "impersonate"
scope = "nodes"

[grants.renew-ssh-host]
group = "nodes"
privilege = "sign-ssh"
authority = "ssh-host"
is_host = true
lifespan = "24h"
common_name = "(hostname)"
allowed_names = ["(hostname).cluster", "(hostname)"]

[grants.admin-ssh]
group = "admins"
privilege = "sign-ssh"
authority = "ssh-user"
is_host = false
lifespan = "4h"
common_name = "(principal)"
allowed_names = ["root"]

[grants.renew-tls-host]
group = "nodes"
privilege = "sign-tls"
authority = "clustertls"
is_host = true
lifespan = "24h"
common_name = "(hostname)"
allowed_names = ["(hostname).cluster"]

[grants.get-local-config]
group = "nodes"
privilege = "construct-configuration"
contents = "HOSTNAME=(hostname)\n"

[grants.fetch-etcd-key]
group = "admins"
privilege = "fetch-key"
authority = "etcd"
"#;

pub const ETCD_KEY: &str = "etcd secret key\n";
pub const ETCD_PUB: &str = "etcd public certificate\n";
pub const CLUSTER_CONF: &str = "cluster = test\n";

/// test fixture holding the loaded state and its router
pub struct KeyserverFixture {
    pub dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

impl KeyserverFixture {
    /// write the fixture files and load the cluster configuration
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        test_utils::write_fixtures(dir.path());
        std::fs::write(dir.path().join("etcd.key"), ETCD_KEY).unwrap();
        std::fs::write(dir.path().join("etcd.pub"), ETCD_PUB).unwrap();
        std::fs::write(dir.path().join("cluster.conf"), CLUSTER_CONF).unwrap();

        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.authority_dir = dir.path().to_path_buf();
        config.static_dir = dir.path().to_path_buf();

        let state = keyserver::load(&config).unwrap();
        let app = create_app(state.clone());
        Self { dir, state, app }
    }

    /// a der client certificate for `principal` from the cluster ca
    pub fn client_cert(&self, principal: &str) -> Vec<u8> {
        let ca = self.state.authorities["clustertls"].as_tls().unwrap();
        test_utils::issue_client_cert(ca, principal)
    }

    /// send a batch and return the status and body
    pub async fn send(&self, auth: Auth, batch: &str) -> (StatusCode, Vec<u8>) {
        call(self.app.clone(), batch_request(auth, batch)).await
    }

    /// send a batch and decode the json array of responses
    pub async fn send_ok(&self, auth: Auth, batch: &str) -> Vec<String> {
        let (status, body) = self.send(auth, batch).await;
        assert_eq!(
            status,
            StatusCode::OK,
            "unexpected status, body: {}",
            String::from_utf8_lossy(&body)
        );
        serde_json::from_slice(&body).expect("response should be a json array of strings")
    }

    /// get `uri` and return the status and body
    pub async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        call(self.app.clone(), request).await
    }
}

/// run `request` through `app` and return the status and body
pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

/// build a `POST /apirequest` carrying `batch`
pub fn batch_request(auth: Auth, batch: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/apirequest");
    if let Auth::Token(token) = &auth {
        builder = builder.header(TOKEN_HEADER, token.as_str());
    }
    let mut request = builder.body(Body::from(batch.to_string())).unwrap();
    match auth {
        Auth::Cert(cert) => {
            request.extensions_mut().insert(PeerCertificates(vec![cert]));
        }
        Auth::CertFrom(cert, addr) => {
            request.extensions_mut().insert(PeerCertificates(vec![cert]));
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        Auth::Token(_) | Auth::None => {}
    }
    request
}

/// how a test request authenticates
pub enum Auth {
    None,
    Token(String),
    Cert(Vec<u8>),
    CertFrom(Vec<u8>, SocketAddr),
}

/// build a json batch from `(api, body)` pairs
pub fn batch(ops: &[(&str, &str)]) -> String {
    let ops: Vec<_> = ops
        .iter()
        .map(|(api, body)| serde_json::json!({ "api": api, "body": body }))
        .collect();
    serde_json::Value::Array(ops).to_string()
}
