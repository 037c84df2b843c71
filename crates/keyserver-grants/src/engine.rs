//! the operation dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keyserver_types::{Account, GrantConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compile::{Grant, Resources, compile_grants};
use crate::error::{CompileError, OperationError};
use crate::privilege::OperationContext;

/// one entry of a request batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// the api to call.
    pub api: String,
    /// the request body passed to the privilege.
    pub body: String,
}

/// thread-safe dispatcher over the compiled grants.
///
/// wraps the grant table in arc for cheap cloning and concurrent access.
#[derive(Clone)]
pub struct GrantsEngine {
    grants: Arc<HashMap<String, Grant>>,
}

impl std::fmt::Debug for GrantsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantsEngine")
            .field("apis", &self.grants.len())
            .finish()
    }
}

impl GrantsEngine {
    /// create an engine over already-compiled grants.
    pub fn new(grants: HashMap<String, Grant>) -> Self {
        Self {
            grants: Arc::new(grants),
        }
    }

    /// compile `configs` and create an engine over the result.
    pub fn compile(
        configs: &BTreeMap<String, GrantConfig>,
        resources: Resources<'_>,
    ) -> Result<Self, CompileError> {
        compile_grants(configs, resources).map(Self::new)
    }

    /// an engine with no grants (deny all).
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// get the grant for an api.
    pub fn grant(&self, api: &str) -> Option<&Grant> {
        self.grants.get(api)
    }

    /// number of apis.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// true if there are no apis.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// run one operation as the context's current account.
    pub fn invoke_operation(
        &self,
        ctx: &mut OperationContext,
        api: &str,
        body: &str,
    ) -> Result<String, OperationError> {
        let grant = self
            .grants
            .get(api)
            .ok_or_else(|| OperationError::UnknownApi(api.to_string()))?;

        let principal = ctx.principal().to_string();
        let Some(privilege) = grant.privilege_for(&principal) else {
            warn!(api, %principal, group = grant.group(), "operation forbidden");
            return Err(OperationError::Forbidden {
                principal,
                api: api.to_string(),
            });
        };

        info!(api, %principal, "attempting operation");
        match privilege.invoke(ctx, body) {
            Ok(response) => {
                info!(api, %principal, "operation succeeded");
                Ok(response)
            }
            Err(err) => {
                warn!(api, %principal, error = %err, "operation failed");
                Err(OperationError::Failed {
                    api: api.to_string(),
                    principal,
                    source: err,
                })
            }
        }
    }

    /// run a batch in order, starting as `account`.
    ///
    /// an impersonation changes the account for the entries after it. the
    /// first failure aborts the batch and discards earlier results.
    pub fn invoke_batch(
        &self,
        account: Arc<Account>,
        requests: &[OperationRequest],
    ) -> Result<Vec<String>, OperationError> {
        let mut ctx = OperationContext::new(account);
        requests
            .iter()
            .map(|req| self.invoke_operation(&mut ctx, &req.api, &req.body))
            .collect()
    }

    /// decode a json batch, run it, and encode the json array of responses.
    pub fn invoke_batch_json(
        &self,
        account: Arc<Account>,
        body: &[u8],
    ) -> Result<Vec<u8>, OperationError> {
        let requests: Vec<OperationRequest> = serde_json::from_slice(body)?;
        let responses = self.invoke_batch(account, &requests)?;
        Ok(serde_json::to_vec(&responses)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use keyserver_state::TokenRegistry;
    use keyserver_types::{Directory, Group};

    use crate::privilege::Privilege;

    struct Fixture {
        engine: GrantsEngine,
        directory: Arc<Directory>,
        registry: Arc<TokenRegistry>,
    }

    // admin may impersonate nodes; nodes may fetch their config; only admin
    // may bootstrap.
    fn fixture() -> Fixture {
        let directory = Arc::new(Directory::new(
            [Account::new("admin"), Account::new("node1")],
            [
                Group::new("admins", ["admin"]),
                Group::new("nodes", ["node1"]),
            ],
        ));
        let registry = Arc::new(TokenRegistry::new());
        let nodes = directory.group("nodes").unwrap();

        let mut grants = HashMap::new();
        grants.insert(
            "impersonate-node".to_string(),
            Grant::new(
                "admins",
                HashMap::from([(
                    "admin".into(),
                    Privilege::Impersonate {
                        scope: nodes.clone(),
                        directory: directory.clone(),
                    },
                )]),
            ),
        );
        grants.insert(
            "get-config".to_string(),
            Grant::new(
                "nodes",
                HashMap::from([(
                    "node1".into(),
                    Privilege::ConstructConfiguration {
                        contents: "config for node1".to_string(),
                    },
                )]),
            ),
        );
        grants.insert(
            "bootstrap".to_string(),
            Grant::new(
                "admins",
                HashMap::from([(
                    "admin".into(),
                    Privilege::BootstrapAccount {
                        scope: nodes,
                        lifespan: Duration::from_secs(1200),
                        registry: registry.clone(),
                    },
                )]),
            ),
        );

        Fixture {
            engine: GrantsEngine::new(grants),
            directory,
            registry,
        }
    }

    fn req(api: &str, body: &str) -> OperationRequest {
        OperationRequest {
            api: api.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_impersonation_carries_through_batch() {
        let f = fixture();
        let admin = f.directory.account("admin").unwrap();

        let out = f
            .engine
            .invoke_batch(admin, &[req("impersonate-node", "node1"), req("get-config", "")])
            .unwrap();
        assert_eq!(out, vec!["".to_string(), "config for node1".to_string()]);
    }

    #[test]
    fn test_impersonated_account_loses_original_privileges() {
        let f = fixture();
        let admin = f.directory.account("admin").unwrap();

        let err = f
            .engine
            .invoke_batch(admin, &[req("impersonate-node", "node1"), req("bootstrap", "node1")])
            .unwrap_err();
        assert!(err.is_forbidden());
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_forbidden_without_privilege() {
        let f = fixture();
        let node = f.directory.account("node1").unwrap();
        let err = f
            .engine
            .invoke_batch(node, &[req("bootstrap", "node1")])
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Forbidden { ref principal, ref api } if principal == "node1" && api == "bootstrap"
        ));
    }

    #[test]
    fn test_unknown_api_fails_batch() {
        let f = fixture();
        let admin = f.directory.account("admin").unwrap();
        let err = f
            .engine
            .invoke_batch(admin, &[req("bootstrap", "node1"), req("nope", "")])
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownApi(api) if api == "nope"));
    }

    #[test]
    fn test_failure_discards_batch() {
        let f = fixture();
        let admin = f.directory.account("admin").unwrap();
        let err = f
            .engine
            .invoke_batch_json(
                admin,
                br#"[{"api":"bootstrap","body":"node1"},{"api":"impersonate-node","body":"admin"}]"#,
            )
            .unwrap_err();
        assert!(matches!(err, OperationError::Failed { .. }));
    }

    #[test]
    fn test_json_batch() {
        let f = fixture();
        let admin = f.directory.account("admin").unwrap();
        let out = f
            .engine
            .invoke_batch_json(admin, br#"[{"api":"bootstrap","body":"node1"}]"#)
            .unwrap();
        let tokens: Vec<String> = serde_json::from_slice(&out).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(f.registry.claim(&tokens[0]).unwrap(), "node1");

        let empty = f
            .engine
            .invoke_batch_json(f.directory.account("admin").unwrap(), b"[]")
            .unwrap();
        assert_eq!(empty, b"[]");
    }

    #[test]
    fn test_malformed_json_batches() {
        let f = fixture();
        for body in [
            &br#"{"api":"bootstrap","body":"node1"}"#[..],
            br#"[{"api":"bootstrap"}]"#,
            br#"[{"body":"node1"}]"#,
            b"not json",
        ] {
            let err = f
                .engine
                .invoke_batch_json(f.directory.account("admin").unwrap(), body)
                .unwrap_err();
            assert!(matches!(err, OperationError::MalformedBatch(_)));
        }
    }

    #[test]
    fn test_empty_engine_knows_no_apis() {
        let engine = GrantsEngine::empty();
        let err = engine
            .invoke_batch(Arc::new(Account::new("admin")), &[req("anything", "")])
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownApi(_)));
    }
}
