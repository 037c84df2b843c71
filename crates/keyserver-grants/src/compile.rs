//! turning grant configuration into per-account privileges.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use keyserver_authority::Authority;
use keyserver_state::TokenRegistry;
use keyserver_types::{Directory, GrantConfig, Principal};
use tracing::debug;

use crate::error::CompileError;
use crate::privilege::{Param, Privilege, PrivilegeKind};
use crate::template::{substitute_all, substitute_vars};

/// the loaded resources privileges are bound to.
#[derive(Debug, Clone, Copy)]
pub struct Resources<'a> {
    /// accounts and groups.
    pub directory: &'a Arc<Directory>,
    /// authorities by name.
    pub authorities: &'a HashMap<String, Authority>,
    /// registry for bootstrap tokens.
    pub registry: &'a Arc<TokenRegistry>,
}

/// a compiled grant: one privilege per member of the grant's group.
#[derive(Debug, Clone)]
pub struct Grant {
    group: String,
    by_account: HashMap<Principal, Privilege>,
}

impl Grant {
    /// build a grant from already-compiled privileges.
    pub fn new(group: impl Into<String>, by_account: HashMap<Principal, Privilege>) -> Self {
        Self {
            group: group.into(),
            by_account,
        }
    }

    /// the group the grant was given to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// the privilege `principal` holds under this grant, if any.
    pub fn privilege_for(&self, principal: &str) -> Option<&Privilege> {
        self.by_account.get(principal)
    }

    /// number of accounts holding the grant.
    pub fn len(&self) -> usize {
        self.by_account.len()
    }

    /// true if no account holds the grant.
    pub fn is_empty(&self) -> bool {
        self.by_account.is_empty()
    }
}

/// compile every configured grant.
///
/// errors name the grant that failed.
pub fn compile_grants(
    configs: &BTreeMap<String, GrantConfig>,
    resources: Resources<'_>,
) -> Result<HashMap<String, Grant>, CompileError> {
    configs
        .iter()
        .map(|(api, config)| {
            compile_grant(api, config, resources)
                .map(|grant| (api.clone(), grant))
                .map_err(|e| e.in_grant(api))
        })
        .collect()
}

fn compile_grant(
    api: &str,
    config: &GrantConfig,
    resources: Resources<'_>,
) -> Result<Grant, CompileError> {
    let kind: PrivilegeKind = config.privilege.parse()?;
    check_params(kind, config)?;

    let group = resources.directory.group(&config.group)?;
    let shared = Shared::resolve(kind, config, resources)?;

    let mut by_account = HashMap::with_capacity(group.len());
    for principal in group.members() {
        let account = resources.directory.account(principal.as_str())?;
        let privilege = shared.bind(config, &account.metadata, resources)?;
        by_account.insert(principal.clone(), privilege);
    }

    debug!(api, privilege = %kind, group = %config.group, accounts = by_account.len(), "compiled grant");
    Ok(Grant::new(config.group.clone(), by_account))
}

fn is_present(config: &GrantConfig, param: Param) -> bool {
    match param {
        Param::Scope => config.scope.as_deref().is_some_and(|s| !s.is_empty()),
        Param::Authority => config.authority.as_deref().is_some_and(|s| !s.is_empty()),
        Param::IsHost => config.is_host.is_some(),
        Param::Lifespan => config.lifespan.as_deref().is_some_and(|s| !s.is_empty()),
        Param::CommonName => config.common_name.as_deref().is_some_and(|s| !s.is_empty()),
        Param::AllowedNames => config.allowed_names.is_some(),
        Param::Contents => config.contents.as_deref().is_some_and(|s| !s.is_empty()),
    }
}

fn check_params(kind: PrivilegeKind, config: &GrantConfig) -> Result<(), CompileError> {
    let required = kind.required();
    let optional = kind.optional();

    let extraneous: Vec<Param> = Param::ALL
        .into_iter()
        .filter(|p| is_present(config, *p) && !required.contains(p) && !optional.contains(p))
        .collect();
    if !extraneous.is_empty() {
        return Err(CompileError::Extraneous {
            privilege: kind,
            params: extraneous,
        });
    }

    let missing: Vec<Param> = required
        .iter()
        .copied()
        .filter(|p| !is_present(config, *p))
        .collect();
    if !missing.is_empty() {
        return Err(CompileError::Missing {
            privilege: kind,
            params: missing,
        });
    }

    if kind == PrivilegeKind::SignSsh && config.allowed_names.as_ref().is_some_and(Vec::is_empty) {
        return Err(CompileError::NoPrincipals);
    }
    Ok(())
}

fn parse_lifespan(value: &str) -> Result<Duration, CompileError> {
    let lifespan = humantime::parse_duration(value).map_err(|e| CompileError::InvalidLifespan {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if lifespan.is_zero() {
        return Err(CompileError::NonPositiveLifespan(value.to_string()));
    }
    Ok(lifespan)
}

/// the parts of a privilege that do not depend on the account.
struct Shared {
    kind: PrivilegeKind,
    authority: Option<Authority>,
    lifespan: Duration,
}

impl Shared {
    fn resolve(
        kind: PrivilegeKind,
        config: &GrantConfig,
        resources: Resources<'_>,
    ) -> Result<Self, CompileError> {
        let authority = match (&config.authority, kind.authority_kind()) {
            (Some(name), Some(expected)) => {
                let authority = resources
                    .authorities
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownAuthority(name.clone()))?;
                if authority.kind() != expected {
                    return Err(CompileError::AuthorityMismatch {
                        privilege: kind,
                        authority: name.clone(),
                        expected,
                        found: authority.kind(),
                    });
                }
                Some(authority.clone())
            }
            _ => None,
        };

        let lifespan = match config.lifespan.as_deref() {
            Some(value) if !value.is_empty() => parse_lifespan(value)?,
            _ => Duration::ZERO,
        };

        Ok(Self {
            kind,
            authority,
            lifespan,
        })
    }

    fn bind(
        &self,
        config: &GrantConfig,
        vars: &HashMap<String, String>,
        resources: Resources<'_>,
    ) -> Result<Privilege, CompileError> {
        let common_name = || -> Result<String, CompileError> {
            Ok(substitute_vars(config.common_name.as_deref().unwrap_or_default(), vars)?)
        };
        let allowed_names = || -> Result<Vec<String>, CompileError> {
            Ok(substitute_all(config.allowed_names.as_deref().unwrap_or_default(), vars)?)
        };
        let scope = || resources.directory.group(config.scope.as_deref().unwrap_or_default());
        let wrong_authority = || CompileError::UnknownAuthority(config.authority.clone().unwrap_or_default());

        Ok(match self.kind {
            PrivilegeKind::SignTls => Privilege::SignTls {
                authority: self
                    .authority
                    .as_ref()
                    .and_then(Authority::as_tls)
                    .cloned()
                    .ok_or_else(wrong_authority)?,
                is_host: config.is_host.unwrap_or(false),
                lifespan: self.lifespan,
                common_name: common_name()?,
                allowed_names: allowed_names()?,
            },
            PrivilegeKind::SignSsh => Privilege::SignSsh {
                authority: self
                    .authority
                    .as_ref()
                    .and_then(Authority::as_ssh)
                    .cloned()
                    .ok_or_else(wrong_authority)?,
                is_host: config.is_host.unwrap_or(false),
                lifespan: self.lifespan,
                key_id: common_name()?,
                principals: allowed_names()?,
            },
            PrivilegeKind::BootstrapAccount => Privilege::BootstrapAccount {
                scope: scope()?,
                lifespan: self.lifespan,
                registry: Arc::clone(resources.registry),
            },
            PrivilegeKind::Impersonate => Privilege::Impersonate {
                scope: scope()?,
                directory: Arc::clone(resources.directory),
            },
            PrivilegeKind::ConstructConfiguration => Privilege::ConstructConfiguration {
                contents: substitute_vars(config.contents.as_deref().unwrap_or_default(), vars)?,
            },
            PrivilegeKind::FetchKey => Privilege::FetchKey {
                authority: self
                    .authority
                    .as_ref()
                    .and_then(Authority::as_static)
                    .cloned()
                    .ok_or_else(wrong_authority)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyserver_authority::test_utils;
    use keyserver_types::{AccountConfig, AuthorityKind, GroupConfig};

    struct World {
        directory: Arc<Directory>,
        authorities: HashMap<String, Authority>,
        registry: Arc<TokenRegistry>,
    }

    impl World {
        fn new() -> Self {
            let groups = BTreeMap::from([
                ("admins".to_string(), GroupConfig::default()),
                ("nodes".to_string(), GroupConfig::default()),
            ]);
            let mut node = AccountConfig {
                principal: "node7".to_string(),
                group: Some("nodes".to_string()),
                ..Default::default()
            };
            node.metadata.insert("hostname".to_string(), "node7.cluster".to_string());
            let admin = AccountConfig {
                principal: "alice".to_string(),
                group: Some("admins".to_string()),
                ..Default::default()
            };
            let directory = Directory::from_config(&groups, &[node, admin]).unwrap();

            let authorities = HashMap::from([
                ("clustertls".to_string(), test_utils::tls_authority()),
                ("ssh-host".to_string(), test_utils::ssh_authority()),
                (
                    "secret".to_string(),
                    Authority::load(AuthorityKind::Static, b"key", b"cert").unwrap(),
                ),
            ]);

            Self {
                directory: Arc::new(directory),
                authorities,
                registry: Arc::new(TokenRegistry::new()),
            }
        }

        fn resources(&self) -> Resources<'_> {
            Resources {
                directory: &self.directory,
                authorities: &self.authorities,
                registry: &self.registry,
            }
        }

        fn compile(&self, config: GrantConfig) -> Result<Grant, CompileError> {
            compile_grant("test-api", &config, self.resources())
        }
    }

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn valid_configs() -> Vec<GrantConfig> {
        vec![
            GrantConfig {
                group: "nodes".into(),
                privilege: "sign-tls".into(),
                authority: s("clustertls"),
                lifespan: s("24h"),
                common_name: s("(hostname)"),
                allowed_names: Some(vec!["(hostname)".into()]),
                is_host: Some(true),
                ..Default::default()
            },
            GrantConfig {
                group: "nodes".into(),
                privilege: "sign-ssh".into(),
                authority: s("ssh-host"),
                lifespan: s("24h"),
                common_name: s("(principal)"),
                allowed_names: Some(vec!["(hostname)".into()]),
                ..Default::default()
            },
            GrantConfig {
                group: "admins".into(),
                privilege: "bootstrap-account".into(),
                scope: s("nodes"),
                lifespan: s("20m"),
                ..Default::default()
            },
            GrantConfig {
                group: "admins".into(),
                privilege: "impersonate".into(),
                scope: s("nodes"),
                ..Default::default()
            },
            GrantConfig {
                group: "nodes".into(),
                privilege: "construct-configuration".into(),
                contents: s("host = (hostname)"),
                ..Default::default()
            },
            GrantConfig {
                group: "admins".into(),
                privilege: "fetch-key".into(),
                authority: s("secret"),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_all_kinds_compile() {
        let world = World::new();
        for config in valid_configs() {
            let kind: PrivilegeKind = config.privilege.parse().unwrap();
            let grant = world.compile(config).unwrap();
            assert_eq!(grant.len(), 1);
            let principal = if grant.group() == "nodes" { "node7" } else { "alice" };
            assert_eq!(grant.privilege_for(principal).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_missing_required_params_rejected() {
        let world = World::new();
        for config in valid_configs() {
            let kind: PrivilegeKind = config.privilege.parse().unwrap();
            for param in kind.required() {
                let mut broken = config.clone();
                match param {
                    Param::Scope => broken.scope = None,
                    Param::Authority => broken.authority = None,
                    Param::IsHost => broken.is_host = None,
                    Param::Lifespan => broken.lifespan = None,
                    Param::CommonName => broken.common_name = None,
                    Param::AllowedNames => broken.allowed_names = None,
                    Param::Contents => broken.contents = None,
                }
                let err = world.compile(broken).unwrap_err();
                assert!(
                    matches!(&err, CompileError::Missing { params, .. } if params == &vec![*param]),
                    "{kind} without {param}: {err}"
                );
            }
        }
    }

    #[test]
    fn test_extraneous_params_rejected() {
        let world = World::new();
        for config in valid_configs() {
            let kind: PrivilegeKind = config.privilege.parse().unwrap();
            for param in Param::ALL {
                if kind.required().contains(&param) || kind.optional().contains(&param) {
                    continue;
                }
                let mut extra = config.clone();
                match param {
                    Param::Scope => extra.scope = s("nodes"),
                    Param::Authority => extra.authority = s("clustertls"),
                    Param::IsHost => extra.is_host = Some(false),
                    Param::Lifespan => extra.lifespan = s("1h"),
                    Param::CommonName => extra.common_name = s("x"),
                    Param::AllowedNames => extra.allowed_names = Some(vec![]),
                    Param::Contents => extra.contents = s("x"),
                }
                let err = world.compile(extra).unwrap_err();
                assert!(
                    matches!(&err, CompileError::Extraneous { params, .. } if params == &vec![param]),
                    "{kind} with {param}: {err}"
                );
            }
        }
    }

    #[test]
    fn test_authority_kind_mismatch_rejected() {
        let world = World::new();
        let mut config = valid_configs().remove(0);
        config.authority = s("ssh-host");
        assert!(matches!(
            world.compile(config).unwrap_err(),
            CompileError::AuthorityMismatch {
                expected: AuthorityKind::Tls,
                found: AuthorityKind::Ssh,
                ..
            }
        ));

        let mut config = valid_configs().remove(5);
        config.authority = s("clustertls");
        assert!(matches!(
            world.compile(config).unwrap_err(),
            CompileError::AuthorityMismatch { .. }
        ));

        let mut config = valid_configs().remove(1);
        config.authority = s("nope");
        assert!(matches!(
            world.compile(config).unwrap_err(),
            CompileError::UnknownAuthority(_)
        ));
    }

    #[test]
    fn test_bad_lifespans_rejected() {
        let world = World::new();
        let mut config = valid_configs().remove(2);
        config.lifespan = s("0s");
        assert!(matches!(
            world.compile(config.clone()).unwrap_err(),
            CompileError::NonPositiveLifespan(_)
        ));
        config.lifespan = s("soon");
        assert!(matches!(
            world.compile(config).unwrap_err(),
            CompileError::InvalidLifespan { .. }
        ));
    }

    #[test]
    fn test_unknown_kind_and_group() {
        let world = World::new();
        let mut config = valid_configs().remove(3);
        config.privilege = "list-admits".into();
        assert!(matches!(world.compile(config).unwrap_err(), CompileError::UnknownKind(_)));

        let mut config = valid_configs().remove(3);
        config.group = "ghosts".into();
        assert!(matches!(world.compile(config).unwrap_err(), CompileError::Directory(_)));

        let mut config = valid_configs().remove(3);
        config.scope = s("ghosts");
        assert!(matches!(world.compile(config).unwrap_err(), CompileError::Directory(_)));
    }

    #[test]
    fn test_sign_ssh_needs_principals() {
        let world = World::new();
        let mut config = valid_configs().remove(1);
        config.allowed_names = Some(vec![]);
        assert!(matches!(world.compile(config).unwrap_err(), CompileError::NoPrincipals));
    }

    #[test]
    fn test_templates_expanded_per_account() {
        let world = World::new();
        let grant = world.compile(valid_configs().remove(4)).unwrap();
        match grant.privilege_for("node7").unwrap() {
            Privilege::ConstructConfiguration { contents } => {
                assert_eq!(contents, "host = node7.cluster");
            }
            other => panic!("unexpected privilege {other:?}"),
        }

        let grant = world.compile(valid_configs().remove(1)).unwrap();
        match grant.privilege_for("node7").unwrap() {
            Privilege::SignSsh {
                key_id, principals, ..
            } => {
                assert_eq!(key_id, "node7");
                assert_eq!(principals, &vec!["node7.cluster".to_string()]);
            }
            other => panic!("unexpected privilege {other:?}"),
        }
    }

    #[test]
    fn test_undefined_template_variable_rejected() {
        let world = World::new();
        let mut config = valid_configs().remove(4);
        config.contents = s("rack = (rack)");
        assert!(matches!(world.compile(config).unwrap_err(), CompileError::Template(_)));
    }

    #[test]
    fn test_compile_grants_names_failing_api() {
        let world = World::new();
        let mut config = valid_configs().remove(3);
        config.scope = None;
        let configs = BTreeMap::from([("impersonate-node".to_string(), config)]);
        let err = compile_grants(&configs, world.resources()).unwrap_err();
        assert!(err.to_string().starts_with("grant impersonate-node:"), "{err}");
    }

    #[test]
    fn test_non_members_hold_nothing() {
        let world = World::new();
        let grant = world.compile(valid_configs().remove(3)).unwrap();
        assert!(grant.privilege_for("alice").is_some());
        assert!(grant.privilege_for("node7").is_none());
    }
}
