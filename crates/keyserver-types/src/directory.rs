//! the immutable table of accounts and groups.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use crate::account::{Account, Group, Principal};
use crate::config::{AccountConfig, GroupConfig};
use crate::error::Error;
use crate::Result;

/// accounts and groups, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    accounts: HashMap<Principal, Arc<Account>>,
    groups: HashMap<String, Arc<Group>>,
}

impl Directory {
    /// build a directory from already-constructed accounts and groups.
    ///
    /// group memberships are taken as given; nothing is flattened.
    pub fn new(
        accounts: impl IntoIterator<Item = Account>,
        groups: impl IntoIterator<Item = Group>,
    ) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.principal.clone(), Arc::new(a)))
                .collect(),
            groups: groups
                .into_iter()
                .map(|g| (g.name().to_string(), Arc::new(g)))
                .collect(),
        }
    }

    /// build a directory from configuration.
    ///
    /// every account becomes a member of its own group and of each ancestor
    /// reachable through `subgroup_of`.
    pub fn from_config(
        groups: &BTreeMap<String, GroupConfig>,
        accounts: &[AccountConfig],
    ) -> Result<Self> {
        for (name, group) in groups {
            if name.is_empty() {
                return Err(Error::EmptyGroupName);
            }
            if let Some(parent) = &group.subgroup_of
                && !groups.contains_key(parent)
            {
                return Err(Error::UnknownParentGroup {
                    group: name.clone(),
                    parent: parent.clone(),
                });
            }
        }
        check_cycles(groups)?;

        let mut members: BTreeMap<&str, BTreeSet<Principal>> =
            groups.keys().map(|name| (name.as_str(), BTreeSet::new())).collect();
        let mut table = HashMap::with_capacity(accounts.len());

        for config in accounts {
            let account = build_account(config)?;
            if table.contains_key(&account.principal) {
                return Err(Error::DuplicateAccount(config.principal.clone()));
            }

            let mut next = account.group.as_deref();
            while let Some(name) = next {
                let set = members
                    .get_mut(name)
                    .ok_or_else(|| Error::UnknownGroup(name.to_string()))?;
                set.insert(account.principal.clone());
                next = groups.get(name).and_then(|g| g.subgroup_of.as_deref());
            }

            table.insert(account.principal.clone(), Arc::new(account));
        }

        let groups = members
            .into_iter()
            .map(|(name, set)| (name.to_string(), Arc::new(Group::new(name, set))))
            .collect();

        Ok(Self {
            accounts: table,
            groups,
        })
    }

    /// look up an account by principal.
    pub fn account(&self, principal: &str) -> Result<Arc<Account>> {
        let account = self
            .accounts
            .get(principal)
            .ok_or_else(|| Error::UnknownAccount(principal.to_string()))?;
        if account.principal.as_str() != principal {
            return Err(Error::PrincipalMismatch {
                expected: principal.to_string(),
                found: account.principal.to_string(),
            });
        }
        Ok(Arc::clone(account))
    }

    /// look up a group by name.
    pub fn group(&self, name: &str) -> Result<Arc<Group>> {
        self.groups
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    /// number of accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

fn check_cycles(groups: &BTreeMap<String, GroupConfig>) -> Result<()> {
    for start in groups.keys() {
        let mut seen = HashSet::new();
        let mut current = Some(start.as_str());
        while let Some(name) = current {
            if !seen.insert(name) {
                return Err(Error::SubgroupCycle(start.clone()));
            }
            current = groups.get(name).and_then(|g| g.subgroup_of.as_deref());
        }
    }
    Ok(())
}

fn build_account(config: &AccountConfig) -> Result<Account> {
    if config.principal.is_empty() {
        return Err(Error::EmptyPrincipal);
    }

    let mut account = Account::new(config.principal.as_str());
    account.group = config.group.clone();
    account.disable_direct_auth = config.disable_direct_auth;
    for (key, value) in &config.metadata {
        if key != "principal" {
            account.metadata.insert(key.clone(), value.clone());
        }
    }

    if config.limit_ip {
        let value = config.metadata.get("ip").cloned().unwrap_or_default();
        let ip: IpAddr = value.parse().map_err(|_| Error::InvalidLimitIp {
            principal: config.principal.clone(),
            value: value.clone(),
        })?;
        account.limit_ip = Some(ip);
    }

    Ok(account)
}
