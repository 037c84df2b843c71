//! accounts, groups and principals.
//!
//! accounts are the identities the keyserver authenticates and acts on behalf
//! of. groups are named sets of principals whose membership is flattened when
//! the directory is built, so a membership test never walks a parent chain.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// unique identity string naming an [`Account`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// wrap a principal name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// get the principal as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Principal {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// an authenticated identity known to the keyserver.
///
/// accounts are immutable once the directory is loaded. impersonation never
/// modifies an account, it only changes which account an operation acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// unique identifier.
    pub principal: Principal,

    /// the group this account was declared in, if any.
    pub group: Option<String>,

    /// when set, the account can only be reached through impersonation.
    pub disable_direct_auth: bool,

    /// when set, direct requests must originate from this address.
    pub limit_ip: Option<IpAddr>,

    /// template variables for grant compilation. always contains `principal`.
    pub metadata: HashMap<String, String>,
}

impl Account {
    /// create an account with no group, no restrictions and only the
    /// `principal` metadata entry.
    pub fn new(principal: impl Into<Principal>) -> Self {
        let principal = principal.into();
        let mut metadata = HashMap::new();
        metadata.insert("principal".to_string(), principal.to_string());
        Self {
            principal,
            group: None,
            disable_direct_auth: false,
            limit_ip: None,
            metadata,
        }
    }

    /// check whether a request from `remote` may act directly as this account.
    ///
    /// accounts without an ip limit accept any address. limited accounts
    /// reject requests whose remote address is unknown.
    pub fn allows_address(&self, remote: Option<IpAddr>) -> bool {
        match self.limit_ip {
            None => true,
            Some(allowed) => remote.is_some_and(|ip| same_address(allowed, ip)),
        }
    }
}

// an ipv4 limit also matches its ipv4-mapped ipv6 form, which is how dual-stack
// listeners report ipv4 peers.
fn same_address(allowed: IpAddr, seen: IpAddr) -> bool {
    allowed == seen || allowed.to_canonical() == seen.to_canonical()
}

/// a named set of principals.
///
/// membership already includes every account of every subgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    name: String,
    members: BTreeSet<Principal>,
}

impl Group {
    /// create a group with an already-flattened member set.
    pub fn new<I, P>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Principal>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    /// the group's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// check whether `principal` is a member of this group.
    pub fn has_member(&self, principal: &str) -> bool {
        self.members.contains(principal)
    }

    /// iterate over member principals in sorted order.
    pub fn members(&self) -> impl Iterator<Item = &Principal> {
        self.members.iter()
    }

    /// number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// true if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
