//! error types for the identity model.

use thiserror::Error;

/// errors raised while building or querying the [`Directory`](crate::Directory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// a group was declared with an empty name.
    #[error("a group name is required")]
    EmptyGroupName,

    /// a group names a parent group that does not exist.
    #[error("cannot find group {parent} to be a subgroup of in {group}")]
    UnknownParentGroup {
        /// the group declaring the parent.
        group: String,
        /// the missing parent.
        parent: String,
    },

    /// following `subgroup_of` from this group leads back to it.
    #[error("subgroup_of cycle detected involving group {0}")]
    SubgroupCycle(String),

    /// an account was declared with an empty principal.
    #[error("an account principal is required")]
    EmptyPrincipal,

    /// two accounts share a principal.
    #[error("duplicate account {0}")]
    DuplicateAccount(String),

    /// a group lookup failed.
    #[error("no such group {0}")]
    UnknownGroup(String),

    /// an account requested ip limiting without a valid `ip` metadata entry.
    #[error("invalid limit ip {value:?} for account {principal}")]
    InvalidLimitIp {
        /// the account principal.
        principal: String,
        /// the value found in metadata (empty if absent).
        value: String,
    },

    /// an account lookup failed.
    #[error("cannot find account for principal {0}")]
    UnknownAccount(String),

    /// the account stored under a key has a different principal.
    #[error("mismatched principal during lookup: expected {expected}, found {found}")]
    PrincipalMismatch {
        /// the principal used for the lookup.
        expected: String,
        /// the principal of the stored account.
        found: String,
    },
}
