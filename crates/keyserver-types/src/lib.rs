//! core types for the keyserver - a cluster certificate authority and
//! authorization service.
//!
//! this crate provides the identity model and configuration structures used
//! throughout the keyserver:
//! - [`Account`] and [`Group`]: principals and their pre-flattened memberships
//! - [`Directory`]: the immutable table of accounts and groups loaded at startup
//! - [`Config`]: server configuration, including the raw grant table

#![warn(missing_docs)]

mod account;
mod config;
mod directory;
mod error;

pub use account::{Account, Group, Principal};
pub use config::{
    AccountConfig, AuthorityConfig, AuthorityKind, Config, GrantConfig, GroupConfig,
    ServerTlsConfig,
};
pub use directory::Directory;
pub use error::Error;

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
