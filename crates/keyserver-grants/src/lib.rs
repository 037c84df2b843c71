//! privilege compilation and operation dispatch for the keyserver.
//!
//! a grant maps an api name to a [`Privilege`] for each member of a group.
//! grants are compiled once at load time: every parameter is validated and
//! every template is expanded against the member's metadata, so invoking a
//! privilege never consults configuration again. deny-by-default: an account
//! with no compiled privilege for an api is forbidden from calling it.

#![warn(missing_docs)]

pub mod compile;
pub mod engine;
pub mod error;
pub mod privilege;
pub mod template;

pub use compile::{Grant, Resources, compile_grants};
pub use engine::{GrantsEngine, OperationRequest};
pub use error::{CompileError, OperationError, PrivilegeError, TemplateError};
pub use privilege::{OperationContext, Param, Privilege, PrivilegeKind};
pub use template::{substitute_all, substitute_vars};
