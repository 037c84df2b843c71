//! error types for keyserver-grants.

use keyserver_state::TokenError;
use thiserror::Error;

use crate::privilege::{Param, PrivilegeKind};

/// a malformed `(var)` template or a reference to a missing variable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// a `)` with no matching `(`.
    #[error("extraneous close parenthesis in substitution string {0:?}")]
    ExtraneousClose(String),

    /// a `(` with no matching `)`.
    #[error("missing close parenthesis in substitution string {0:?}")]
    MissingClose(String),

    /// the variable is not defined, or is defined as empty.
    #[error("undefined variable {var} in substitution string {within:?}")]
    UndefinedVariable {
        /// the variable name.
        var: String,
        /// the full template.
        within: String,
    },
}

/// errors raised while compiling grants at load time.
#[derive(Debug, Error)]
pub enum CompileError {
    /// the privilege kind is not one of the known kinds.
    #[error("no such privilege kind: {0}")]
    UnknownKind(String),

    /// required parameters were not provided.
    #[error("missing parameter(s) to {privilege}: {}", join(.params))]
    Missing {
        /// the privilege kind being compiled.
        privilege: PrivilegeKind,
        /// the absent parameters.
        params: Vec<Param>,
    },

    /// parameters were provided that the privilege does not accept.
    #[error("extraneous parameter(s) provided to {privilege}: {}", join(.params))]
    Extraneous {
        /// the privilege kind being compiled.
        privilege: PrivilegeKind,
        /// the unexpected parameters.
        params: Vec<Param>,
    },

    /// the named authority does not exist.
    #[error("no such authority {0}")]
    UnknownAuthority(String),

    /// the named authority has the wrong kind for this privilege.
    #[error("authority {authority} is {found}, but {privilege} needs a {expected} authority")]
    AuthorityMismatch {
        /// the privilege kind being compiled.
        privilege: PrivilegeKind,
        /// the authority name.
        authority: String,
        /// the kind the privilege needs.
        expected: keyserver_types::AuthorityKind,
        /// the kind the authority has.
        found: keyserver_types::AuthorityKind,
    },

    /// the lifespan could not be parsed.
    #[error("invalid lifespan {value:?}: {reason}")]
    InvalidLifespan {
        /// the configured value.
        value: String,
        /// why parsing failed.
        reason: String,
    },

    /// the lifespan parsed to zero.
    #[error("nonpositive lifespans are not supported: {0:?}")]
    NonPositiveLifespan(String),

    /// an ssh grant with an empty principal list.
    #[error("sign-ssh needs at least one allowed name")]
    NoPrincipals,

    /// template expansion failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// a group or account lookup failed.
    #[error(transparent)]
    Directory(#[from] keyserver_types::Error),

    /// context wrapper naming the grant that failed.
    #[error("grant {api}: {source}")]
    Grant {
        /// the api name of the failing grant.
        api: String,
        /// the underlying error.
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// wrap this error with the api name of the grant being compiled.
    pub fn in_grant(self, api: &str) -> Self {
        CompileError::Grant {
            api: api.to_string(),
            source: Box::new(self),
        }
    }
}

fn join(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// errors raised while invoking a compiled privilege.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// signing or key handling failed.
    #[error(transparent)]
    Authority(#[from] keyserver_authority::Error),

    /// the token registry refused the request.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// the target account could not be resolved.
    #[error(transparent)]
    Directory(#[from] keyserver_types::Error),

    /// the target principal is not in the privilege's scope.
    #[error("principal {0} is outside of allowed scope")]
    OutOfScope(String),

    /// a privilege that takes no input received a body.
    #[error("expected empty request to {0} endpoint")]
    UnexpectedBody(PrivilegeKind),

    /// a static key cannot be returned as text.
    #[error("static key is not valid utf-8")]
    BinaryKey,
}

/// errors from dispatching an operation or a batch.
#[derive(Debug, Error)]
pub enum OperationError {
    /// the batch body is not a json array of `{"api", "body"}` objects.
    #[error("malformed operation batch: {0}")]
    MalformedBatch(#[from] serde_json::Error),

    /// no grant exists for the api.
    #[error("could not find API request {0:?}")]
    UnknownApi(String),

    /// the acting account has no privilege for the api.
    #[error("account {principal} does not have access to API call {api}")]
    Forbidden {
        /// the acting principal.
        principal: String,
        /// the api requested.
        api: String,
    },

    /// the privilege ran and failed.
    #[error("operation {api} for {principal} failed: {source}")]
    Failed {
        /// the api requested.
        api: String,
        /// the acting principal.
        principal: String,
        /// the privilege's error.
        #[source]
        source: PrivilegeError,
    },
}

impl OperationError {
    /// true if the error is an authorization refusal.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, OperationError::Forbidden { .. })
    }
}
