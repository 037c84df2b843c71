//! http handlers for the keyserver api.

mod api_auth;
mod apirequest;
mod error;
mod public;

pub use api_auth::{
    AuthError, AuthenticatedAccount, ClientCertVerifier, PeerCertificates, TOKEN_HEADER,
    TokenVerifier, Verifier, authenticate,
};
pub use apirequest::{MAX_BATCH_BYTES, apirequest};
pub use error::{ApiError, OptionExt, ResultExt};
pub use public::{public_key, static_file};
