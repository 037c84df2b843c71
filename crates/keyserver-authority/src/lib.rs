//! signing authorities for the keyserver.
//!
//! an [`Authority`] is one of:
//! - [`TlsAuthority`]: issues x.509 certificates from csrs and verifies client certificates
//! - [`SshAuthority`]: issues openssh host and user certificates
//! - [`StaticAuthority`]: hands out a fixed secret

#![warn(missing_docs)]

mod authority;
mod error;
mod ssh;
mod static_authority;
mod tls;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use authority::Authority;
pub use error::Error;
pub use ssh::SshAuthority;
pub use static_authority::StaticAuthority;
pub use tls::TlsAuthority;

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
