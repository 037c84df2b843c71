//! process-lifetime mutable state for the keyserver.
//!
//! the only mutable state is the [`TokenRegistry`] of outstanding bootstrap
//! tokens. time is read through a [`Clock`] so expiry can be tested without
//! sleeping.

#![warn(missing_docs)]

mod clock;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use token::{ScopedToken, TOKEN_LEN, TokenError, TokenRegistry, is_well_formed};
