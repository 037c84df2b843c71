//! single-use bootstrap tokens.
//!
//! a token authorizes exactly one successful claim before it expires. tokens
//! live only in memory; restarting the server invalidates all of them.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// random bytes per token.
const TOKEN_RANDOM_BYTES: usize = 15;

/// length of the check suffix.
const CHECK_LEN: usize = 2;

/// length of a token string: 20 base64 characters plus the check suffix.
pub const TOKEN_LEN: usize = TOKEN_RANDOM_BYTES / 3 * 4 + CHECK_LEN;

/// errors from claiming or granting tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// the token is not in the registry.
    #[error("unrecognized token")]
    Unrecognized,

    /// the token's lifespan has passed.
    #[error("cannot claim expired token")]
    Expired,

    /// the token was already claimed.
    #[error("token already claimed")]
    AlreadyClaimed,

    /// the requested lifespan cannot be represented.
    #[error("token lifespan is out of range")]
    LifespanOutOfRange,
}

/// a snapshot of a token's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedToken {
    /// the token string handed to the caller.
    pub token: String,
    /// principal the token authenticates as.
    pub subject: String,
    /// instant at which the token stops being claimable.
    pub expires: DateTime<Utc>,
    /// whether the token has been claimed.
    pub claimed: bool,
}

impl ScopedToken {
    /// true once `now` has reached the expiry instant.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// the set of outstanding tokens.
pub struct TokenRegistry {
    tokens: Mutex<HashMap<String, ScopedToken>>,
    clock: Arc<dyn Clock>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("outstanding", &self.len())
            .finish()
    }
}

impl TokenRegistry {
    /// create an empty registry reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// create an empty registry reading `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// issue a token that authenticates as `subject` until `lifespan` passes.
    ///
    /// expired tokens are purged first.
    pub fn grant_token(&self, subject: &str, lifespan: Duration) -> Result<String, TokenError> {
        let now = self.clock.now();
        let expires = TimeDelta::from_std(lifespan)
            .ok()
            .and_then(|span| now.checked_add_signed(span))
            .ok_or(TokenError::LifespanOutOfRange)?;

        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, t| !t.has_expired(now));
        let purged = before - tokens.len();

        loop {
            let token = generate_token_id();
            if let Entry::Vacant(slot) = tokens.entry(token.clone()) {
                slot.insert(ScopedToken {
                    token: token.clone(),
                    subject: subject.to_string(),
                    expires,
                    claimed: false,
                });
                debug!(subject, %expires, purged, "granted bootstrap token");
                return Ok(token);
            }
        }
    }

    /// claim a token, returning its subject.
    ///
    /// succeeds at most once per token.
    pub fn claim(&self, token: &str) -> Result<String, TokenError> {
        if !is_well_formed(token) {
            return Err(TokenError::Unrecognized);
        }
        let now = self.clock.now();

        let mut tokens = self.tokens.lock();
        let entry = tokens.get_mut(token).ok_or(TokenError::Unrecognized)?;
        if entry.has_expired(now) {
            return Err(TokenError::Expired);
        }
        if entry.claimed {
            return Err(TokenError::AlreadyClaimed);
        }
        entry.claimed = true;
        Ok(entry.subject.clone())
    }

    /// get a snapshot of a token without claiming it.
    pub fn lookup_token(&self, token: &str) -> Result<ScopedToken, TokenError> {
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or(TokenError::Unrecognized)
    }

    /// number of tokens held, including claimed ones not yet purged.
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    /// true if no tokens are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_suffix(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(CHECK_LEN);
    encoded
}

fn generate_token_id() -> String {
    let bytes: [u8; TOKEN_RANDOM_BYTES] = rand::rng().random();
    let body = URL_SAFE_NO_PAD.encode(bytes);
    let suffix = check_suffix(&body);
    body + &suffix
}

/// true if `token` has the shape of a generated token, including a correct
/// check suffix.
pub fn is_well_formed(token: &str) -> bool {
    if token.len() != TOKEN_LEN
        || !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return false;
    }
    let (body, suffix) = token.split_at(TOKEN_LEN - CHECK_LEN);
    check_suffix(body) == suffix
}
