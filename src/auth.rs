//! Session guard: validates the persisted bearer token before a protected
//! page is allowed to load.
//!
//! The token is never verified cryptographically here (the backend does
//! that); only its payload segment is decoded to read the `exp` claim.

use std::sync::atomic::{AtomicI64, Ordering};

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::logging::token_preview;
use crate::storage::{keys, KeyValueStore, StoreExt};

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at_millis(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    pub fn advance_secs(&self, secs: i64) {
        self.0.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pages the client can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Login,
    Dashboard,
    Repository,
    Routes,
    Results,
}

impl Navigation {
    pub fn path(&self) -> &'static str {
        match self {
            Navigation::Login => "/login",
            Navigation::Dashboard => "/dashboard",
            Navigation::Repository => "/repository",
            Navigation::Routes => "/routes",
            Navigation::Results => "/results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    Missing,
    Malformed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unchecked,
    Valid,
    Redirecting(RedirectReason),
}

/// Decoded view of a bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// `exp` claim in seconds; `None` means the token never expires client side.
    pub exp: Option<f64>,
    pub claims: Value,
}

impl Session {
    /// Decode the middle segment of a dot-delimited token as base64 JSON.
    pub fn decode(token: &str) -> Result<Self> {
        let segment = token
            .split('.')
            .nth(1)
            .ok_or(ClientError::AuthExpiredOrMalformed)?;
        // Accept both alphabets, padded or not
        let normalized: String = segment
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                other => other,
            })
            .collect();
        let bytes = STANDARD_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|_| ClientError::AuthExpiredOrMalformed)?;
        let claims: Value =
            serde_json::from_slice(&bytes).map_err(|_| ClientError::AuthExpiredOrMalformed)?;
        if !claims.is_object() {
            return Err(ClientError::AuthExpiredOrMalformed);
        }
        let exp = match claims.get("exp") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(Self {
            token: token.to_string(),
            exp,
            claims,
        })
    }

    /// Valid iff `exp * 1000 > now`; a token without `exp` is always valid.
    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        match self.exp {
            Some(exp) => exp * 1000.0 > now_millis as f64,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    Proceed(Session),
    Redirect {
        to: Navigation,
        reason: RedirectReason,
    },
}

/// Runs once per page mount. It holds no session between runs; every page
/// re-validates from the persisted store.
pub struct SessionGuard<'a> {
    store: &'a dyn KeyValueStore,
    clock: &'a dyn Clock,
    state: GuardState,
}

impl<'a> SessionGuard<'a> {
    pub fn new(store: &'a dyn KeyValueStore, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            state: GuardState::Unchecked,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Validate the persisted token. Malformed and expired tokens are removed
    /// from the store; a missing token leaves the store untouched.
    pub fn check(&mut self) -> Result<GuardOutcome> {
        let token = match self.store.get_string(keys::USER_TOKEN)? {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(self.redirect(RedirectReason::Missing)),
        };

        let session = match Session::decode(&token) {
            Ok(session) => session,
            Err(_) => {
                self.store.clear(keys::USER_TOKEN)?;
                return Ok(self.redirect(RedirectReason::Malformed));
            }
        };

        if !session.is_valid_at(self.clock.now_millis()) {
            self.store.clear(keys::USER_TOKEN)?;
            return Ok(self.redirect(RedirectReason::Expired));
        }

        debug!(token = %token_preview(&token), "session valid");
        self.state = GuardState::Valid;
        Ok(GuardOutcome::Proceed(session))
    }

    /// Like [`check`](Self::check) but as a `Result`, for flows that bail out
    /// on redirect.
    pub fn require(&mut self) -> Result<Session> {
        match self.check()? {
            GuardOutcome::Proceed(session) => Ok(session),
            GuardOutcome::Redirect { reason: RedirectReason::Missing, .. } => {
                Err(ClientError::AuthMissing)
            }
            GuardOutcome::Redirect { .. } => Err(ClientError::AuthExpiredOrMalformed),
        }
    }

    fn redirect(&mut self, reason: RedirectReason) -> GuardOutcome {
        info!(?reason, "session rejected, redirecting to login");
        self.state = GuardState::Redirecting(reason);
        GuardOutcome::Redirect {
            to: Navigation::Login,
            reason,
        }
    }
}

pub fn persist_token(store: &dyn KeyValueStore, token: &str) -> Result<()> {
    store.set(keys::USER_TOKEN, Value::String(token.to_string()))
}
