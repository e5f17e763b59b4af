//! Error taxonomy shared by every client component.
//!
//! Authentication problems are handled by the session guard (silent redirect),
//! backend and transport failures are surfaced to the user, and local
//! validation failures block an action before anything is sent.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No bearer token in the persisted store.
    #[error("not logged in")]
    AuthMissing,

    /// Token payload failed to decode or its `exp` claim is in the past.
    #[error("session expired or malformed")]
    AuthExpiredOrMalformed,

    /// Non-2xx response. `detail` is the backend's `detail` field when
    /// present, otherwise the status text.
    #[error("{detail}")]
    BackendRejected { status: StatusCode, detail: String },

    /// The request never produced a response (DNS, connection refused, ...).
    #[error("unable to reach the backend")]
    Transport(#[source] reqwest::Error),

    /// Required form fields are empty or pasted JSON does not parse.
    #[error("{0}")]
    LocalValidation(String),

    /// The caller's cancellation token fired before the response was applied.
    #[error("request cancelled")]
    Cancelled,

    /// A run for this item is already in flight.
    #[error("item {0} is already running")]
    AlreadyRunning(i64),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("state store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for errors that should send the user back to the login page.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ClientError::AuthMissing | ClientError::AuthExpiredOrMalformed => true,
            ClientError::BackendRejected { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }

    /// Message suitable for an alert dialog or CLI error line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::BackendRejected { status, detail } => format!("{} - {}", status.as_u16(), detail),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
