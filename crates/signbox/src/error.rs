use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignBoxError>;

/// Why a token-protected call was rejected by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReason {
    /// The client id/secret pair was rejected (`invalid_client`).
    InvalidClient,
    /// The grant itself was rejected, e.g. bad username/password (`invalid_grant`).
    InvalidGrant,
    /// The token was missing, expired or lacks the required scope.
    Unauthorized,
}

impl fmt::Display for AuthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthReason::InvalidClient => write!(f, "invalid client"),
            AuthReason::InvalidGrant => write!(f, "invalid grant"),
            AuthReason::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Error taxonomy for all SignBox API calls.
///
/// Raw transport and HTTP outcomes are classified into these variants at the
/// client boundary; the orchestrator only sequences already-classified errors
/// and never re-interprets them. Only `Server` and `Network` are retryable.
#[derive(Error, Debug)]
pub enum SignBoxError {
    #[error("authentication failed ({reason})")]
    Auth {
        reason: AuthReason,
        status: Option<u16>,
    },

    #[error("invalid request (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    /// The side effect state of the call is unknown, e.g. a timeout after the
    /// upload body was already sent. Never auto-retried; the caller decides
    /// whether to reconcile (query-by-reference) or re-issue the call.
    #[error("ambiguous outcome: {0}")]
    AmbiguousOutcome(String),
}

impl SignBoxError {
    /// Transient errors that the retry policy may re-attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SignBoxError::Server { .. } | SignBoxError::Network(_)
        )
    }

    /// Originating HTTP status code, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SignBoxError::Auth { status, .. } => *status,
            SignBoxError::Validation { status, .. } => Some(*status),
            SignBoxError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a transport-level failure (connect error, timeout, broken
    /// stream). These are all retryable from the caller's point of view.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        SignBoxError::Network(err.to_string())
    }

    /// Classify a non-success HTTP response from a protected SignBox
    /// endpoint. `resource` names the entity the call addressed and is used
    /// for `NotFound`/`Conflict` diagnostics.
    pub(crate) fn from_response(status: StatusCode, body: String, resource: &str) -> Self {
        match status.as_u16() {
            401 | 403 => SignBoxError::Auth {
                reason: AuthReason::Unauthorized,
                status: Some(status.as_u16()),
            },
            404 => SignBoxError::NotFound(resource.to_string()),
            409 => SignBoxError::Conflict(if body.trim().is_empty() {
                resource.to_string()
            } else {
                body
            }),
            s if status.is_server_error() => SignBoxError::Server { status: s, message: body },
            // 400 and any other 4xx: the request itself was malformed and
            // re-sending it unchanged cannot succeed.
            s => SignBoxError::Validation { status: s, message: body },
        }
    }
}
