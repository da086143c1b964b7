// Error handling module
// Defines the errors surfaced to callers of the API client

use thiserror::Error;

/// Where a failed request got to before it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server answered with a non-2xx status
    Response,
    /// The request went out but no response came back (connect failure, timeout)
    NoResponse,
    /// The request could not be built or sent at all
    NotSent,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Response => "response",
            FailureKind::NoResponse => "no_response",
            FailureKind::NotSent => "not_sent",
        }
    }
}

/// Errors returned by `ApiClient`
///
/// `Clone` so that a single refresh failure can be handed to every request
/// queued behind it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Transport never got a response
    #[error("Transport error ({}): {message}", .kind.as_str())]
    Transport { kind: FailureKind, message: String },

    /// Server answered with a non-2xx status
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    /// Refresh endpoint answered 2xx without a usable access token
    #[error("Invalid refresh response: {0}")]
    InvalidRefreshResponse(String),

    /// Queued request waited too long for the in-flight refresh
    #[error("Timed out after {0:?} waiting for session refresh")]
    RefreshTimeout(std::time::Duration),

    /// The request leading the refresh was dropped before it settled
    #[error("Session refresh was abandoned before completing")]
    RefreshAbandoned,

    /// The session was logged out or replaced while its token was being refreshed
    #[error("Session ended while its token was being refreshed")]
    SessionEnded,

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Key-value store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Classification used in the one-line failure log
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Transport { kind, .. } => *kind,
            ClientError::Status { .. } | ClientError::InvalidRefreshResponse(_) => {
                FailureKind::Response
            }
            ClientError::RefreshTimeout(_) => FailureKind::NoResponse,
            _ => FailureKind::NotSent,
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 401 from the server
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Storage(format!("{:#}", err))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
