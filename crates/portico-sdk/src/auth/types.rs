//! Authentication-related types shared by the callback registry and server

use std::sync::Arc;

/// Result type for interactive login operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Interactive login errors
///
/// Every pending callback settles with either the final request URL or one
/// of these variants. The set is closed so callers can match exhaustively.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The callback listener could not be started
    #[error("Failed to start callback server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A callback id collided with one already pending
    #[error("Callback id {0} is already pending")]
    DuplicateId(String),

    /// The browser never reached the callback URL before the deadline
    #[error("Authentication failed: Timed out")]
    Timeout,

    /// The consumer gave up waiting
    #[error("Authentication cancelled")]
    Cancelled,

    /// The callback server was shut down while the login was pending
    #[error("Callback server stopped")]
    ServerStopped,

    /// The browser connection closed while its callback was being handled
    #[error("Authentication failed: browser disconnected")]
    Disconnected,

    /// The per-login handler rejected the callback request
    #[error("{message}")]
    Handler { status: u16, message: String },

    /// The incoming request could not be turned into a URL
    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),
}

impl AuthError {
    pub(crate) fn bind(addr: impl ToString, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source: Arc::new(source),
        }
    }

    /// Whether the browser simply never completed the flow
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Whether the user or a shutdown aborted the flow
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ServerStopped)
    }
}
