//! Errors returned by platform API calls

use thiserror::Error;

/// Result type for platform calls
pub type Result<T> = std::result::Result<T, ApiError>;

/// Platform API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Neither a session cookie nor an access token is available
    #[error("Invalid/expired account")]
    InvalidAccount,

    /// Both the cookie session and the bearer fallback were refused
    #[error("Session invalidated: {message}")]
    SessionInvalidated {
        message: String,
        status_code: Option<u16>,
    },

    /// Non-success response or structured error reported by the platform
    #[error("{message}")]
    Platform {
        message: String,
        code: Option<String>,
        status_code: Option<u16>,
    },

    /// No response at all (refused, reset, timed out)
    #[error(transparent)]
    Transport(reqwest::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(reqwest::Error),

    /// Response body was not what the caller asked for
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// Credential store collaborator failed
    #[error("Credential store error: {message}")]
    Store { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ApiError {
    /// Platform error, with `context` prefixed to the message when present
    pub fn platform(
        context: Option<&str>,
        message: impl Into<String>,
        code: Option<String>,
        status_code: Option<u16>,
    ) -> Self {
        let message = message.into();
        let message = match context {
            Some(context) if !context.is_empty() => format!("{context}: {message}"),
            _ => message,
        };
        Self::Platform {
            message,
            code,
            status_code,
        }
    }

    pub fn invalidated(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::SessionInvalidated {
            message: message.into(),
            status_code,
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Platform { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Platform-specific error code
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Platform { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status, when one was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Platform { status_code, .. } | Self::SessionInvalidated { status_code, .. } => {
                *status_code
            }
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Stored credentials for the account should be purged
    pub fn is_session_invalidated(&self) -> bool {
        matches!(self, Self::SessionInvalidated { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
