//! Session credentials and the choice between cookie and bearer auth

use crate::error::{ApiError, Result};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

/// Credentials stored for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Account the credentials belong to
    pub account: String,
    /// Platform session cookie value
    pub sid: Option<String>,
    /// OAuth access token
    pub access_token: Option<String>,
    /// OAuth refresh token, used by token refresh collaborators only
    pub refresh_token: Option<String>,
}

impl SessionCredentials {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Default::default()
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Non-empty session cookie
    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref().filter(|sid| !sid.is_empty())
    }

    /// Non-empty bearer token
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// How a single request authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// `Cookie: {name}={sid}`
    Cookie(String),
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// No credentials (tooling bootstrap only)
    Anonymous,
}

impl AuthMode {
    pub fn is_cookie(&self) -> bool {
        matches!(self, Self::Cookie(_))
    }

    /// Header carrying the credential, if any.
    ///
    /// Fails when the credential is not a valid header value.
    pub fn header(&self, cookie_name: &str) -> Result<Option<(HeaderName, HeaderValue)>> {
        let (name, value) = match self {
            Self::Cookie(sid) => (COOKIE, format!("{cookie_name}={sid}")),
            Self::Bearer(token) => (AUTHORIZATION, format!("Bearer {token}")),
            Self::Anonymous => return Ok(None),
        };
        let value = HeaderValue::from_str(&value).map_err(|_| ApiError::InvalidRequest {
            message: format!("Stored {} credential is not a valid header value", self.label()),
        })?;
        Ok(Some((name, value)))
    }

    pub fn apply(&self, request: RequestBuilder, cookie_name: &str) -> Result<RequestBuilder> {
        Ok(match self.header(cookie_name)? {
            Some((name, value)) => request.header(name, value),
            None => request,
        })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Cookie(_) => "cookie",
            Self::Bearer(_) => "bearer",
            Self::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Picks exactly one authentication mode per call
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialResolver;

impl CredentialResolver {
    /// Cookie when a session id exists, bearer otherwise.
    ///
    /// `bootstrap` exempts the tooling-auth call that runs before any
    /// credential exists.
    pub fn resolve(credentials: &SessionCredentials, bootstrap: bool) -> Result<AuthMode> {
        if let Some(sid) = credentials.session_id() {
            return Ok(AuthMode::Cookie(sid.to_string()));
        }
        if let Some(token) = credentials.bearer_token() {
            return Ok(AuthMode::Bearer(token.to_string()));
        }
        if bootstrap {
            return Ok(AuthMode::Anonymous);
        }
        Err(ApiError::InvalidAccount)
    }

    /// Bearer mode regardless of any session cookie
    pub fn force_bearer(credentials: &SessionCredentials) -> Option<AuthMode> {
        credentials
            .bearer_token()
            .map(|token| AuthMode::Bearer(token.to_string()))
    }
}
