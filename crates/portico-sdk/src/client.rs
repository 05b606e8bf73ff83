//! Session-aware HTTP client for the platform API
//!
//! Every call runs the same sequence:
//!
//! 1. Resolve credentials: the `connect.sid` cookie when present, the bearer
//!    access token otherwise.
//! 2. Send once. Transport failures surface unchanged.
//! 3. Decide whether the cookie session looks stale: a `>= 400` answer to a
//!    cookie request, or an empty session-introspection result, while a
//!    bearer token is available.
//! 4. If so, send the identical request once more with the bearer token. A
//!    second failure becomes [`ApiError::SessionInvalidated`].
//! 5. Report any rotated session cookie to the [`SessionSink`].
//! 6. Unwrap the result key or shape the platform's error.
//!
//! ```rust,no_run
//! use portico_sdk::{ClientBuilder, RequestOptions, SessionCredentials};
//!
//! # async fn example() -> portico_sdk::Result<()> {
//! let client = ClientBuilder::new()
//!     .base_url("https://platform.portico.dev")
//!     .build()?;
//!
//! let credentials = SessionCredentials::new("acme").with_access_token("token");
//! let teams: Vec<serde_json::Value> = client
//!     .request("/api/v1/teams", &credentials, RequestOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ApiError, Result};
use crate::session::{
    AuthMode, CredentialResolver, PathSessionProbe, SessionCredentials, SessionProbe, SessionSink,
    TokenProvider,
};
use crate::types::{RequestOptions, RequestOutcome, ResultKey};
use portico_common::auth_constants::{
    DEFAULT_RESULT_KEY, PLATFORM_BASE_URL, PLATFORM_TIMEOUT_SECS, SESSION_COOKIE_NAME,
};
use portico_common::PlatformConfig;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a call is retried with the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTrigger {
    /// The cookie request was answered with an error status
    RejectedCookie(u16),
    /// The session-introspection endpoint reported no session
    EmptySession,
}

impl std::fmt::Display for FallbackTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RejectedCookie(status) => write!(f, "cookie session rejected with {status}"),
            Self::EmptySession => f.write_str("session introspection returned no session"),
        }
    }
}

/// Decide whether the first answer warrants the bearer fallback.
///
/// Only cookie-mode calls with a bearer token on hand qualify.
pub fn fallback_trigger(
    mode: &AuthMode,
    has_bearer: bool,
    status: u16,
    session_missing: bool,
) -> Option<FallbackTrigger> {
    if !mode.is_cookie() || !has_bearer {
        return None;
    }
    if status >= 400 {
        return Some(FallbackTrigger::RejectedCookie(status));
    }
    if session_missing {
        return Some(FallbackTrigger::EmptySession);
    }
    None
}

/// A received response, body already read
#[derive(Debug)]
struct RawReply {
    status: StatusCode,
    new_sid: Option<String>,
    text: String,
    body: Option<Value>,
}

impl RawReply {
    fn new(status: StatusCode, new_sid: Option<String>, text: String) -> Self {
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };
        Self {
            status,
            new_sid,
            text,
            body,
        }
    }

    fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Best human-readable message for a failed reply
    fn error_message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| ErrorFields::extract(body, true))
            .and_then(|fields| fields.message)
            .or_else(|| (!self.text.trim().is_empty()).then(|| self.text.clone()))
            .unwrap_or_else(|| {
                format!(
                    "Request failed with status {}",
                    self.status.canonical_reason().unwrap_or("unknown")
                )
            })
    }
}

/// Structured error reported in a platform body
#[derive(Debug, Default, PartialEq)]
struct ErrorFields {
    message: Option<String>,
    code: Option<String>,
    status_code: Option<u16>,
}

impl ErrorFields {
    /// Look for `{"error": ...}`; for failed replies also accept top-level fields
    fn extract(body: &Value, failed: bool) -> Option<Self> {
        match body.get("error") {
            Some(Value::String(message)) => Some(Self {
                message: Some(message.clone()),
                ..Default::default()
            }),
            Some(error @ Value::Object(_)) => Some(Self::from_object(error)),
            _ if failed && body.is_object() => Some(Self::from_object(body)),
            _ => None,
        }
    }

    fn from_object(value: &Value) -> Self {
        let message = ["message", "description", "error_description"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        let code = value.get("code").and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let status_code = ["statusCode", "status_code", "status"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_u64))
            .and_then(|status| u16::try_from(status).ok());
        Self {
            message,
            code,
            status_code,
        }
    }
}

/// HTTP client for the platform API
pub struct PlatformClient {
    http_client: reqwest::Client,
    base_url: String,
    cookie_name: String,
    result_key: String,
    probe: Arc<dyn SessionProbe>,
    sink: Option<Arc<dyn SessionSink>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .field("cookie_name", &self.cookie_name)
            .field("result_key", &self.result_key)
            .field("has_sink", &self.sink.is_some())
            .field("has_token_provider", &self.token_provider.is_some())
            .finish()
    }
}

impl PlatformClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one authenticated call and deserialize its result
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        credentials: &SessionCredentials,
        options: RequestOptions,
    ) -> Result<T> {
        let outcome = self.execute(path, credentials, &options).await?;
        serde_json::from_value(outcome.result).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }

    /// Like [`request`](Self::request), reading credentials from the token provider
    pub async fn request_for_account<T: DeserializeOwned>(
        &self,
        account: &str,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let provider = self
            .token_provider
            .as_ref()
            .ok_or_else(|| ApiError::InvalidRequest {
                message: "No token provider configured".into(),
            })?;
        let credentials = provider.session_credentials(account).await?;
        self.request(path, &credentials, options).await
    }

    /// Perform one authenticated call, returning the unwrapped result and any rotated session.
    ///
    /// Only the reply that is kept is inspected for a rotated session: when
    /// the bearer fallback runs, a `Set-Cookie` on the rejected cookie attempt
    /// is ignored.
    pub async fn execute(
        &self,
        path: &str,
        credentials: &SessionCredentials,
        options: &RequestOptions,
    ) -> Result<RequestOutcome> {
        let mode = CredentialResolver::resolve(credentials, options.bootstrap)?;
        let first = self.send(path, options, &mode).await?;

        let session_missing = !first.is_error()
            && self
                .probe
                .reports_missing_session(path, &self.select_result(&first, &ResultKey::Default));
        let trigger = fallback_trigger(
            &mode,
            credentials.bearer_token().is_some(),
            first.status.as_u16(),
            session_missing,
        );

        let (reply, used_fallback) = match trigger {
            None => (first, false),
            Some(trigger) => {
                let bearer =
                    CredentialResolver::force_bearer(credentials).ok_or(ApiError::InvalidAccount)?;
                info!(
                    "Retrying {} for {} with bearer token: {}",
                    path, credentials.account, trigger
                );
                (self.retry_with_bearer(path, options, &bearer).await?, true)
            }
        };

        let new_sid = if reply.is_error() {
            None
        } else {
            self.capture_session(credentials, &reply).await
        };

        let result = self.unwrap_reply(&reply, options)?;
        Ok(RequestOutcome {
            result,
            new_sid,
            used_fallback,
        })
    }

    // ===== Private Helper Methods =====

    async fn send(&self, path: &str, options: &RequestOptions, mode: &AuthMode) -> Result<RawReply> {
        let url = format!("{}{}", self.base_url, path);
        let method = options.effective_method();
        debug!("{} {} ({} auth)", method, path, mode);

        let mut request = self.http_client.request(method, &url);
        if let Some(body) = &options.json {
            request = request.json(body);
        }
        let request = mode.apply(request, &self.cookie_name)?;

        let response = request.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        let new_sid = response
            .cookies()
            .find(|cookie| cookie.name() == self.cookie_name && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string());
        let text = response.text().await.map_err(ApiError::Transport)?;

        Ok(RawReply::new(status, new_sid, text))
    }

    async fn retry_with_bearer(
        &self,
        path: &str,
        options: &RequestOptions,
        bearer: &AuthMode,
    ) -> Result<RawReply> {
        match self.send(path, options, bearer).await {
            Ok(reply) if !reply.is_error() => Ok(reply),
            Err(e @ ApiError::InvalidRequest { .. }) => Err(e),
            Ok(reply) => Err(ApiError::invalidated(
                reply.error_message(),
                Some(reply.status.as_u16()),
            )),
            Err(e) => Err(ApiError::invalidated(e.message(), e.status_code())),
        }
    }

    /// Hand a rotated session id to the sink; a failing sink is logged, not fatal
    async fn capture_session(
        &self,
        credentials: &SessionCredentials,
        reply: &RawReply,
    ) -> Option<String> {
        let sid = reply.new_sid.clone()?;
        info!("Platform issued a new session for {}", credentials.account);
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(&credentials.account, &sid).await {
                warn!(
                    "Failed to persist new session for {}: {}",
                    credentials.account, e
                );
            }
        }
        Some(sid)
    }

    fn select_result(&self, reply: &RawReply, key: &ResultKey) -> Value {
        let Some(body) = reply.body.as_ref() else {
            return Value::Null;
        };
        match key {
            ResultKey::WholeBody => body.clone(),
            ResultKey::Default => body.get(&self.result_key).cloned().unwrap_or(Value::Null),
            ResultKey::Field(field) => body.get(field).cloned().unwrap_or(Value::Null),
        }
    }

    fn unwrap_reply(&self, reply: &RawReply, options: &RequestOptions) -> Result<Value> {
        let failed = reply.is_error();
        let context = options.error_context.as_deref();
        let http_status = failed.then(|| reply.status.as_u16());

        if let Some(fields) = reply
            .body
            .as_ref()
            .and_then(|body| ErrorFields::extract(body, failed))
        {
            let message = fields
                .message
                .unwrap_or_else(|| reply.error_message());
            return Err(ApiError::platform(
                context,
                message,
                fields.code,
                fields.status_code.or(http_status),
            ));
        }

        if failed {
            return Err(ApiError::platform(
                context,
                reply.error_message(),
                None,
                http_status,
            ));
        }

        Ok(self.select_result(reply, &options.result_key))
    }
}

/// Builder for constructing a [`PlatformClient`]
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
    cookie_name: Option<String>,
    result_key: Option<String>,
    probe: Option<Arc<dyn SessionProbe>>,
    sink: Option<Arc<dyn SessionSink>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded from configuration
    pub fn from_config(config: &PlatformConfig) -> Self {
        Self::new()
            .base_url(config.base_url.clone())
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .cookie_name(config.session_cookie.clone())
            .result_key(config.result_key.clone())
            .session_probe(PathSessionProbe::new(config.session_probe_paths.clone()))
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = Some(max);
        self
    }

    /// Session cookie name (default `connect.sid`)
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    /// Default result key (default `result`)
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    pub fn session_probe<P: SessionProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    pub fn session_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<PlatformClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| PLATFORM_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut http = reqwest::Client::builder().timeout(
            self.timeout
                .unwrap_or(Duration::from_secs(PLATFORM_TIMEOUT_SECS)),
        );
        if let Some(connect_timeout) = self.connect_timeout {
            http = http.connect_timeout(connect_timeout);
        }
        if let Some(max) = self.pool_max_idle_per_host {
            http = http.pool_max_idle_per_host(max);
        }
        let http_client = http.build().map_err(ApiError::HttpClient)?;

        Ok(PlatformClient {
            http_client,
            base_url,
            cookie_name: self
                .cookie_name
                .unwrap_or_else(|| SESSION_COOKIE_NAME.to_string()),
            result_key: self
                .result_key
                .unwrap_or_else(|| DEFAULT_RESULT_KEY.to_string()),
            probe: self
                .probe
                .unwrap_or_else(|| Arc::new(PathSessionProbe::default())),
            sink: self.sink,
            token_provider: self.token_provider,
        })
    }
}
