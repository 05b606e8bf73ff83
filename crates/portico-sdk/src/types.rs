//! Request and response types for platform calls

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

/// Which part of the response body a call returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultKey {
    /// The client's configured key (`result` unless overridden)
    #[default]
    Default,
    /// A specific top-level field
    Field(String),
    /// The whole parsed body
    WholeBody,
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Explicit method; otherwise `POST` with a JSON body, `GET` without
    pub method: Option<Method>,
    pub json: Option<Value>,
    pub result_key: ResultKey,
    /// Prefix for error messages, e.g. "Failed to list teams"
    pub error_context: Option<String>,
    /// Tooling-auth bootstrap: proceed even without credentials
    pub bootstrap: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> crate::Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| crate::ApiError::InvalidRequest {
            message: format!("Failed to serialize request body: {e}"),
        })?;
        self.json = Some(value);
        Ok(self)
    }

    pub fn json_value(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = ResultKey::Field(key.into());
        self
    }

    pub fn whole_body(mut self) -> Self {
        self.result_key = ResultKey::WholeBody;
        self
    }

    pub fn error_context(mut self, context: impl Into<String>) -> Self {
        self.error_context = Some(context.into());
        self
    }

    pub fn bootstrap(mut self) -> Self {
        self.bootstrap = true;
        self
    }

    /// Method actually sent
    pub fn effective_method(&self) -> Method {
        match (&self.method, &self.json) {
            (Some(method), _) => method.clone(),
            (None, Some(_)) => Method::POST,
            (None, None) => Method::GET,
        }
    }
}

/// Outcome of one platform call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// Unwrapped result value
    pub result: Value,
    /// Session id the platform rotated during this call
    pub new_sid: Option<String>,
    /// Whether the bearer fallback produced the response
    pub used_fallback: bool,
}
