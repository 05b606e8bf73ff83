//! Detection of "no active session" answers that arrive as `200 OK`

use serde_json::Value;

/// Decides whether a successful response actually means the cookie session is gone
pub trait SessionProbe: Send + Sync {
    /// `path` is the request path without query; `result` is the unwrapped result
    fn reports_missing_session(&self, path: &str, result: &Value) -> bool;
}

/// Treats a null result from any of the configured paths as "no session"
#[derive(Debug, Clone)]
pub struct PathSessionProbe {
    paths: Vec<String>,
}

impl PathSessionProbe {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for PathSessionProbe {
    fn default() -> Self {
        Self::new([portico_common::auth_constants::SESSION_PROBE_PATH])
    }
}

impl SessionProbe for PathSessionProbe {
    fn reports_missing_session(&self, path: &str, result: &Value) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        result.is_null() && self.paths.iter().any(|p| p == path)
    }
}
