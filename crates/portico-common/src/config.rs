//! Layered configuration for interactive login and platform calls
//!
//! Values are resolved in this order, later sources winning:
//! 1. Compiled-in defaults from [`crate::auth_constants`]
//! 2. A TOML file (explicit path, or `<config dir>/portico/auth.toml`)
//! 3. `PORTICO_` environment variables, `__` separating sections
//!    (e.g. `PORTICO_CALLBACK__TIMEOUT_SECS=30`)

use crate::auth_constants::*;
use crate::error::ConfigurationError;
use etcetera::{choose_base_strategy, BaseStrategy};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Local callback listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallbackConfig {
    /// Host to bind; must be a loopback address
    pub host: String,

    /// Port tried first; `0` lets the OS choose
    pub preferred_port: u16,

    /// Seconds a pending login waits for the browser
    pub timeout_secs: u64,

    /// Random bytes per callback id
    pub id_bytes: usize,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: CALLBACK_HOST.to_string(),
            preferred_port: CALLBACK_PREFERRED_PORT,
            timeout_secs: CALLBACK_TIMEOUT_SECS,
            id_bytes: CALLBACK_ID_BYTES,
        }
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Platform API client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the platform API
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Name of the session cookie
    pub session_cookie: String,

    /// Key holding the payload in response bodies
    pub result_key: String,

    /// Endpoints that answer `200` with a null result when the cookie session is gone
    pub session_probe_paths: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: PLATFORM_BASE_URL.to_string(),
            timeout_secs: PLATFORM_TIMEOUT_SECS,
            connect_timeout_secs: PLATFORM_CONNECT_TIMEOUT_SECS,
            session_cookie: SESSION_COOKIE_NAME.to_string(),
            result_key: DEFAULT_RESULT_KEY.to_string(),
            session_probe_paths: vec![SESSION_PROBE_PATH.to_string()],
        }
    }
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Top-level authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub callback: CallbackConfig,
    pub platform: PlatformConfig,
}

impl AuthConfig {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from(Self::default_path().as_deref())
    }

    /// Load configuration, reading `path` if given and present
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut figment = Figment::from(Serialized::defaults(AuthConfig::default()));

        if let Some(path) = path {
            if path.exists() {
                debug!("Loading auth configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AuthConfig = figment
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file, e.g. `~/.config/portico/auth.toml` on Linux
    pub fn default_path() -> Option<PathBuf> {
        choose_base_strategy()
            .ok()
            .map(|strategy| strategy.config_dir().join("portico").join("auth.toml"))
    }

    /// Reject values the callback server or client cannot work with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let loopback = self.callback.host == "localhost"
            || self
                .callback
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if !loopback {
            return Err(ConfigurationError::InvalidValue {
                key: "callback.host".to_string(),
                reason: format!("{} is not a loopback address", self.callback.host),
            });
        }

        if self.callback.id_bytes < CALLBACK_MIN_ID_BYTES {
            return Err(ConfigurationError::InvalidValue {
                key: "callback.id_bytes".to_string(),
                reason: format!("must be at least {CALLBACK_MIN_ID_BYTES}"),
            });
        }

        if self.callback.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "callback.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.platform.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "platform.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Serialize the defaults as an example TOML file
    pub fn generate_example() -> Result<String, ConfigurationError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.callback.host, "127.0.0.1");
        assert_eq!(config.callback.timeout(), Duration::from_secs(120));
        assert_eq!(config.platform.session_cookie, "connect.sid");
        assert_eq!(
            config.platform.session_probe_paths,
            vec!["/api/v1/auth/findSession".to_string()]
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[callback]
preferred_port = 0
timeout_secs = 5

[platform]
base_url = "http://localhost:4000"
"#
        )
        .unwrap();

        let config = AuthConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.callback.preferred_port, 0);
        assert_eq!(config.callback.timeout_secs, 5);
        assert_eq!(config.callback.id_bytes, CALLBACK_ID_BYTES);
        assert_eq!(config.platform.base_url, "http://localhost:4000");
        assert_eq!(config.platform.result_key, "result");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig::load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.callback, CallbackConfig::default());
    }

    #[test]
    fn test_rejects_public_host() {
        let mut config = AuthConfig::default();
        config.callback.host = "0.0.0.0".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_short_ids() {
        let mut config = AuthConfig::default();
        config.callback.id_bytes = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_example_round_trips() {
        let example = AuthConfig::generate_example().unwrap();
        assert!(example.contains("[callback]"));
        let parsed: AuthConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed, AuthConfig::default());
    }
}
