//! Authentication constants shared by the callback server and the platform client
//!
//! These values are compiled in so that the SDK works without any
//! configuration file. Every one of them can be overridden through
//! [`crate::config::AuthConfig`].

/// Loopback host the callback listener binds to
pub const CALLBACK_HOST: &str = "127.0.0.1";

/// Port tried first for the callback listener before falling back to an OS-assigned one
pub const CALLBACK_PREFERRED_PORT: u16 = 8085;

/// Path prefix under which every pending callback is served
pub const CALLBACK_PATH_PREFIX: &str = "/callback";

/// How long a pending interactive login waits for the browser
pub const CALLBACK_TIMEOUT_SECS: u64 = 120;

/// Random bytes used for each callback id (hex-encoded in the URL)
pub const CALLBACK_ID_BYTES: usize = 8;

/// Smallest id size accepted from configuration
pub const CALLBACK_MIN_ID_BYTES: usize = 4;

/// Name of the platform session cookie
pub const SESSION_COOKIE_NAME: &str = "connect.sid";

/// Session introspection endpoint that answers `200` with a null result when
/// there is no active session
pub const SESSION_PROBE_PATH: &str = "/api/v1/auth/findSession";

/// Default key holding the payload in platform responses
pub const DEFAULT_RESULT_KEY: &str = "result";

/// Platform API base URL
pub const PLATFORM_BASE_URL: &str = "https://platform.portico.dev";

/// Platform request timeout
pub const PLATFORM_TIMEOUT_SECS: u64 = 60;

/// Platform connect timeout
pub const PLATFORM_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PORTICO_";
