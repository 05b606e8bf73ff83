//! Shared building blocks for the Portico authentication crates
//!
//! - [`auth_constants`]: compiled-in defaults
//! - [`config`]: layered configuration (defaults, TOML file, environment)
//! - [`logging`]: `tracing` subscriber initialisation

pub mod auth_constants;
pub mod config;
pub mod error;
pub mod logging;

pub use config::{AuthConfig, CallbackConfig, PlatformConfig};
pub use error::ConfigurationError;
