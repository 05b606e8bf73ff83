//! Logging initialisation for binaries embedding the Portico SDK
//!
//! Filter priority:
//! 1. CLI flags (`-v/-q`)
//! 2. `RUST_LOG`
//! 3. The caller's default filter

use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for SDK consumers
pub const DEFAULT_FILTER: &str = "portico_sdk=info,portico_common=info";

/// Build the filter from verbosity flags, `RUST_LOG`, then `default_filter`
fn build_filter<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<EnvFilter> {
    let filter = if let Some(log_level) = verbosity.log_level() {
        EnvFilter::try_new(format!("{}", log_level))?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    Ok(filter)
}

/// Initialize logging with the given verbosity and default filter.
///
/// ```no_run
/// use clap_verbosity_flag::{InfoLevel, Verbosity};
/// use portico_common::logging;
///
/// let verbosity: Verbosity<InfoLevel> = Verbosity::new(1, 0);
/// logging::init_logging(&verbosity, logging::DEFAULT_FILTER).unwrap();
/// ```
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<()> {
    let filter = build_filter(verbosity, default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Install a test-writer subscriber; repeated calls are ignored
pub fn try_init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("portico_sdk=debug,portico_common=debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
