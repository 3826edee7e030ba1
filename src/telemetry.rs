//! Tracing subscriber setup.

use std::env;

use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;

pub const LOG_ENV_VAR: &str = "CERT_PROVISIONER_LOG";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("could not install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Pick the log filter: `CERT_PROVISIONER_LOG`, then `RUST_LOG`, then the
/// configured value.
pub fn resolve_filter(configured: &str) -> String {
    env::var(LOG_ENV_VAR)
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| configured.to_string())
}

/// Install the global subscriber. Logs go to stderr so they never interleave
/// with the interactive prompts on stdout.
///
/// # Errors
///
/// Fails on an unparsable filter or when a subscriber is already installed.
pub fn init_tracing(configured_filter: &str) -> Result<(), TelemetryError> {
    let filter = resolve_filter(configured_filter);
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        );
    set_global_default(subscriber)?;
    Ok(())
}
