//! Log output for hosts of the engine. Logs go to stderr so command output
//! on stdout stays machine readable.

use crate::config::TelemetryConfig;
use crate::workflows::compliance::audit::AUDIT_TARGET;
use std::fmt;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    InvalidFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::InvalidFilter { value, .. } => {
                write!(f, "log filter '{value}' is not a valid tracing directive")
            }
            TelemetryError::Subscriber(err) => write!(f, "could not install subscriber: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::InvalidFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Filter for a configured level. Audit events stay visible at `info` even
/// when the general level is quieter.
pub fn filter_for(level: &str) -> Result<EnvFilter, TelemetryError> {
    let filter = EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidFilter {
        value: level.to_string(),
        source,
    })?;
    with_audit(filter, level)
}

fn with_audit(filter: EnvFilter, value: &str) -> Result<EnvFilter, TelemetryError> {
    let audit: Directive = format!("{AUDIT_TARGET}=info").parse().map_err(|source| {
        TelemetryError::InvalidFilter {
            value: value.to_string(),
            source,
        }
    })?;
    Ok(filter.add_directive(audit))
}

/// A usable `RUST_LOG` value wins over the configured level; either way the
/// audit target is added.
fn select_filter(env: Option<&str>, level: &str) -> Result<EnvFilter, TelemetryError> {
    let from_env = env
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok().map(|filter| (filter, value)));

    match from_env {
        Some((filter, value)) => with_audit(filter, value),
        None => filter_for(level),
    }
}

/// Install the global subscriber.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = select_filter(env.as_deref(), &config.log_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
