//! Tracing subscriber setup for tools embedding the kernel.
//!
//! - `RUST_LOG`: filter directives (default `revision_kernel=info,sqlx=warn`)
//! - `LOG_FORMAT`: `json` (default) or `pretty`

use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "revision_kernel=info,sqlx=warn";

/// Output format of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Flattened JSON events.
    Json,
    /// Human-readable output for local development.
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything but `pretty` selects JSON.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("pretty") => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Install the global subscriber, failing if one is already installed.
pub fn try_init_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
    }
}

/// Install the global subscriber.
///
/// A subscriber installed earlier (by a test harness, say) is kept.
pub fn init_tracing() {
    if let Err(e) = try_init_tracing() {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(try_init_tracing().is_err());
    }
}
