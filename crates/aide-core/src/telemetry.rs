//! Tracing subscriber setup
//!
//! Development gets compact human-readable lines on stderr, production
//! gets one JSON object per event. `RUST_LOG` overrides the default
//! filter in both modes.

use crate::config::Environment;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber
///
/// # Errors
/// When a global subscriber is already installed
pub fn init(environment: Environment) -> Result<(), TryInitError> {
    init_with_filter(environment, DEFAULT_FILTER)
}

/// Install the global subscriber with a fallback filter directive
///
/// # Errors
/// When a global subscriber is already installed
pub fn init_with_filter(environment: Environment, fallback: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let registry = tracing_subscriber::registry().with(filter);

    if environment.is_production() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    }
}

/// Best-effort subscriber for tests; repeated calls are ignored
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        init_test_logging();
        assert!(init(Environment::Production).is_err());
        init_test_logging();
    }
}
