//! Tracing initialisation.

use crate::config::{env_vars, logging};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise [`logging::DEFAULT_FILTER`] is used.
/// Output is JSON when `WOTGATE_LOG_JSON=true`, compact text otherwise.
/// Calling it again after a subscriber is installed is a no-op.
pub fn init() {
    init_with_filter(logging::DEFAULT_FILTER);
}

/// Same as [`init`] with a caller-provided fallback filter.
pub fn init_with_filter(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter).add_directive(tracing::Level::WARN.into()));

    let result = if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init();
        init_with_filter("debug");
        tracing::info!("logging initialised twice without panicking");
    }
}
