//! Shared configuration defaults.
//!
//! Every crate in the workspace reads its tunables through this module so the
//! defaults and the environment variable names live in one place.

use std::time::Duration;

/// Device bridge defaults.
pub mod device {
    /// Upper bound for a single remote subscription cancel during teardown.
    pub const DEFAULT_CANCEL_TIMEOUT_MS: u64 = 5000;
    /// Buffered notifications per adapter broadcast channel.
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;
    /// Finished action requests remembered per device.
    pub const DEFAULT_ACTION_HISTORY: usize = 100;
    /// Adapter id used when none is configured.
    pub const DEFAULT_ADAPTER_ID: &str = "wot-adapter";
}

/// Logging defaults.
pub mod logging {
    /// Filter applied when `RUST_LOG` is not set.
    pub const DEFAULT_FILTER: &str = "wotgate=info";
}

/// Environment variable names.
pub mod env_vars {
    use super::device;

    pub const CANCEL_TIMEOUT_MS: &str = "WOTGATE_CANCEL_TIMEOUT_MS";
    pub const EVENT_CHANNEL_CAPACITY: &str = "WOTGATE_EVENT_CHANNEL_CAPACITY";
    pub const LOG_JSON: &str = "WOTGATE_LOG_JSON";
    pub const ACTION_HISTORY: &str = "WOTGATE_ACTION_HISTORY";

    /// Cancel timeout from the environment, or the default.
    pub fn cancel_timeout_ms() -> u64 {
        parse_or(CANCEL_TIMEOUT_MS, device::DEFAULT_CANCEL_TIMEOUT_MS)
    }

    /// Event channel capacity from the environment, or the default.
    pub fn event_channel_capacity() -> usize {
        parse_or(EVENT_CHANNEL_CAPACITY, device::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Action history length from the environment, or the default.
    pub fn action_history() -> usize {
        parse_or(ACTION_HISTORY, device::DEFAULT_ACTION_HISTORY)
    }

    /// Whether JSON log output was requested.
    pub fn log_json() -> bool {
        parse_or(LOG_JSON, false)
    }

    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// Cancel timeout as a [`Duration`], honouring the environment override.
pub fn cancel_timeout() -> Duration {
    Duration::from_millis(env_vars::cancel_timeout_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        std::env::remove_var(env_vars::CANCEL_TIMEOUT_MS);
        std::env::remove_var(env_vars::EVENT_CHANNEL_CAPACITY);
        std::env::remove_var(env_vars::ACTION_HISTORY);

        assert_eq!(env_vars::cancel_timeout_ms(), device::DEFAULT_CANCEL_TIMEOUT_MS);
        assert_eq!(
            env_vars::event_channel_capacity(),
            device::DEFAULT_EVENT_CHANNEL_CAPACITY
        );
        assert_eq!(env_vars::action_history(), device::DEFAULT_ACTION_HISTORY);
        assert_eq!(
            cancel_timeout(),
            Duration::from_millis(device::DEFAULT_CANCEL_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_log_json_override() {
        std::env::set_var(env_vars::LOG_JSON, "true");
        assert!(env_vars::log_json());

        // Garbage falls back to the default
        std::env::set_var(env_vars::LOG_JSON, "maybe");
        assert!(!env_vars::log_json());

        std::env::remove_var(env_vars::LOG_JSON);
        assert!(!env_vars::log_json());
    }
}
