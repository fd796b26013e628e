use std::time::Duration;

use thiserror::Error;

use crate::handlers::lifecycle::DEFAULT_CALLBACK_RESERVE;
use crate::runtime::polling::{PollPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};

pub const POLL_INTERVAL_ENV: &str = "INVALIDATION_POLL_INTERVAL_SECONDS";
pub const POLL_TIMEOUT_ENV: &str = "INVALIDATION_TIMEOUT_SECONDS";
pub const CALLBACK_RESERVE_ENV: &str = "CALLBACK_RESERVE_SECONDS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} must be a whole number of seconds, got '{value}'")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    pub poll_policy: PollPolicy,
    pub callback_reserve: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            poll_policy: PollPolicy::default(),
            callback_reserve: DEFAULT_CALLBACK_RESERVE,
        }
    }
}

impl HandlerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Unset or blank variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let seconds = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError { name, value: raw }),
                _ => Ok(default),
            }
        };

        Ok(Self {
            poll_policy: PollPolicy::new(
                seconds(POLL_INTERVAL_ENV, DEFAULT_POLL_INTERVAL)?,
                seconds(POLL_TIMEOUT_ENV, DEFAULT_POLL_TIMEOUT)?,
            ),
            callback_reserve: seconds(CALLBACK_RESERVE_ENV, DEFAULT_CALLBACK_RESERVE)?,
        })
    }
}
