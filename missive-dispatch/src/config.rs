use std::{fmt, time::Duration};

use serde::Deserialize;

use crate::policy::RetryPolicy;

const fn default_tick_interval() -> u64 {
    10
}

const fn default_max_concurrent_campaigns() -> usize {
    8
}

const fn default_idempotency_ttl_days() -> u64 {
    30
}

const fn default_shutdown_timeout() -> u64 {
    30
}

fn default_unsubscribe_base_url() -> String {
    "http://localhost:8080/unsubscribe".to_string()
}

/// Dispatch configuration
///
/// ```ron
/// dispatch: (
///     tick_interval_secs: 10,
///     max_concurrent_campaigns: 8,
///     idempotency_ttl_days: 30,
///     retry: (max_attempts: 5, base_delay_ms: 1000),
///     unsubscribe: (
///         base_url: "https://mail.example.com/unsubscribe",
///         secret: "change-me",
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// How often the trigger fires (in seconds)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Campaigns processed in parallel per tick
    #[serde(default = "default_max_concurrent_campaigns")]
    pub max_concurrent_campaigns: usize,

    /// Lifetime of idempotency markers and cursors (in days)
    #[serde(default = "default_idempotency_ttl_days")]
    pub idempotency_ttl_days: u64,

    /// How long shutdown waits for in-flight batches (in seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub unsubscribe: UnsubscribeConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            max_concurrent_campaigns: default_max_concurrent_campaigns(),
            idempotency_ttl_days: default_idempotency_ttl_days(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            retry: RetryPolicy::default(),
            unsubscribe: UnsubscribeConfig::default(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    #[must_use]
    pub const fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_days.saturating_mul(24 * 60 * 60))
    }

    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Where unsubscribe links point and the key their tokens are signed with
#[derive(Clone, Deserialize)]
pub struct UnsubscribeConfig {
    #[serde(default = "default_unsubscribe_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub secret: String,
}

impl fmt::Debug for UnsubscribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeConfig")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Default for UnsubscribeConfig {
    fn default() -> Self {
        Self {
            base_url: default_unsubscribe_base_url(),
            secret: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(10));
        assert_eq!(config.max_concurrent_campaigns, 8);
        assert_eq!(config.idempotency_ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_debug_redacts_unsubscribe_secret() {
        let config = DispatchConfig {
            unsubscribe: UnsubscribeConfig {
                secret: "hunter2-signing-key".to_string(),
                ..UnsubscribeConfig::default()
            },
            ..DispatchConfig::default()
        };

        assert!(!format!("{config:?}").contains("hunter2-signing-key"));
    }
}
