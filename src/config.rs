//! Runtime configuration
//!
//! Settings come from environment variables, falling back to defaults that
//! match the remote service's expected behavior (60 s probe budget, 5 s
//! retry delay).

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default base URL of the remote health service
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Default request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Budget for one availability probe in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

/// Delay before re-probing a service that is still starting, in seconds
pub const DEFAULT_PROBE_RETRY_DELAY_SECS: u64 = 5;

/// Maximum number of re-probes while the service is starting
pub const DEFAULT_PROBE_MAX_RETRIES: u32 = 24;

/// Configuration for talking to the remote health service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL, e.g. `https://example.com/api`
    pub api_base_url: String,
    /// Per-request timeout for sync and listing calls
    pub request_timeout_secs: u64,
    /// TCP connect timeout
    pub connect_timeout_secs: u64,
    /// Availability probing policy
    pub probe: ProbePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            probe: ProbePolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment
    pub fn from_env() -> Self {
        Self {
            api_base_url: env::var("HEALTH_SYNC_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            request_timeout_secs: env_parse(
                "HEALTH_SYNC_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            connect_timeout_secs: env_parse(
                "HEALTH_SYNC_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
            probe: ProbePolicy::from_env(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Timeout and retry policy for availability probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePolicy {
    /// Budget for a single probe before it counts as "starting"
    pub timeout: Duration,
    /// Wait between a "starting" result and the next probe
    pub retry_delay: Duration,
    /// Re-probes allowed after the first attempt
    pub max_retries: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            retry_delay: Duration::from_secs(DEFAULT_PROBE_RETRY_DELAY_SECS),
            max_retries: DEFAULT_PROBE_MAX_RETRIES,
        }
    }
}

impl ProbePolicy {
    /// Load probe policy from environment
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(env_parse(
                "HEALTH_SYNC_PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )),
            retry_delay: Duration::from_secs(env_parse(
                "HEALTH_SYNC_PROBE_RETRY_DELAY_SECS",
                DEFAULT_PROBE_RETRY_DELAY_SECS,
            )),
            max_retries: env_parse("HEALTH_SYNC_PROBE_MAX_RETRIES", DEFAULT_PROBE_MAX_RETRIES),
        }
    }

    /// Probe once without retrying
    pub fn single_attempt(mut self) -> Self {
        self.max_retries = 0;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.probe.timeout, Duration::from_secs(60));
        assert_eq!(config.probe.retry_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("HEALTH_SYNC_TEST_GARBAGE", "soon");
        assert_eq!(env_parse("HEALTH_SYNC_TEST_GARBAGE", 7u64), 7);

        std::env::set_var("HEALTH_SYNC_TEST_NUMBER", " 12 ");
        assert_eq!(env_parse("HEALTH_SYNC_TEST_NUMBER", 7u64), 12);
    }

    #[test]
    fn test_single_attempt_disables_retries() {
        let policy = ProbePolicy::default().single_attempt();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_with_base_url() {
        let config = SyncConfig::default().with_base_url("https://example.com/api");
        assert_eq!(config.api_base_url, "https://example.com/api");
    }
}
