//! Configuration types.

use std::time::Duration;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Base URL of the remote onboarding service, e.g. `https://api.cvchatter.com`.
    pub api_base_url: String,
    /// Base URL of the extraction push channel, e.g. `wss://api.cvchatter.com`.
    pub ws_base_url: String,
    /// How long to wait for auth-context initialization before degrading.
    pub auth_wait_timeout: Duration,
    /// Interval of the poll-based completion fallback.
    pub extraction_poll_interval: Duration,
    /// Overall deadline for extraction completion (push or poll).
    pub extraction_deadline: Duration,
    /// Initial reconnect backoff for the push channel.
    pub reconnect_initial_backoff: Duration,
    /// Reconnect backoff ceiling.
    pub reconnect_max_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            auth_wait_timeout: Duration::from_secs(10),
            extraction_poll_interval: Duration::from_secs(5),
            extraction_deadline: Duration::from_secs(180), // 3 minutes
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}
