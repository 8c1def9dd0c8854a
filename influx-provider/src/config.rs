//! Provider configuration.

use std::time::Duration;

use clap::Args;

use crate::clients::{ApiError, InfluxClient, RetryPolicy};

/// Connection settings for the InfluxDB server.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// InfluxDB server URL
    #[arg(long, env = "INFLUXDB_URL", default_value = "http://localhost:8086")]
    pub url: String,

    /// API token sent as `Authorization: Token <token>`
    #[arg(long, env = "INFLUXDB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "INFLUXDB_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Attempts for idempotent requests (GET, DELETE)
    #[arg(long, env = "INFLUXDB_MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds, doubled per attempt
    #[arg(long, env = "INFLUXDB_BACKOFF_MS", default_value = "200")]
    pub backoff_ms: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    /// Build the HTTP client for these settings.
    pub fn connect(&self) -> Result<InfluxClient, ApiError> {
        InfluxClient::new(
            &self.url,
            self.token.clone(),
            self.timeout(),
            self.retry_policy(),
        )
    }
}
