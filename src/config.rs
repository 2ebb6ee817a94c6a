//! Client configuration (SPEC_FULL §B): region, table defaults, deadline
//! buffers, retry policy, and the KMS key identifier, assembled by a
//! builder in the style of the teacher's `ConsoleConfig`/`ZeroKMSConfig`
//! pair — a `...Builder` with typed setters plus a `.with_env()` that
//! layers environment variables underneath whatever the caller already
//! set, and a fallible `.build()` that only then checks the required
//! fields are present.

use crate::deadline::{DEFAULT_EXECUTOR_BUFFER, DEFAULT_SCHEDULING_BUFFER};
use crate::error::ConfigError;
use crate::retry::BackoffPolicy;
use crate::session::DEFAULT_REFRESH_WINDOW;
use std::time::Duration;

const ENV_REGION: &str = "TABLETHEORY_REGION";
const ENV_TABLE: &str = "TABLETHEORY_TABLE";
const ENV_KMS_KEY_ID: &str = "TABLETHEORY_KMS_KEY_ID";
const ENV_EXECUTOR_BUFFER_MS: &str = "TABLETHEORY_EXECUTOR_BUFFER_MS";
const ENV_SCHEDULING_BUFFER_MS: &str = "TABLETHEORY_SCHEDULING_BUFFER_MS";
const ENV_SESSION_REFRESH_WINDOW_SECS: &str = "TABLETHEORY_SESSION_REFRESH_WINDOW_SECS";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: String,
    pub default_table: Option<String>,
    pub kms_key_id: Option<String>,
    pub executor_buffer: Duration,
    pub scheduling_buffer: Duration,
    pub session_refresh_window: Duration,
    pub batch_retry_policy: BackoffPolicy,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    region: Option<String>,
    default_table: Option<String>,
    kms_key_id: Option<String>,
    executor_buffer: Option<Duration>,
    scheduling_buffer: Option<Duration>,
    session_refresh_window: Option<Duration>,
    batch_retry_policy: Option<BackoffPolicy>,
}

impl ClientConfigBuilder {
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = Some(value.into());
        self
    }

    pub fn default_table(mut self, value: impl Into<String>) -> Self {
        self.default_table = Some(value.into());
        self
    }

    pub fn kms_key_id(mut self, value: impl Into<String>) -> Self {
        self.kms_key_id = Some(value.into());
        self
    }

    pub fn executor_buffer(mut self, value: Duration) -> Self {
        self.executor_buffer = Some(value);
        self
    }

    pub fn scheduling_buffer(mut self, value: Duration) -> Self {
        self.scheduling_buffer = Some(value);
        self
    }

    pub fn session_refresh_window(mut self, value: Duration) -> Self {
        self.session_refresh_window = Some(value);
        self
    }

    pub fn batch_retry_policy(mut self, value: BackoffPolicy) -> Self {
        self.batch_retry_policy = Some(value);
        self
    }

    /// Layer environment variables underneath whatever has already been
    /// set explicitly — an explicit setter call always wins over the
    /// environment, matching the teacher's config builders.
    pub fn with_env(mut self) -> Self {
        if self.region.is_none() {
            self.region = std::env::var(ENV_REGION).ok();
        }
        if self.default_table.is_none() {
            self.default_table = std::env::var(ENV_TABLE).ok();
        }
        if self.kms_key_id.is_none() {
            self.kms_key_id = std::env::var(ENV_KMS_KEY_ID).ok();
        }
        if self.executor_buffer.is_none() {
            self.executor_buffer = parse_millis_env(ENV_EXECUTOR_BUFFER_MS);
        }
        if self.scheduling_buffer.is_none() {
            self.scheduling_buffer = parse_millis_env(ENV_SCHEDULING_BUFFER_MS);
        }
        if self.session_refresh_window.is_none() {
            self.session_refresh_window = std::env::var(ENV_SESSION_REFRESH_WINDOW_SECS)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
        }
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let region = self.region.ok_or(ConfigError::Missing("region"))?;
        if region.is_empty() {
            return Err(ConfigError::Invalid { key: "region", reason: "must not be empty".to_string() });
        }

        Ok(ClientConfig {
            region,
            default_table: self.default_table,
            kms_key_id: self.kms_key_id,
            executor_buffer: self.executor_buffer.unwrap_or(DEFAULT_EXECUTOR_BUFFER),
            scheduling_buffer: self.scheduling_buffer.unwrap_or(DEFAULT_SCHEDULING_BUFFER),
            session_refresh_window: self.session_refresh_window.unwrap_or(DEFAULT_REFRESH_WINDOW),
            batch_retry_policy: self.batch_retry_policy.unwrap_or_default(),
        })
    }
}

fn parse_millis_env(key: &str) -> Option<Duration> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn build_fails_without_region() {
        let err = ClientConfig::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("region")));
    }

    #[test]
    fn build_fills_in_defaults() {
        let cfg = ClientConfig::builder().region("us-east-1").build().unwrap();
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.executor_buffer, DEFAULT_EXECUTOR_BUFFER);
        assert_eq!(cfg.scheduling_buffer, DEFAULT_SCHEDULING_BUFFER);
        assert!(cfg.default_table.is_none());
    }

    #[test]
    #[serial]
    fn with_env_fills_unset_fields_only() {
        std::env::set_var(ENV_REGION, "eu-west-1");
        std::env::set_var(ENV_TABLE, "widgets");
        let cfg = ClientConfig::builder().region("us-east-1").with_env().build().unwrap();
        // Explicit setter wins over the environment.
        assert_eq!(cfg.region, "us-east-1");
        // Unset field is filled from the environment.
        assert_eq!(cfg.default_table.as_deref(), Some("widgets"));
        std::env::remove_var(ENV_REGION);
        std::env::remove_var(ENV_TABLE);
    }
}
