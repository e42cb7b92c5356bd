//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default registry API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://app.buildstash.com/api/v1";

/// Registry API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the registry API; endpoint paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key sent as the bearer credential.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds, applied to API calls and presigned PUTs.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// Keep the API key out of logs.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate API configuration.
    pub fn validate(&self) -> Result<(), String> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err("api.base_url must not be empty".to_string());
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(format!(
                "api.base_url must start with http:// or https:// (got {base})"
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("api.request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Transfer tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum number of part uploads in flight across all files.
    #[serde(default = "default_max_parallel_parts")]
    pub max_parallel_parts: usize,
    /// Attempts per part (presign + PUT) and per API call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled for every further attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Overall publication deadline. Unset means no deadline.
    #[serde(default)]
    pub publish_timeout_secs: Option<u64>,
}

fn default_max_parallel_parts() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_parallel_parts: default_max_parallel_parts(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            publish_timeout_secs: None,
        }
    }
}

impl TransferConfig {
    /// Base retry delay as a Duration.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Overall publication deadline, if any.
    pub fn publish_timeout(&self) -> Option<Duration> {
        self.publish_timeout_secs.map(Duration::from_secs)
    }

    /// Validate transfer configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_parallel_parts == 0 {
            return Err("transfer.max_parallel_parts must be at least 1".to_string());
        }
        if self.max_attempts == 0 {
            return Err("transfer.max_attempts must be at least 1".to_string());
        }
        if self.publish_timeout_secs == Some(0) {
            return Err("transfer.publish_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// CI context configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiConfig {
    /// Source tag reported with every upload.
    #[serde(default = "default_source")]
    pub source: String,
    /// Root URL of the CI server, used to make run and pipeline URLs absolute.
    #[serde(default)]
    pub root_url: Option<String>,
}

fn default_source() -> String {
    "jenkins".to_string()
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            root_url: None,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry API configuration.
    #[serde(default)]
    pub api: ApiConfig,
    /// Transfer tuning.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// CI context configuration.
    #[serde(default)]
    pub ci: CiConfig,
}

impl AppConfig {
    /// Create a test configuration pointing at `base_url` with fast retries.
    ///
    /// **For testing only.**
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                api_key: Some("test-api-key".to_string()),
                request_timeout_secs: 10,
            },
            transfer: TransferConfig {
                retry_base_delay_ms: 10,
                ..TransferConfig::default()
            },
            ci: CiConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.api.validate()?;
        self.transfer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.api.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.transfer.max_parallel_parts, 4);
        assert_eq!(config.transfer.max_attempts, 3);
        assert_eq!(config.transfer.retry_base_delay(), Duration::from_secs(1));
        assert!(config.transfer.publish_timeout().is_none());
        assert_eq!(config.ci.source, "jenkins");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [api]
            api_key = "secret"

            [transfer]
            max_parallel_parts = 8
            publish_timeout_secs = 600
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.transfer.max_parallel_parts, 8);
        assert_eq!(config.transfer.max_attempts, 3);
        assert_eq!(
            config.transfer.publish_timeout(),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.transfer.max_parallel_parts = 0;
        assert!(config.validate().unwrap_err().contains("max_parallel_parts"));

        let mut config = AppConfig::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().unwrap_err().contains("base_url"));

        let mut config = AppConfig::default();
        config.transfer.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AppConfig::for_testing("http://localhost");
        let rendered = format!("{:?}", config.api);
        assert!(!rendered.contains("test-api-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
