//! Configuration module for the enrichment service.

use std::time::Duration;
use thiserror::Error;

use crate::clients::huggingface::{DEFAULT_MODEL, HF_INFERENCE_API_BASE};
use crate::services::RetryPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub hf_api_base: String,
    pub hf_endpoint_url: Option<String>,
    pub embedding_model: String,
    /// Name of the environment variable holding the provider token.
    pub credential_env_var: String,
    pub store_path: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub rate_limit_per_second: f64,
    pub rate_limit_burst: u32,
    pub cache_size: usize,
    pub dead_letter_capacity: usize,
    pub change_feed_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3030,
            host: "0.0.0.0".to_string(),
            hf_api_base: HF_INFERENCE_API_BASE.to_string(),
            hf_endpoint_url: None,
            embedding_model: DEFAULT_MODEL.to_string(),
            credential_env_var: "HUGGINGFACE_API_TOKEN".to_string(),
            store_path: "./data/wardrobe.sled".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_initial_ms: 500,
            retry_max_ms: 10_000,
            rate_limit_per_second: 1.0,
            rate_limit_burst: 1,
            cache_size: 0,
            dead_letter_capacity: 1000,
            change_feed_capacity: 1024,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT", defaults.port),
            host: std::env::var("HOST").unwrap_or(defaults.host),
            hf_api_base: std::env::var("HF_API_BASE").unwrap_or(defaults.hf_api_base),
            hf_endpoint_url: std::env::var("HF_ENDPOINT_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            credential_env_var: std::env::var("CREDENTIAL_ENV_VAR")
                .unwrap_or(defaults.credential_env_var),
            store_path: std::env::var("STORE_PATH").unwrap_or(defaults.store_path),
            timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", defaults.timeout_seconds),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            retry_initial_ms: env_parse("RETRY_INITIAL_MS", defaults.retry_initial_ms),
            retry_max_ms: env_parse("RETRY_MAX_MS", defaults.retry_max_ms),
            rate_limit_per_second: env_parse(
                "RATE_LIMIT_PER_SECOND",
                defaults.rate_limit_per_second,
            ),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            cache_size: env_parse("EMBEDDING_CACHE_SIZE", defaults.cache_size),
            dead_letter_capacity: env_parse("DEAD_LETTER_CAPACITY", defaults.dead_letter_capacity),
            change_feed_capacity: env_parse("CHANGE_FEED_CAPACITY", defaults.change_feed_capacity),
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                key: "PORT",
                reason: "must be non-zero".to_string(),
            });
        }
        if !self.rate_limit_per_second.is_finite() || self.rate_limit_per_second < 0.0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_PER_SECOND",
                reason: format!("{} is not a non-negative rate", self.rate_limit_per_second),
            });
        }
        if self.rate_limit_per_second > 0.0 && self.rate_limit_burst == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_BURST",
                reason: "must be at least 1 when rate limiting is enabled".to_string(),
            });
        }
        if self.retry_initial_ms > self.retry_max_ms {
            return Err(ConfigError::Invalid {
                key: "RETRY_INITIAL_MS",
                reason: "must not exceed RETRY_MAX_MS".to_string(),
            });
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "EMBEDDING_MODEL",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries,
            Duration::from_millis(self.retry_initial_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }
}
