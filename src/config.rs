//! Client configuration.
//!
//! Loaded from YAML and then overridden by `UNICHAT_*` environment variables:
//!
//! ```yaml
//! retry:
//!   max_retries: 2
//!   initial_delay_ms: 500
//!   validation_retries: 1
//! http:
//!   base_url: http://localhost:8080/v1
//!   headers:
//!     authorization: Bearer sk-...
//! validator_cache_size: 64
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::resilience::RetryPolicy;
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
    pub validation_retries: Option<u32>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
            validation_retries: None,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let policy = RetryPolicy::new(settings.max_retries)
            .with_initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
            .with_multiplier(settings.multiplier)
            .with_jitter(settings.jitter);
        match settings.validation_retries {
            Some(n) => policy.with_validation_retries(n),
            None => policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Overrides the driver's default base URL.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
    /// Sent with every request. Authentication goes here.
    pub headers: HashMap<String, String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub retry: RetrySettings,
    pub http: HttpSettings,
    pub validator_cache_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            http: HttpSettings::default(),
            validator_cache_size: 128,
        }
    }
}

fn config_error(msg: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(msg, ErrorContext::new().with_details(details).with_source("client_config"))
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| config_error(format!("invalid value for {}", name), raw)),
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| config_error("failed to parse client config", e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("failed to read {}", path.display()), e.to_string()))?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Apply `UNICHAT_*` overrides on top of this config.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(v) = env_parse("UNICHAT_MAX_RETRIES")? {
            self.retry.max_retries = v;
        }
        if let Some(v) = env_parse("UNICHAT_INITIAL_DELAY_MS")? {
            self.retry.initial_delay_ms = v;
        }
        if let Some(v) = env_parse("UNICHAT_MAX_DELAY_MS")? {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = env_parse("UNICHAT_BACKOFF_MULTIPLIER")? {
            self.retry.multiplier = v;
        }
        if let Some(v) = env_parse::<String>("UNICHAT_JITTER")? {
            self.retry.jitter = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = env_parse("UNICHAT_VALIDATION_RETRIES")? {
            self.retry.validation_retries = Some(v);
        }
        if let Some(v) = env_parse("UNICHAT_HTTP_TIMEOUT_SECS")? {
            self.http.timeout_secs = v;
        }
        if let Ok(url) = env::var("UNICHAT_BASE_URL") {
            if !url.trim().is_empty() {
                self.http.base_url = Some(url.trim().to_string());
            }
        }
        Ok(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
