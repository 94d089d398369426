use std::collections::HashMap;
use std::sync::Arc;

use crate::client::core::ChatClient;
use crate::config::ClientConfig;
use crate::drivers::{create_driver, ApiStyle, ProviderDriver};
use crate::resilience::RetryPolicy;
use crate::schema::ValidatorCache;
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};

/// Builder for [`ChatClient`].
///
/// Either name an [`ApiStyle`] or inject a driver. Without an explicit transport an
/// [`HttpTransport`] is built from the config's HTTP settings.
pub struct ChatClientBuilder {
    config: ClientConfig,
    api_style: Option<ApiStyle>,
    provider_id: Option<String>,
    driver: Option<Arc<dyn ProviderDriver>>,
    transport: Option<Arc<dyn Transport>>,
    retry: Option<RetryPolicy>,
    validators: Option<Arc<ValidatorCache>>,
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            api_style: None,
            provider_id: None,
            driver: None,
            transport: None,
            retry: None,
            validators: None,
        }
    }

    /// Start from a loaded config. Later setters win over it.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_style(mut self, style: ApiStyle) -> Self {
        self.api_style = Some(style);
        self
    }

    /// Label used in logs; defaults to the api style name.
    pub fn provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn driver(mut self, driver: Arc<dyn ProviderDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Override base URL (primarily for testing with mock servers)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.http.base_url = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.http.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.config.http.headers.extend(headers);
        self
    }

    /// Share a validator cache between clients.
    pub fn validator_cache(mut self, cache: Arc<ValidatorCache>) -> Self {
        self.validators = Some(cache);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        let driver = match (self.driver, self.api_style) {
            (Some(driver), _) => driver,
            (None, Some(style)) => {
                let id = self.provider_id.as_deref().unwrap_or(style.as_str());
                create_driver(style, id)
            }
            (None, None) => {
                return Err(Error::configuration_with_context(
                    "no backend selected",
                    ErrorContext::new()
                        .with_field_path("api_style")
                        .with_details("call api_style() or driver() before build()"),
                ))
            }
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&self.config.http, driver.default_base_url())?),
        };

        let retry = self.retry.unwrap_or_else(|| self.config.retry_policy());
        let validators = self
            .validators
            .unwrap_or_else(|| Arc::new(ValidatorCache::new(self.config.validator_cache_size)));

        Ok(ChatClient {
            driver,
            transport,
            retry,
            validators,
        })
    }
}
