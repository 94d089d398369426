use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{RawResponse, ResponseBody, Transport};
use crate::config::HttpSettings;
use crate::drivers::DriverRequest;
use crate::resilience::CancellationToken;
use crate::{Error, ErrorContext, Result};

/// Thin reqwest adapter. Authentication headers come from the caller via
/// [`HttpSettings::headers`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings, default_base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(settings.pool_idle_timeout_secs)))
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to build HTTP client: {}", e),
                    ErrorContext::new().with_source("http_transport"),
                )
            })?;

        let base_url = settings.base_url.as_deref().unwrap_or(default_base_url);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: settings.headers.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: &DriverRequest) -> Result<RawResponse> {
        let url = self.url_for(&request.path);
        debug!(url = %url, stream = request.stream, "sending request");

        let mut builder = self.client.post(&url).json(&request.body);
        for (k, v) in self.headers.iter().chain(request.headers.iter()) {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if request.stream {
            builder = builder.header("accept", "text/event-stream");
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_ascii_lowercase(), v.to_string())))
            .collect();

        let body = if request.stream && response.status().is_success() {
            ResponseBody::Stream(Box::pin(response.bytes_stream().map_err(network_error)))
        } else {
            ResponseBody::Complete(response.bytes().await.map_err(network_error)?)
        };
        Ok(RawResponse { status, headers, body })
    }
}

fn network_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::network(format!("request timed out: {}", e))
    } else {
        Error::network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, request: &DriverRequest, cancel: &CancellationToken) -> Result<RawResponse> {
        cancel.run_until_cancelled(self.send(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_fallback_and_trailing_slash() {
        let settings = HttpSettings {
            base_url: Some("http://localhost:8080/v1/".into()),
            ..Default::default()
        };
        let transport = HttpTransport::new(&settings, "https://api.openai.com/v1").unwrap();
        assert_eq!(transport.url_for("/chat/completions"), "http://localhost:8080/v1/chat/completions");

        let transport = HttpTransport::new(&HttpSettings::default(), "https://api.openai.com/v1").unwrap();
        assert_eq!(transport.base_url(), "https://api.openai.com/v1");
    }
}
