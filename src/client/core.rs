use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::client::error_classification::classify_http;
use crate::drivers::{DriverRequest, ProviderDriver};
use crate::pipeline::{cancellable, event_stream, normalize, ChatStream};
use crate::resilience::{CancellationToken, RetryExecutor, RetryPolicy};
use crate::schema::ValidatorCache;
use crate::transport::{RawResponse, ResponseBody, Transport};
use crate::types::request::ChatRequest;
use crate::types::response::ChatResult;
use crate::{Error, ErrorContext, Result};

/// Per-call state handed down the pipeline instead of process-wide singletons.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub validators: Arc<ValidatorCache>,
}

impl CallContext {
    pub fn new(validators: Arc<ValidatorCache>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            validators,
        }
    }
}

/// One backend, one transport, one retry policy.
///
/// Cheap to clone; clones share the validator cache.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) driver: Arc<dyn ProviderDriver>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) retry: RetryPolicy,
    pub(crate) validators: Arc<ValidatorCache>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.driver.provider_id())
            .field("api_style", &self.driver.api_style())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ChatClient {
    pub fn builder() -> crate::client::ChatClientBuilder {
        crate::client::ChatClientBuilder::new()
    }

    pub fn driver(&self) -> &Arc<dyn ProviderDriver> {
        &self.driver
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn validators(&self) -> &Arc<ValidatorCache> {
        &self.validators
    }

    /// Run one logical call to completion.
    ///
    /// Transient failures and schema mismatches are retried under the client's policy.
    /// A streaming request is consumed fully inside each attempt, so a dropped stream
    /// is retried like any other network failure.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResult> {
        let ctx = CallContext::new(self.validators.clone());
        let span = info_span!(
            "chat_call",
            request_id = %ctx.request_id,
            provider = self.driver.provider_id(),
            model = %request.model,
        );

        async {
            let prepared = self.driver.build_request(request)?;
            debug!(path = %prepared.path, stream = prepared.stream, structured = prepared.plan.is_some(), "request prepared");

            let cancel = request.cancel.clone().unwrap_or_default();
            let executor = RetryExecutor::new(self.retry.clone());
            let result = executor
                .execute(|| self.attempt(&prepared, &cancel, &ctx), Some(&cancel))
                .await?;

            info!(
                finish_reason = ?result.finish_reason,
                input_tokens = result.usage.input_tokens,
                output_tokens = result.usage.output_tokens,
                "chat call completed"
            );
            Ok::<_, Error>(result)
        }
        .instrument(span)
        .await
    }

    /// Open a streamed call and hand back its fragments.
    ///
    /// Only establishing the stream is retried. Once the backend accepted the request,
    /// failures surface through the stream and are not retried. When the request carries
    /// a schema, fragments are withheld and the validated payload comes from
    /// [`ChatStream::complete`].
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let ctx = CallContext::new(self.validators.clone());
        let span = info_span!(
            "chat_call",
            request_id = %ctx.request_id,
            provider = self.driver.provider_id(),
            model = %request.model,
        );

        async {
            let mut request = request.clone();
            request.stream = true;
            let prepared = self.driver.build_request(&request)?;
            debug!(path = %prepared.path, structured = prepared.plan.is_some(), "stream request prepared");

            let cancel = request.cancel.clone().unwrap_or_default();
            let executor = RetryExecutor::new(self.retry.clone());
            let response = executor
                .execute(|| self.establish(&prepared, &cancel), Some(&cancel))
                .await?;

            let body = match response.body {
                ResponseBody::Stream(body) => body,
                ResponseBody::Complete(bytes) => crate::pipeline::decode::ok_chunks(vec![bytes]),
            };
            let events = cancellable(event_stream(body, self.driver.clone()), cancel);
            info!("chat stream established");
            Ok::<_, Error>(ChatStream::new(events, prepared.plan.clone(), ctx.validators.clone()))
        }
        .instrument(span)
        .await
    }

    /// Send once and fail on a non-success status.
    async fn establish(&self, prepared: &DriverRequest, cancel: &CancellationToken) -> Result<RawResponse> {
        let response = self.transport.invoke(prepared, cancel).await?;
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status;
        let headers = response.headers.clone();
        let body = cancel.run_until_cancelled(response.into_bytes()).await?;
        Err(classify_http(status, &headers, &body))
    }

    async fn attempt(
        &self,
        prepared: &DriverRequest,
        cancel: &CancellationToken,
        ctx: &CallContext,
    ) -> Result<ChatResult> {
        let response = self.establish(prepared, cancel).await?;
        match response.body {
            ResponseBody::Complete(bytes) if !prepared.stream => {
                let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::decode_with_context(
                        "response body is not JSON",
                        ErrorContext::new()
                            .with_details(e.to_string())
                            .with_source(self.driver.provider_id()),
                    )
                })?;
                let raw = self.driver.parse_response(&body)?;
                normalize(raw, prepared.plan.as_ref(), &ctx.validators)
            }
            body => {
                let body = match body {
                    ResponseBody::Stream(body) => body,
                    ResponseBody::Complete(bytes) => crate::pipeline::decode::ok_chunks(vec![bytes]),
                };
                let events = cancellable(event_stream(body, self.driver.clone()), cancel.clone());
                ChatStream::new(events, prepared.plan.clone(), ctx.validators.clone())
                    .complete()
                    .await
            }
        }
    }
}
