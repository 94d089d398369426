//! The network primitive.
//!
//! A [`Transport`] sends one prepared [`DriverRequest`] and returns the raw response
//! without judging it; status classification happens in the client. Implementations must
//! honour the cancellation token while waiting.

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::drivers::DriverRequest;
use crate::resilience::CancellationToken;
use crate::{BoxStream, Result};

pub enum ResponseBody {
    Complete(Bytes),
    Stream(BoxStream<'static, Bytes>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Complete(bytes) => f.debug_tuple("Complete").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Status, lower-cased headers and body of one HTTP exchange.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Complete(body.into()),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// A streamed body delivered as the given chunks.
    pub fn chunked(status: u16, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Stream(crate::pipeline::decode::ok_chunks(chunks)),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collect the body into memory, whichever form it arrived in.
    pub async fn into_bytes(self) -> Result<Bytes> {
        use futures::TryStreamExt;
        match self.body {
            ResponseBody::Complete(bytes) => Ok(bytes),
            ResponseBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(Bytes::from(chunks.concat()))
            }
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, giving up with `Error::Cancelled` when `cancel` fires.
    async fn invoke(&self, request: &DriverRequest, cancel: &CancellationToken) -> Result<RawResponse>;
}

type InvokeFn = dyn Fn(DriverRequest) -> BoxFuture<'static, Result<RawResponse>> + Send + Sync;

/// Adapts a closure into a [`Transport`]. Handy for tests and custom clients.
#[derive(Clone)]
pub struct FnTransport {
    f: Arc<InvokeFn>,
}

impl fmt::Debug for FnTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTransport")
    }
}

impl FnTransport {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(DriverRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RawResponse>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |request| Box::pin(f(request))),
        }
    }
}

#[async_trait]
impl Transport for FnTransport {
    async fn invoke(&self, request: &DriverRequest, cancel: &CancellationToken) -> Result<RawResponse> {
        cancel.run_until_cancelled((self.f)(request.clone())).await
    }
}
