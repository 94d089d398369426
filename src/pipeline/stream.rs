//! The caller-facing incremental result.

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

use crate::dialect::StructuredPlan;
use crate::drivers::ProviderDriver;
use crate::pipeline::assemble::StreamAccumulator;
use crate::pipeline::decode::payload_stream;
use crate::pipeline::normalize::normalize;
use crate::resilience::CancellationToken;
use crate::schema::ValidatorCache;
use crate::types::events::StreamingEvent;
use crate::types::response::ChatResult;
use crate::{BoxStream, Error, ErrorContext, Result};

/// Decode a streamed body into driver events.
///
/// Stops at the driver's done marker, which is surfaced as [`StreamingEvent::StreamEnd`].
pub fn event_stream(
    body: BoxStream<'static, Bytes>,
    driver: Arc<dyn ProviderDriver>,
) -> BoxStream<'static, StreamingEvent> {
    let events = payload_stream(body)
        .scan(false, move |done, item| {
            if *done {
                return futures::future::ready(None);
            }
            let out = match item {
                Ok(payload) if driver.is_stream_done(&payload) => {
                    *done = true;
                    Ok(vec![StreamingEvent::StreamEnd])
                }
                Ok(payload) => driver.parse_stream_event(&payload),
                Err(e) => Err(e),
            };
            futures::future::ready(Some(out))
        })
        .flat_map(|batch| match batch {
            Ok(events) => stream::iter(events.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        });
    Box::pin(events)
}

/// End the stream with `Cancelled` as soon as `token` fires, even while waiting on I/O.
pub fn cancellable<T: Send + 'static>(
    input: BoxStream<'static, T>,
    token: CancellationToken,
) -> BoxStream<'static, T> {
    let stream = stream::unfold(Some((input, token)), |state| async move {
        let (mut input, token) = state?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Some((Err(token.to_error()), None)),
            next = input.next() => next.map(|item| (item, Some((input, token)))),
        }
    });
    Box::pin(stream)
}

/// Text fragments of one streamed call, plus [`complete`](Self::complete) for the
/// normalized result.
///
/// Lazy, finite and not restartable. When a response schema was requested, fragments
/// are withheld: the stream yields nothing and the payload is only available, validated,
/// through `complete()`.
pub struct ChatStream {
    events: BoxStream<'static, StreamingEvent>,
    accumulator: StreamAccumulator,
    plan: Option<StructuredPlan>,
    validators: Arc<ValidatorCache>,
    finished: bool,
    failure: Option<String>,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("structured", &self.plan.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

impl ChatStream {
    pub fn new(
        events: BoxStream<'static, StreamingEvent>,
        plan: Option<StructuredPlan>,
        validators: Arc<ValidatorCache>,
    ) -> Self {
        Self {
            events,
            accumulator: StreamAccumulator::new(),
            plan,
            validators,
            finished: false,
            failure: None,
        }
    }

    /// Whether fragments are withheld for validation.
    pub fn is_structured(&self) -> bool {
        self.plan.is_some()
    }

    /// Drain whatever is left, then normalize and validate like a single-shot response.
    pub async fn complete(mut self) -> Result<ChatResult> {
        while let Some(item) = self.next().await {
            item?;
        }
        if let Some(message) = self.failure.take() {
            return Err(Error::decode_with_context(
                "stream already ended with an error",
                ErrorContext::new().with_details(message).with_source("chat_stream"),
            ));
        }
        let raw = std::mem::take(&mut self.accumulator).finish();
        debug!(text_len = raw.text.len(), tool_calls = raw.tool_calls.len(), "stream drained");
        normalize(raw, self.plan.as_ref(), &self.validators)
    }

    fn fail(&mut self, error: Error) -> Poll<Option<Result<String>>> {
        self.finished = true;
        self.failure = Some(error.to_string());
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for ChatStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            let event = match this.events.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => return this.fail(e),
                Poll::Ready(Some(Ok(event))) => event,
            };
            match this.accumulator.apply(event) {
                Err(e) => return this.fail(e),
                Ok(Some(fragment)) if this.plan.is_none() && !fragment.is_empty() => {
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Ok(_) => {
                    if this.accumulator.is_ended() {
                        this.finished = true;
                    }
                }
            }
        }
    }
}
