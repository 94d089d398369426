//! The backend-neutral chat request.

use crate::resilience::CancellationToken;
use crate::schema::ResponseSchema;
use crate::types::message::Message;
use crate::types::tool::{ToolChoice, ToolDefinition};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub stop: Vec<String>,
}

/// One logical chat call. Drivers read it; nothing mutates it after construction.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub schema: Option<ResponseSchema>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub sampling: SamplingParams,
    pub stream: bool,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            schema: None,
            tools: Vec::new(),
            tool_choice: None,
            sampling: SamplingParams::default(),
            stream: false,
            cancel: None,
        }
    }

    pub fn schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.sampling.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.sampling.max_tokens = Some(max);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.sampling.top_p = Some(top_p);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.sampling.stop = stop;
        self
    }

    /// Ask the backend for an incremental response.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
