use std::time::Duration;
use thiserror::Error;

use crate::schema::ValidationError;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "schema.properties.age", "request.tool_choice")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "schema_classifier", "anthropic_dialect")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse failure category used by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Network,
    RateLimited,
    ServerFault,
    ValidationFailure,
    Cancelled,
    ClientFault,
    /// Local failures that never reach the network (bad schema, bad config, decode errors).
    Local,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ServerFault => "server_fault",
            ErrorClass::ValidationFailure => "validation_failure",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::ClientFault => "client_fault",
            ErrorClass::Local => "local",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for unichat.
///
/// The first six variants are the call-level taxonomy the retry controller reasons about;
/// the rest are local failures and always terminal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limited: {message}{}", format_retry_after(.retry_after))]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Server fault: HTTP {status_code}: {message}{}", format_retry_after(.retry_after))]
    ServerFault {
        status_code: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Structured output failed validation: {}", format_validation(.cause))]
    ValidationFailure {
        cause: Vec<ValidationError>,
        /// Raw model output that failed, when one was available.
        raw: Option<String>,
    },

    #[error("Call cancelled{}", .reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Cancelled { reason: Option<String> },

    #[error("Client fault: HTTP {status_code}: {message}")]
    ClientFault { status_code: u16, message: String },

    #[error("Schema error: {message}{}", format_context(.context))]
    Schema {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Decode error: {message}{}", format_context(.context))]
    Decode {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}ms)", d.as_millis()),
        None => String::new(),
    }
}

fn format_validation(cause: &[ValidationError]) -> String {
    if cause.is_empty() {
        return "unknown cause".to_string();
    }
    cause
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network {
            message: msg.into(),
        }
    }

    pub fn cancelled(reason: Option<String>) -> Self {
        Error::Cancelled { reason }
    }

    pub fn validation_failure(cause: Vec<ValidationError>, raw: Option<String>) -> Self {
        Error::ValidationFailure { cause, raw }
    }

    /// Create a new schema error with structured context
    pub fn schema_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Schema {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new decode error with structured context
    pub fn decode_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Decode {
            message: msg.into(),
            context,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Network { .. } => ErrorClass::Network,
            Error::RateLimited { .. } => ErrorClass::RateLimited,
            Error::ServerFault { .. } => ErrorClass::ServerFault,
            Error::ValidationFailure { .. } => ErrorClass::ValidationFailure,
            Error::Cancelled { .. } => ErrorClass::Cancelled,
            Error::ClientFault { .. } => ErrorClass::ClientFault,
            Error::Schema { .. }
            | Error::Configuration { .. }
            | Error::Decode { .. }
            | Error::Io(_)
            | Error::Serialization(_) => ErrorClass::Local,
        }
    }

    /// Default retryability: network, rate limiting, server faults and schema mismatches.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Network
                | ErrorClass::RateLimited
                | ErrorClass::ServerFault
                | ErrorClass::ValidationFailure
        )
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } | Error::ServerFault { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Schema { context, .. }
            | Error::Configuration { context, .. }
            | Error::Decode { context, .. } => Some(context),
            _ => None,
        }
    }
}
