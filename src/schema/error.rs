//! Error types for structured output validation.

use std::fmt;

/// Validation error with location information.
///
/// Contains details about what failed and where in the data structure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error message describing what went wrong
    pub message: String,
    /// Path to the error location (e.g., "user.name", "items[0].price")
    pub path: Option<String>,
    /// The invalid value that caused the error
    pub value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(
        message: impl Into<String>,
        path: Option<String>,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            message: message.into(),
            path,
            value,
        }
    }

    /// Create an error with a path. An empty path denotes the document root.
    pub fn with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            message: message.into(),
            path: if path.is_empty() { None } else { Some(path) },
            value: None,
        }
    }

    pub fn without_path(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validation operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get errors as formatted strings.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    pub fn into_result(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

impl From<ValidationError> for ValidationResult {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError::without_path("Invalid type");
        assert_eq!(error.to_string(), "Invalid type");

        let error = ValidationError::with_path("Invalid type", "user.name");
        assert_eq!(error.to_string(), "user.name: Invalid type");
    }

    #[test]
    fn test_root_path_is_dropped() {
        let error = ValidationError::with_path("Expected object", "");
        assert!(error.path.is_none());
    }

    #[test]
    fn test_result_extend() {
        let mut result = ValidationResult::success();
        assert!(result.is_valid());
        result.extend(ValidationError::without_path("boom").into());
        assert!(!result.is_valid());
        assert_eq!(result.error_messages(), vec!["boom".to_string()]);
    }
}
