use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body the backend attaches to rejected HTTP requests, e.g. a missing or
/// invalid `X-API-Key` (`{"detail": "..."}`). Validation failures carry a
/// structured `detail` instead of a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: Value,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Value::String(detail.into()),
        }
    }

    pub fn message(&self) -> String {
        match &self.detail {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
