use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} {message}")]
    Status { status: StatusCode, message: String },

    /// The backend refused the send because another caller holds the session.
    #[error("session is locked by another sender ({reason})")]
    SessionLocked { reason: String },

    /// An in-band `error` frame aborted the stream.
    #[error("stream failed: {message}")]
    StreamFailed { message: String },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChatApiError {
    /// True only for the "session locked" conflict.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionLocked { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::SessionLocked { .. } => Some(StatusCode::CONFLICT),
            Self::Request(error) => error.status(),
            _ => None,
        }
    }
}

/// Error body shapes the backend produces: `{"detail": ...}` from request
/// validation and HTTP exceptions, `{"error": ...}` from upstream failures.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl ErrorPayload {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body).ok()
    }

    /// Machine-readable code, when one is present.
    pub fn code(&self) -> Option<&str> {
        [self.detail.as_ref(), self.error.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|value| {
                ["code", "reason", "type"]
                    .into_iter()
                    .find_map(|key| value.get(key).and_then(Value::as_str))
            })
            .and_then(non_empty_string)
    }

    pub fn message(&self) -> Option<String> {
        [self.detail.as_ref(), self.error.as_ref()]
            .into_iter()
            .flatten()
            .find_map(value_message)
    }
}

fn value_message(value: &Value) -> Option<String> {
    match value {
        Value::String(message) => non_empty_string(message).map(ToOwned::to_owned),
        Value::Object(fields) => fields
            .get("message")
            .or_else(|| fields.get("msg"))
            .and_then(Value::as_str)
            .and_then(non_empty_string)
            .map(ToOwned::to_owned),
        // Validation errors arrive as a list of objects with `msg`.
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(value_message)
                .collect::<Vec<_>>()
                .join("; ");
            non_empty_string(&joined).map(ToOwned::to_owned)
        }
        _ => None,
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Some(message) = ErrorPayload::parse(body).and_then(|payload| payload.message()) {
        return message;
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
