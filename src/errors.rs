use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{identifiers::RequestId, queue::JobStatus};

/// Structured validation error raised before any request is sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Upstream HTTP failure, normalized from the response status and body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct APIError {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Parsed JSON body, when the body was valid JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: None,
            body: None,
            raw_body: None,
        }
    }

    /// JSON-safe description of the failure for surfacing to the host.
    pub fn payload(&self) -> Value {
        let body = match (&self.body, &self.raw_body) {
            (Some(body), _) => body.clone(),
            (None, Some(raw)) => Value::String(raw.clone()),
            (None, None) => Value::Null,
        };
        let mut payload = json!({
            "statusCode": self.status,
            "message": self.message,
            "body": body,
        });
        if let (Some(id), Some(obj)) = (&self.request_id, payload.as_object_mut()) {
            obj.insert("requestId".to_string(), Value::String(id.clone()));
        }
        payload
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for APIError {}

/// Convenience alias for fallible results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-level error (timeouts, DNS/TLS/connectivity).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Human-readable message plus JSON payload for an upstream failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub message: String,
    pub status_code: Option<u16>,
    pub payload: Value,
}

/// Unified error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Api(#[from] APIError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(String),

    #[error("request {request_id} finished with status {status}")]
    JobFailed {
        request_id: RequestId,
        status: JobStatus,
    },

    #[error("request {request_id} returned unexpected status {status:?}")]
    UnexpectedStatus { request_id: RequestId, status: String },

    #[error(
        "request {request_id} did not complete within {}s; increase the max wait time or disable \"wait for completion\" and check the status later",
        .waited.as_secs()
    )]
    Timeout {
        request_id: RequestId,
        waited: Duration,
    },

    #[error("unknown operation {operation:?} for resource {resource:?}")]
    UnknownOperation { resource: String, operation: String },
}

impl Error {
    /// Queue request id the error refers to, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::JobFailed { request_id, .. }
            | Error::UnexpectedStatus { request_id, .. }
            | Error::Timeout { request_id, .. } => Some(request_id.as_str()),
            Error::Api(api) => api.request_id.as_deref(),
            _ => None,
        }
    }

    /// HTTP status code for upstream failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            _ => None,
        }
    }

    /// Normalized message and payload for failures that carry transport
    /// details. Local errors return `None` and are surfaced as-is.
    pub fn normalized(&self) -> Option<NormalizedError> {
        match self {
            Error::Api(api) => Some(NormalizedError {
                message: api.to_string(),
                status_code: Some(api.status),
                payload: api.payload(),
            }),
            _ => None,
        }
    }
}
