use reqwest::{header::HeaderMap, StatusCode};
use serde_json::Value;

use crate::{
    errors::{APIError, Error},
    REQUEST_ID_HEADER,
};

/// Body fields checked, in order, for a human-readable error message.
const MESSAGE_FIELDS: [&str; 4] = ["message", "detail", "error", "title"];

/// Structured header list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry. Panics if key or value is empty/whitespace-only.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    /// This is a fail-fast behavior to catch configuration errors early.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(HeaderEntry::new(key.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

/// Ordered query parameters; blank values are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.push((key.to_string(), value.trim().to_string()));
        }
    }

    pub fn push_opt<V: ToString>(&mut self, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.push(key, v.to_string());
        }
    }

    /// Push every value under the same key (`endpoint_id=a&endpoint_id=b`).
    pub fn push_all<I, V>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        for v in values {
            self.push(key, v.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    for name in [REQUEST_ID_HEADER, "X-Request-Id"] {
        if let Some(value) = headers.get(name) {
            if let Ok(s) = value.to_str() {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// First non-empty string among the known message fields.
fn message_from_body(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    MESSAGE_FIELDS.iter().find_map(|field| {
        obj.get(*field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

pub(crate) fn parse_api_error_parts(status: StatusCode, headers: &HeaderMap, body: String) -> Error {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.trim().is_empty() {
        return APIError {
            status: status_code,
            message: status_text,
            request_id,
            body: None,
            raw_body: None,
        }
        .into();
    }

    let parsed = serde_json::from_str::<Value>(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(message_from_body)
        .unwrap_or_else(|| body.clone());
    let request_id = parsed
        .as_ref()
        .and_then(|v| v.get("request_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or(request_id);

    APIError {
        status: status_code,
        message,
        request_id,
        body: parsed,
        raw_body: Some(body),
    }
    .into()
}
