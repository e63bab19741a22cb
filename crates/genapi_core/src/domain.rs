//! crates/genapi_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database, interpreter or web framework.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One generated API: the stored handler source plus its optional OpenAPI document.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRecord {
    pub id: String,
    pub code: String,
    pub spec: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Turns literal `\n`, `\t` and `\r` escape sequences into the characters they name.
///
/// Generated code and OpenAPI documents frequently arrive escaped one level too deep.
pub fn unescape_sequences(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r")
}

/// Which path segments are exposed to the handler as `request.path`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathPolicy {
    /// Every segment after `/api`, including the endpoint identifier.
    #[default]
    Full,
    /// The segments after the endpoint identifier.
    StripId,
}

impl std::str::FromStr for PathPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "strip-id" | "strip_id" => Ok(Self::StripId),
            other => Err(format!("'{}' is not a path policy (expected full or strip-id)", other)),
        }
    }
}

/// A framework-independent view of an inbound request, before normalization.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub url: String,
    /// Segments after the `/api` prefix; the first one names the endpoint.
    pub path_segments: Vec<String>,
    pub headers: Vec<(String, String)>,
    pub query: Option<String>,
    /// `None` when the body could not be read.
    pub body: Option<Bytes>,
}

impl InboundRequest {
    /// Returns the endpoint identifier, if the first segment is present and non-empty.
    pub fn endpoint_id(&self) -> Option<&str> {
        self.path_segments
            .first()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Case-insensitive header lookup.
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The read-only `request` value handed to generated code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub path: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Value,
}

/// Why an evaluation did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Syntax error, thrown value or rejected promise.
    Exception,
    /// The wall-clock budget elapsed.
    Timeout,
    /// The handler's promise was still pending once all queued jobs had run.
    Unsettled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl EvaluationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The explicit result of running one handler against one request.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// The handler finished. Carries the raw accumulator state: `statusCode`,
    /// `headers`, `body`, `ended` and, when the handler returned something, `returned`.
    Completed(Value),
    /// The handler finished but its accumulator could not be captured.
    Unreadable(String),
    Failed(EvaluationFailure),
}

/// A wire-level response, converted to the web framework's type at the edge.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl WireResponse {
    /// A JSON response with `Content-Type: application/json`.
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(value.to_string().into_bytes()),
        }
    }

    /// Case-insensitive header lookup; the last value wins.
    #[cfg(test)]
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decodes the body as JSON, if there is one and it parses.
    #[cfg(test)]
    pub(crate) fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}
