//! crates/genapi_core/src/translate.rs
//!
//! Maps the final state of a handler's response accumulator onto a wire response.

use crate::domain::{EvaluationFailure, EvaluationOutcome, FailureKind, WireResponse};
use serde_json::{json, Value};
use tracing::error;

/// Body sent when a handler neither ended the response nor produced a body.
pub const DEFAULT_MESSAGE: &str = "Endpoint executed successfully";

/// Why an accumulator could not be turned into a response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractViolation {
    #[error("accumulator is not an object")]
    NotAnObject,
    #[error("statusCode {0} is not an integer between 200 and 599")]
    InvalidStatus(Value),
    #[error("headers must be an object, got {0}")]
    InvalidHeaders(Value),
    #[error("header '{0}' has a non-scalar value")]
    InvalidHeaderValue(String),
    #[error("accumulator could not be captured: {0}")]
    Unreadable(String),
}

/// Reads a status from a number or an all-digit string such as `"201"`.
fn status_code(value: &Value) -> Option<u16> {
    let code = match value {
        Value::Number(number) => number.as_u64()?,
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse::<u64>().ok()?
        }
        _ => return None,
    };
    (200..=599).contains(&code).then_some(code as u16)
}

/// A validated accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub ended: bool,
}

impl ResponseDescriptor {
    /// Validates a raw accumulator snapshot.
    ///
    /// A `returned` value replaces the body unless the handler already ended the response.
    pub fn from_accumulator(accumulator: &Value) -> Result<Self, ContractViolation> {
        let fields = accumulator.as_object().ok_or(ContractViolation::NotAnObject)?;

        let status = match fields.get("statusCode") {
            None | Some(Value::Null) => 200,
            Some(value) => status_code(value)
                .ok_or_else(|| ContractViolation::InvalidStatus(value.clone()))?,
        };

        let headers = match fields.get("headers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => {
                let mut headers = Vec::with_capacity(map.len());
                for (name, value) in map {
                    let value = match value {
                        Value::Null => continue,
                        Value::String(text) => text.clone(),
                        Value::Number(number) => number.to_string(),
                        Value::Bool(flag) => flag.to_string(),
                        _ => return Err(ContractViolation::InvalidHeaderValue(name.clone())),
                    };
                    headers.push((name.clone(), value));
                }
                headers
            }
            Some(other) => return Err(ContractViolation::InvalidHeaders(other.clone())),
        };

        let ended = fields.get("ended").and_then(Value::as_bool).unwrap_or(false);

        let mut body = fields.get("body").filter(|body| !body.is_null()).cloned();
        if !ended {
            if let Some(returned) = fields.get("returned") {
                body = Some(returned.clone()).filter(|value| !value.is_null());
            }
        }

        Ok(Self {
            status,
            headers,
            body,
            ended,
        })
    }

    fn declared_content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Produces the wire response for a valid accumulator.
    pub fn into_wire(self) -> WireResponse {
        if self.status == 204 || self.status == 304 {
            return WireResponse {
                status: self.status,
                headers: self.headers,
                body: None,
            };
        }

        let body = match (&self.body, self.ended) {
            (None, true) => {
                return WireResponse {
                    status: self.status,
                    headers: self.headers,
                    body: None,
                }
            }
            (None, false) => json!({ "message": DEFAULT_MESSAGE }),
            (Some(body), _) => body.clone(),
        };

        let declared = self.declared_content_type().map(str::to_ascii_lowercase);
        let mut headers = self.headers;
        let bytes = match (&body, declared) {
            (Value::String(text), Some(content_type)) if !content_type.contains("json") => {
                text.clone().into_bytes()
            }
            (_, declared) => {
                if declared.is_none() {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                body.to_string().into_bytes()
            }
        };

        WireResponse {
            status: self.status,
            headers,
            body: Some(bytes),
        }
    }
}

/// 500 body for a handler that raised, timed out or never settled.
pub fn evaluation_failure_response(failure: &EvaluationFailure) -> WireResponse {
    WireResponse::json(
        500,
        &json!({ "error": "Internal server error", "details": failure.message }),
    )
}

/// 500 body for a handler that left the accumulator in an unusable state.
pub fn contract_violation_response() -> WireResponse {
    WireResponse::json(
        500,
        &json!({
            "error": "Invalid response from endpoint",
            "details": "Response object was not properly configured",
        }),
    )
}

/// Translates an evaluation outcome into the response sent to the caller.
pub fn translate(outcome: EvaluationOutcome) -> WireResponse {
    let accumulator = match outcome {
        EvaluationOutcome::Completed(accumulator) => accumulator,
        EvaluationOutcome::Unreadable(reason) => {
            error!(violation = %ContractViolation::Unreadable(reason), "Endpoint handler violated the response contract");
            return contract_violation_response();
        }
        EvaluationOutcome::Failed(failure) => {
            match failure.kind {
                FailureKind::Exception => error!(details = %failure.message, "Endpoint handler raised an exception"),
                FailureKind::Timeout => error!(details = %failure.message, "Endpoint handler timed out"),
                FailureKind::Unsettled => error!(details = %failure.message, "Endpoint handler never settled"),
            }
            return evaluation_failure_response(&failure);
        }
    };

    match ResponseDescriptor::from_accumulator(&accumulator) {
        Ok(descriptor) => descriptor.into_wire(),
        Err(violation) => {
            error!(%violation, "Endpoint handler violated the response contract");
            contract_violation_response()
        }
    }
}
