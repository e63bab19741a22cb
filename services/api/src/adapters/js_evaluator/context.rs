//! services/api/src/adapters/js_evaluator/context.rs
//!
//! Builds the per-request execution context for generated code: the frozen `request`
//! snapshot, a fresh `response` accumulator with its mutators, a collecting `console`
//! and the allow-listed globals. The result is a single script for the interpreter.
//!
//! The handler reports back through one global slot whose name is unique to the
//! evaluation. The slot receives a JSON string:
//!
//! * `{"kind":"completed","response":{...},"logs":[...]}`
//! * `{"kind":"failed","message":"...","logs":[...]}`
//! * `{"kind":"unserializable","message":"...","logs":[...]}`

use genapi_core::domain::RequestSnapshot;
use uuid::Uuid;

/// The globals generated code may use besides `request`, `response` and `console`.
const ALLOWED_GLOBALS: [&str; 8] = [
    "Date", "Math", "JSON", "Array", "Object", "String", "Number", "Boolean",
];

/// Runtime globals shadowed as `undefined` inside the handler.
const HIDDEN_GLOBALS: [&str; 1] = ["Deno"];

const HARNESS_HEAD: &str = r#"(function (__genapiRequest, __genapiSlot) {
  const __genapiLogs = [];
  const __genapiFormat = (value) => {
    if (typeof value === "string") return value;
    try {
      const encoded = JSON.stringify(value);
      return encoded === undefined ? String(value) : encoded;
    } catch (_) {
      return String(value);
    }
  };
  const __genapiEmit = (level) => (...args) => {
    __genapiLogs.push({ level: level, message: args.map(__genapiFormat).join(" ") });
  };
  const __genapiConsole = Object.freeze({
    log: __genapiEmit("log"),
    info: __genapiEmit("info"),
    warn: __genapiEmit("warn"),
    error: __genapiEmit("error"),
    debug: __genapiEmit("debug"),
  });
  const __genapiResponse = {
    statusCode: 200,
    body: null,
    headers: {},
    ended: false,
  };
  __genapiResponse.json = function (data) {
    __genapiResponse.body = data;
    __genapiResponse.headers["Content-Type"] = "application/json";
    __genapiResponse.ended = true;
    return __genapiResponse;
  };
  __genapiResponse.status = function (code) {
    __genapiResponse.statusCode = code;
    return __genapiResponse;
  };
  __genapiResponse.send = function (data) {
    __genapiResponse.body = data;
    __genapiResponse.ended = true;
    return __genapiResponse;
  };
  __genapiResponse.end = function () {
    __genapiResponse.ended = true;
    return __genapiResponse;
  };
  const __genapiMessage = (error) => {
    if (error instanceof Error) return error.message;
    if (error !== null && typeof error === "object" && typeof error.message === "string") {
      return error.message;
    }
    return String(error);
  };
  const __genapiSettle = (outcome) => {
    outcome.logs = __genapiLogs;
    let encoded;
    try {
      encoded = JSON.stringify(outcome);
    } catch (error) {
      encoded = JSON.stringify({ kind: "unserializable", message: __genapiMessage(error), logs: __genapiLogs });
    }
    globalThis[__genapiSlot] = encoded;
  };
  const __genapiSnapshot = (returned) => {
    const snapshot = {
      statusCode: __genapiResponse.statusCode,
      headers: __genapiResponse.headers,
      body: __genapiResponse.body,
      ended: __genapiResponse.ended,
    };
    if (returned !== undefined) snapshot.returned = returned;
    return snapshot;
  };
"#;

const HARNESS_TAIL: &str = r#").then(
      (returned) => __genapiSettle({ kind: "completed", response: __genapiSnapshot(returned) }),
      (error) => __genapiSettle({ kind: "failed", message: __genapiMessage(error) })
    );
  } catch (error) {
    __genapiSettle({ kind: "failed", message: __genapiMessage(error) });
  }
})(Object.freeze(JSON.parse("#;

/// One request's worth of script, ready for a fresh interpreter.
#[derive(Debug, Clone)]
pub struct ExecutionScript {
    source: String,
    slot_expression: String,
}

impl ExecutionScript {
    /// Wraps `code` as the body of the async handler and binds it to `request`.
    pub fn build(code: &str, request: &RequestSnapshot) -> Result<Self, serde_json::Error> {
        let slot = format!("__genapi_outcome_{}", Uuid::new_v4().simple());
        let slot_literal = serde_json::to_string(&slot)?;
        let request_literal = serde_json::to_string(&serde_json::to_string(request)?)?;

        let globals = ALLOWED_GLOBALS.join(", ");
        let hidden = HIDDEN_GLOBALS.join(", ");
        let hidden_values = vec!["undefined"; HIDDEN_GLOBALS.len()].join(", ");

        let mut source =
            String::with_capacity(HARNESS_HEAD.len() + code.len() + HARNESS_TAIL.len() + request_literal.len() + 512);
        source.push_str(HARNESS_HEAD);
        source.push_str(&format!(
            "  const __genapiHandler = async function (request, response, console, {}, {}) {{\n",
            hidden, globals
        ));
        source.push_str(code);
        source.push_str(&format!(
            "\n  }};\n  try {{\n    __genapiHandler(__genapiRequest, __genapiResponse, __genapiConsole, {}, {}",
            hidden_values, globals
        ));
        source.push_str(HARNESS_TAIL);
        source.push_str(&request_literal);
        source.push_str(")), ");
        source.push_str(&slot_literal);
        source.push_str(");\n");

        Ok(Self {
            source,
            slot_expression: format!("globalThis[{}]", slot_literal),
        })
    }

    /// The full script to evaluate.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// An expression that reads the reported outcome once all jobs have run.
    pub fn slot_expression(&self) -> &str {
        &self.slot_expression
    }
}
