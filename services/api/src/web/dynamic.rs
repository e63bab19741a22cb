//! services/api/src/web/dynamic.rs
//!
//! Axum handlers for the generated endpoints under `/api/{id}/...` and the built-in
//! demo endpoint, plus the conversions between axum types and the core's wire types.

use crate::web::state::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use genapi_core::domain::{InboundRequest, PathPolicy, WireResponse};
use genapi_core::normalize::{normalize, path_segments};
use genapi_core::translate::translate;
use std::sync::Arc;
use tracing::{info, warn};

/// Handler source run by `GET /api/test-endpoint`.
pub const DEMO_HANDLER: &str = r#"
response.status(200);
response.headers = {
  "Content-Type": "application/json",
  "X-Generated-By": "AI Endpoint Generator"
};
response.body = {
  message: "Hello from test endpoint!",
  timestamp: new Date().toISOString(),
  query: request.query,
  method: request.method,
  path: request.path
};
"#;

//=========================================================================================
// Conversions
//=========================================================================================

/// Reads an axum request into the core's framework-independent shape.
pub async fn inbound_request(request: Request, max_body_bytes: usize) -> InboundRequest {
    let (parts, body) = request.into_parts();

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = parts
        .headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let body = match to_bytes(body, max_body_bytes).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(uri = %parts.uri, "Failed to read request body: {}", e);
            None
        }
    };

    InboundRequest {
        method: parts.method.as_str().to_string(),
        url: format!("{}://{}{}", scheme, host, path_and_query),
        path_segments: path_segments(parts.uri.path()),
        headers,
        query: parts.uri.query().map(str::to_string),
        body,
    }
}

/// Converts a wire response into an axum response. Headers that are not valid on the
/// wire are dropped; a later header replaces an earlier one with the same name.
pub fn into_axum_response(wire: WireResponse) -> Response {
    let mut response = Response::new(wire.body.map(Body::from).unwrap_or_else(Body::empty));
    *response.status_mut() =
        StatusCode::from_u16(wire.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in wire.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Dropping a header that is not valid on the wire"),
        }
    }
    response
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Serves a stored endpoint. `{id}` picks the record; the rest of the path, the query
/// and the body are handed to its code.
pub async fn dynamic_endpoint_handler(
    State(app_state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    let inbound = inbound_request(request, app_state.config.max_body_bytes).await;
    let wire = app_state.dispatcher.dispatch(inbound).await;
    into_axum_response(wire)
}

/// Runs the built-in demo handler through the same evaluator and translator.
#[utoipa::path(
    get,
    path = "/api/test-endpoint",
    responses(
        (status = 200, description = "Echo of the request produced by the demo handler"),
        (status = 500, description = "The demo handler failed")
    )
)]
pub async fn test_endpoint_handler(
    State(app_state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    let inbound = inbound_request(request, app_state.config.max_body_bytes).await;
    let snapshot = normalize(&inbound, PathPolicy::Full);
    let outcome = app_state.evaluator.evaluate(DEMO_HANDLER, &snapshot).await;
    let wire = translate(outcome);
    info!(status = wire.status, "Demo endpoint executed");
    into_axum_response(wire)
}
