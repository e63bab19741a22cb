//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use genapi_core::{unescape_sequences, PortError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_query_handler,
        create_endpoint_handler,
        get_endpoint_spec_handler,
        crate::web::dynamic::test_endpoint_handler,
    ),
    components(
        schemas(SubmitQueryRequest, CreateEndpointRequest, CreateEndpointResponse, ErrorResponse)
    ),
    tags(
        (name = "Generated API host", description = "Generate endpoints from natural language and serve them under /api/{id}.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A natural-language description of the API to generate.
#[derive(Deserialize, ToSchema)]
pub struct SubmitQueryRequest {
    pub query: String,
}

/// Registers handler code directly, bypassing the generation webhook.
#[derive(Deserialize, ToSchema)]
pub struct CreateEndpointRequest {
    pub code: String,
    #[serde(default)]
    pub spec: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateEndpointResponse {
    pub id: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a query to the generation workflow.
///
/// The webhook's JSON reply is returned unchanged.
#[utoipa::path(
    post,
    path = "/api/submit-query",
    request_body = SubmitQueryRequest,
    responses(
        (status = 200, description = "The generation workflow's reply"),
        (status = 400, description = "The query is missing or empty", body = ErrorResponse),
        (status = 500, description = "The body is not JSON or the generation workflow failed", body = ErrorResponse)
    )
)]
pub async fn submit_query_handler(State(app_state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Error submitting query: request body is not JSON: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit query");
        }
    };

    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .filter(|query| !query.is_empty())
        .map(str::to_string);

    let Some(query) = query else {
        return json_error(StatusCode::BAD_REQUEST, "Query is required");
    };

    match app_state.generator.submit_query(&query).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Error submitting query: {:?}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit query")
        }
    }
}

/// Register an endpoint from handler code and an optional OpenAPI document.
#[utoipa::path(
    post,
    path = "/endpoints",
    request_body = CreateEndpointRequest,
    responses(
        (status = 201, description = "Endpoint created", body = CreateEndpointResponse),
        (status = 400, description = "The code is missing", body = ErrorResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_endpoint_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, Response> {
    if req.code.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Endpoint code is required"));
    }

    let spec = req.spec.as_deref().filter(|spec| !spec.trim().is_empty());
    let record = app_state
        .store
        .create_endpoint(&req.code, spec)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;

    info!(endpoint_id = %record.id, "Endpoint registered");
    Ok((
        StatusCode::CREATED,
        Json(CreateEndpointResponse { id: record.id }),
    ))
}

/// Fetch the OpenAPI document stored with an endpoint.
///
/// JSON documents are returned as JSON; anything else is returned as YAML text.
#[utoipa::path(
    get,
    path = "/endpoints/{id}/openapi",
    params(
        ("id" = String, Path, description = "The endpoint identifier.")
    ),
    responses(
        (status = 200, description = "The stored OpenAPI document"),
        (status = 404, description = "Unknown endpoint or no document", body = ErrorResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_endpoint_spec_handler(
    State(app_state): State<Arc<AppState>>,
    Path(endpoint_id): Path<String>,
) -> Response {
    let record = match app_state.store.get_endpoint_by_id(&endpoint_id).await {
        Ok(record) => record,
        Err(PortError::NotFound(_)) => {
            return json_error(StatusCode::NOT_FOUND, "Endpoint not found")
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let Some(spec) = record.spec.filter(|spec| !spec.trim().is_empty()) else {
        return json_error(StatusCode::NOT_FOUND, "OpenAPI document not found");
    };

    if let Ok(document) = serde_json::from_str::<Value>(&spec) {
        return Json(document).into_response();
    }

    let unescaped = unescape_sequences(&spec);
    match serde_json::from_str::<Value>(&unescaped) {
        Ok(document) => Json(document).into_response(),
        Err(_) => ([(header::CONTENT_TYPE, "application/yaml")], unescaped).into_response(),
    }
}
