//! crates/genapi_core/src/dispatch.rs
//!
//! The dynamic-endpoint control flow: identifier check, store lookup, normalization,
//! evaluation and translation. Every branch ends in a well-formed `WireResponse`.

use crate::domain::{InboundRequest, PathPolicy, WireResponse};
use crate::normalize::normalize;
use crate::ports::{CodeEvaluator, EndpointStore, PortError};
use crate::translate::translate;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Serves stored endpoints.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn EndpointStore>,
    evaluator: Arc<dyn CodeEvaluator>,
    path_policy: PathPolicy,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn EndpointStore>,
        evaluator: Arc<dyn CodeEvaluator>,
        path_policy: PathPolicy,
    ) -> Self {
        Self {
            store,
            evaluator,
            path_policy,
        }
    }

    /// Handles one request routed to `/api/{id}/...`.
    pub async fn dispatch(&self, request: InboundRequest) -> WireResponse {
        let Some(endpoint_id) = request.endpoint_id() else {
            warn!(method = %request.method, url = %request.url, "Request without an endpoint id");
            return WireResponse::json(400, &json!({ "error": "Endpoint ID is required" }));
        };

        let path = request.path_segments.join("/");
        let endpoint = match self.store.get_endpoint_by_id(endpoint_id).await {
            Ok(endpoint) => endpoint,
            Err(PortError::NotFound(_)) => {
                info!(endpoint_id, method = %request.method, %path, "Endpoint not found");
                return WireResponse::json(404, &json!({ "error": "Endpoint not found" }));
            }
            Err(e) => {
                error!(endpoint_id, method = %request.method, %path, "Failed to load endpoint: {:?}", e);
                return WireResponse::json(
                    500,
                    &json!({ "error": "Internal server error", "details": e.to_string() }),
                );
            }
        };

        let snapshot = normalize(&request, self.path_policy);
        debug!(endpoint_id, method = %snapshot.method, %path, body = %snapshot.body, "Executing endpoint");

        let outcome = self.evaluator.evaluate(&endpoint.code, &snapshot).await;
        let response = translate(outcome);

        info!(endpoint_id, method = %snapshot.method, %path, status = response.status, "Endpoint executed");
        response
    }
}
