pub mod dynamic;
pub mod rest;
pub mod state;

pub use dynamic::{dynamic_endpoint_handler, test_endpoint_handler};
pub use rest::{create_endpoint_handler, get_endpoint_spec_handler, submit_query_handler, ApiDoc};

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post, MethodRouter},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete application router: the service's own routes, the generated
/// endpoints under `/api`, and the Swagger UI for the service's own API.
pub fn app_router(app_state: Arc<AppState>) -> Router {
    let dynamic: MethodRouter<Arc<AppState>> = get(dynamic_endpoint_handler)
        .post(dynamic_endpoint_handler)
        .put(dynamic_endpoint_handler)
        .delete(dynamic_endpoint_handler)
        .patch(dynamic_endpoint_handler);

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    match app_state.config.cors_allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!(
            origin = %app_state.config.cors_allowed_origin,
            "Ignoring invalid CORS origin: {}", e
        ),
    }

    let api_router = Router::new()
        .route("/api/submit-query", post(submit_query_handler))
        .route("/api/test-endpoint", get(test_endpoint_handler))
        .route("/api", dynamic.clone())
        .route("/api/", dynamic.clone())
        .route("/api/{*path}", dynamic)
        .route("/endpoints", post(create_endpoint_handler))
        .route("/endpoints/{id}/openapi", get(get_endpoint_spec_handler))
        .layer(DefaultBodyLimit::max(app_state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
