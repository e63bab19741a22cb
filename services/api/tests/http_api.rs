//! Drives the full router in-process: real V8 isolate, in-memory store, fake webhook.

use api_lib::adapters::{InMemoryEndpointStore, V8CodeEvaluator};
use api_lib::config::Config;
use api_lib::web::{app_router, state::AppState};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use genapi_core::domain::{EndpointRecord, PathPolicy};
use genapi_core::ports::{GenerationService, PortError, PortResult};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct RecordingGenerator {
    queries: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl GenerationService for RecordingGenerator {
    async fn submit_query(&self, query: &str) -> PortResult<Value> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(PortError::Unexpected("webhook returned 502".to_string()));
        }
        Ok(json!({ "status": "queued", "endpointId": "gen42" }))
    }
}

struct Harness {
    app: Router,
    store: Arc<InMemoryEndpointStore>,
    generator: Arc<RecordingGenerator>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::default(), false)
    }

    fn with_config(config: Config, fail_generation: bool) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(InMemoryEndpointStore::new());
        let generator = Arc::new(RecordingGenerator {
            queries: Mutex::new(Vec::new()),
            fail: fail_generation,
        });
        let evaluator = Arc::new(V8CodeEvaluator::new(config.execution.clone()));
        let state = AppState::new(config, store.clone(), evaluator, generator.clone());
        Self {
            app: app_router(Arc::new(state)),
            store,
            generator,
        }
    }

    async fn register(&self, id: &str, code: &str, spec: Option<&str>) {
        self.store
            .insert(EndpointRecord {
                id: id.to_string(),
                code: code.to_string(),
                spec: spec.map(str::to_string),
                created_at: Utc::now(),
            })
            .await;
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn send_json(
        &self,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

fn as_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

//=========================================================================================
// Generated endpoints
//=========================================================================================

#[tokio::test]
async fn json_mutator_yields_json_response() {
    let harness = Harness::new();
    harness
        .register("okjson", "response.json({ ok: true });", None)
        .await;

    let (status, headers, body) = harness.get("/api/okjson").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(as_json(&body), json!({ "ok": true }));
}

#[tokio::test]
async fn status_204_is_sent_without_a_body() {
    let harness = Harness::new();
    harness
        .register("nocontent", "response.status(204).end();", None)
        .await;

    let (status, _, body) = harness.send_json(Method::DELETE, "/api/nocontent", "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn thrown_error_becomes_500_with_details() {
    let harness = Harness::new();
    harness
        .register("boom", "throw new Error(\"boom\");", None)
        .await;

    let (status, _, body) = harness.get("/api/boom").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        as_json(&body),
        json!({ "error": "Internal server error", "details": "boom" })
    );
}

#[tokio::test]
async fn get_requests_see_a_null_body() {
    let harness = Harness::new();
    harness
        .register("echo", "response.json({ body: request.body, method: request.method });", None)
        .await;

    let request = Request::get("/api/echo")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"ignored\":true}"))
        .unwrap();
    let (status, _, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "body": null, "method": "GET" }));
}

#[tokio::test]
async fn json_request_bodies_are_parsed() {
    let harness = Harness::new();
    harness
        .register(
            "sum",
            "response.status(201).json({ total: request.body.a + request.body.b });",
            None,
        )
        .await;

    let (status, _, body) = harness
        .send_json(Method::POST, "/api/sum", "{\"a\":2,\"b\":3}")
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(as_json(&body), json!({ "total": 5 }));
}

#[tokio::test]
async fn query_headers_and_path_reach_the_handler() {
    let harness = Harness::new();
    harness
        .register(
            "inspect",
            "return { q: request.query.q, agent: request.headers[\"x-agent\"], path: request.path };",
            None,
        )
        .await;

    let request = Request::get("/api/inspect/users/42?q=search%20term")
        .header("X-Agent", "curl/8.5")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        as_json(&body),
        json!({ "q": "search term", "agent": "curl/8.5", "path": ["inspect", "users", "42"] })
    );
}

#[tokio::test]
async fn strip_id_policy_drops_the_endpoint_id_from_the_path() {
    let config = Config {
        path_policy: PathPolicy::StripId,
        ..Config::default()
    };
    let harness = Harness::with_config(config, false);
    harness
        .register("inspect", "response.json({ path: request.path });", None)
        .await;

    let (_, _, body) = harness.get("/api/inspect/users/42").await;
    assert_eq!(as_json(&body), json!({ "path": ["users", "42"] }));
}

#[tokio::test]
async fn handler_without_output_gets_default_message() {
    let harness = Harness::new();
    harness.register("quiet", "const x = 1;", None).await;

    let (status, _, body) = harness.get("/api/quiet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        as_json(&body),
        json!({ "message": "Endpoint executed successfully" })
    );
}

#[tokio::test]
async fn plain_text_send_keeps_declared_content_type() {
    let harness = Harness::new();
    harness
        .register(
            "text",
            "response.headers[\"Content-Type\"] = \"text/plain\"; response.send(\"hi there\");",
            None,
        )
        .await;

    let (status, headers, body) = harness.get("/api/text").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body, b"hi there");
}

#[tokio::test]
async fn invalid_status_is_a_contract_violation() {
    let harness = Harness::new();
    harness
        .register("weird", "response.status(\"teapot\").json({});", None)
        .await;

    let (status, _, body) = harness.get("/api/weird").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body)["error"], "Invalid response from endpoint");
}

#[tokio::test]
async fn runaway_handler_times_out_and_server_keeps_serving() {
    let mut config = Config::default();
    config.execution.timeout = std::time::Duration::from_millis(1000);
    let harness = Harness::with_config(config, false);
    harness.register("spin", "while (true) {}", None).await;
    harness
        .register("created", "response.status(\"201\").json({ made: true });", None)
        .await;

    let (status, _, body) = harness.get("/api/spin").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        as_json(&body),
        json!({ "error": "Internal server error", "details": "Endpoint execution exceeded 1000 ms" })
    );

    let (status, _, body) = harness.get("/api/created").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(as_json(&body), json!({ "made": true }));
}

#[tokio::test]
async fn unknown_endpoint_is_404() {
    let harness = Harness::new();
    let (status, _, body) = harness.get("/api/nope/anything").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(as_json(&body), json!({ "error": "Endpoint not found" }));
}

#[tokio::test]
async fn missing_endpoint_id_is_400() {
    let harness = Harness::new();
    for uri in ["/api", "/api/"] {
        let (status, _, body) = harness.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(as_json(&body), json!({ "error": "Endpoint ID is required" }));
    }
}

#[tokio::test]
async fn repeated_requests_do_not_share_state() {
    let harness = Harness::new();
    harness
        .register(
            "counter",
            "globalThis.hits = (globalThis.hits || 0) + 1; response.json({ hits: globalThis.hits });",
            None,
        )
        .await;

    for _ in 0..3 {
        let (status, _, body) = harness.get("/api/counter").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({ "hits": 1 }));
    }
}

#[tokio::test]
async fn stored_escape_sequences_are_expanded() {
    let harness = Harness::new();
    harness
        .register("escaped", "const a = 1;\\nresponse.json({ a });", None)
        .await;

    let (status, _, body) = harness.get("/api/escaped").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "a": 1 }));
}

//=========================================================================================
// Service routes
//=========================================================================================

#[tokio::test]
async fn demo_endpoint_echoes_the_request() {
    let harness = Harness::new();
    let (status, headers, body) = harness.get("/api/test-endpoint?name=demo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-generated-by"], "AI Endpoint Generator");

    let body = as_json(&body);
    assert_eq!(body["message"], "Hello from test endpoint!");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["query"], json!({ "name": "demo" }));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn submit_query_forwards_to_the_generator() {
    let harness = Harness::new();
    let (status, _, body) = harness
        .send_json(Method::POST, "/api/submit-query", "{\"query\":\"a todo list API\"}")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "status": "queued", "endpointId": "gen42" }));
    assert_eq!(
        *harness.generator.queries.lock().unwrap(),
        vec!["a todo list API".to_string()]
    );
}

#[tokio::test]
async fn submit_query_requires_a_query() {
    let harness = Harness::new();
    for payload in ["{}", "{\"query\":\"\"}", "{\"query\":null}"] {
        let (status, _, body) = harness
            .send_json(Method::POST, "/api/submit-query", payload)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
        assert_eq!(as_json(&body), json!({ "error": "Query is required" }));
    }
    assert!(harness.generator.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn submit_query_rejects_bodies_that_are_not_json() {
    let harness = Harness::new();
    let (status, _, body) = harness
        .send_json(Method::POST, "/api/submit-query", "query=todo")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Failed to submit query" }));
    assert!(harness.generator.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn submit_query_reports_generator_failures() {
    let harness = Harness::with_config(Config::default(), true);
    let (status, _, body) = harness
        .send_json(Method::POST, "/api/submit-query", "{\"query\":\"x\"}")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(as_json(&body), json!({ "error": "Failed to submit query" }));
}

#[tokio::test]
async fn created_endpoint_is_served_and_documented() {
    let harness = Harness::new();
    let payload = json!({
        "code": "response.json({ created: true });",
        "spec": "{\"openapi\":\"3.0.0\",\"info\":{\"title\":\"Demo\",\"version\":\"1\"}}"
    });
    let (status, _, body) = harness
        .send_json(Method::POST, "/endpoints", &payload.to_string())
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = as_json(&body)["id"].as_str().unwrap().to_string();

    let (status, _, body) = harness.get(&format!("/api/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "created": true }));

    let (status, headers, body) = harness.get(&format!("/endpoints/{}/openapi", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(as_json(&body)["info"]["title"], "Demo");
}

#[tokio::test]
async fn yaml_documents_are_served_as_yaml() {
    let harness = Harness::new();
    harness
        .register("yaml", "return 1;", Some("openapi: 3.0.0\\ninfo:\\n  title: Demo"))
        .await;

    let (status, headers, body) = harness.get("/endpoints/yaml/openapi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/yaml");
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "openapi: 3.0.0\ninfo:\n  title: Demo"
    );
}

#[tokio::test]
async fn missing_documents_are_404() {
    let harness = Harness::new();
    harness.register("nodoc", "return 1;", None).await;

    let (status, _, body) = harness.get("/endpoints/nodoc/openapi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(as_json(&body), json!({ "error": "OpenAPI document not found" }));

    let (status, _, body) = harness.get("/endpoints/ghost/openapi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(as_json(&body), json!({ "error": "Endpoint not found" }));
}

#[tokio::test]
async fn create_endpoint_requires_code() {
    let harness = Harness::new();
    let (status, _, body) = harness
        .send_json(Method::POST, "/endpoints", "{\"code\":\"   \"}")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(as_json(&body), json!({ "error": "Endpoint code is required" }));
}
