//! crates/genapi_core/src/normalize.rs
//!
//! Turns an inbound request into the plain `RequestSnapshot` handed to generated code.

use crate::domain::{InboundRequest, PathPolicy, RequestSnapshot};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;
use url::form_urlencoded;

/// The prefix every dynamic endpoint is mounted under.
pub const API_PREFIX: &str = "/api";

/// Splits a request path into decoded segments below `/api`.
///
/// Empty segments are dropped, so `/api/` and `/api` both yield no segments.
pub fn path_segments(path: &str) -> Vec<String> {
    let rest = path.strip_prefix(API_PREFIX).unwrap_or(path);
    rest.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect()
}

/// Builds the snapshot for one request.
pub fn normalize(request: &InboundRequest, policy: PathPolicy) -> RequestSnapshot {
    let path = match policy {
        PathPolicy::Full => request.path_segments.clone(),
        PathPolicy::StripId => request.path_segments.iter().skip(1).cloned().collect(),
    };

    RequestSnapshot {
        method: request.method.to_ascii_uppercase(),
        url: request.url.clone(),
        path,
        headers: collect_headers(&request.headers),
        query: request.query.as_deref().map(parse_query).unwrap_or_default(),
        body: parse_body(request),
    }
}

/// Lower-cases names and joins repeated headers with `", "`.
fn collect_headers(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        collected
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    collected
}

/// Later duplicates win.
fn parse_query(query: &str) -> BTreeMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Content-type driven body parsing. Never fails: an unparsable body is logged and left null.
pub fn parse_body(request: &InboundRequest) -> Value {
    if request.method.eq_ignore_ascii_case("GET") || request.method.eq_ignore_ascii_case("HEAD") {
        return Value::Null;
    }

    let Some(body) = request.body.as_deref() else {
        warn!(method = %request.method, url = %request.url, "Request body could not be read");
        return Value::Null;
    };

    let content_type = request
        .header("content-type")
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if content_type.contains("application/json") {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(e) => {
                warn!(method = %request.method, url = %request.url, "Failed to parse request body as JSON: {}", e);
                Value::Null
            }
        }
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let fields: Map<String, Value> = form_urlencoded::parse(body)
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect();
        Value::Object(fields)
    } else {
        Value::String(String::from_utf8_lossy(body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn request(method: &str, content_type: Option<&str>, body: &str) -> InboundRequest {
        let mut headers = vec![("host".to_string(), "localhost:3000".to_string())];
        if let Some(content_type) = content_type {
            headers.push(("Content-Type".to_string(), content_type.to_string()));
        }
        InboundRequest {
            method: method.to_string(),
            url: "http://localhost:3000/api/abc/items?x=1".to_string(),
            path_segments: vec!["abc".to_string(), "items".to_string()],
            headers,
            query: Some("x=1&y=two%20words&x=3".to_string()),
            body: Some(Bytes::from(body.to_string())),
        }
    }

    #[test]
    fn path_segments_strip_prefix_and_decode() {
        assert_eq!(path_segments("/api/abc/items/a%20b"), vec!["abc", "items", "a b"]);
        assert_eq!(path_segments("/api/abc//x/"), vec!["abc", "x"]);
        assert!(path_segments("/api/").is_empty());
        assert!(path_segments("/api").is_empty());
    }

    #[test]
    fn get_requests_never_carry_a_body() {
        let snapshot = normalize(
            &request("GET", Some("application/json"), r#"{"a":1}"#),
            PathPolicy::Full,
        );
        assert_eq!(snapshot.body, Value::Null);
    }

    #[test]
    fn json_bodies_are_parsed() {
        let snapshot = normalize(
            &request("POST", Some("application/json; charset=utf-8"), r#"{"name":"widget","tags":[1,2]}"#),
            PathPolicy::Full,
        );
        assert_eq!(snapshot.body, json!({"name": "widget", "tags": [1, 2]}));
    }

    #[test]
    fn malformed_json_leaves_body_null() {
        let snapshot = normalize(&request("PUT", Some("application/json"), "{not json"), PathPolicy::Full);
        assert_eq!(snapshot.body, Value::Null);
    }

    #[test]
    fn form_bodies_become_flat_maps() {
        let snapshot = normalize(
            &request("POST", Some("application/x-www-form-urlencoded"), "name=a+b&qty=3"),
            PathPolicy::Full,
        );
        assert_eq!(snapshot.body, json!({"name": "a b", "qty": "3"}));
    }

    #[test]
    fn other_content_types_are_raw_text() {
        let snapshot = normalize(&request("PATCH", Some("text/plain"), "hello"), PathPolicy::Full);
        assert_eq!(snapshot.body, json!("hello"));

        let snapshot = normalize(&request("DELETE", None, ""), PathPolicy::Full);
        assert_eq!(snapshot.body, json!(""));
    }

    #[test]
    fn unreadable_bodies_are_null() {
        let mut inbound = request("POST", Some("text/plain"), "");
        inbound.body = None;
        assert_eq!(normalize(&inbound, PathPolicy::Full).body, Value::Null);
    }

    #[test]
    fn path_policy_controls_identifier_exposure() {
        let full = normalize(&request("GET", None, ""), PathPolicy::Full);
        assert_eq!(full.path, vec!["abc", "items"]);

        let stripped = normalize(&request("GET", None, ""), PathPolicy::StripId);
        assert_eq!(stripped.path, vec!["items"]);
    }

    #[test]
    fn headers_and_query_are_string_maps() {
        let mut inbound = request("GET", None, "");
        inbound.headers.push(("Accept".to_string(), "text/html".to_string()));
        inbound.headers.push(("accept".to_string(), "application/json".to_string()));

        let snapshot = normalize(&inbound, PathPolicy::Full);
        assert_eq!(snapshot.headers.get("accept").map(String::as_str), Some("text/html, application/json"));
        assert_eq!(snapshot.headers.get("host").map(String::as_str), Some("localhost:3000"));
        assert_eq!(snapshot.query.get("x").map(String::as_str), Some("3"));
        assert_eq!(snapshot.query.get("y").map(String::as_str), Some("two words"));
    }
}
