//! services/api/src/adapters/webhook.rs
//!
//! This module contains the adapter for the external generation workflow.
//! It implements the `GenerationService` port by POSTing the user's query to a webhook.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use genapi_core::ports::{GenerationService, PortError, PortResult};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `GenerationService` port over a JSON webhook.
#[derive(Clone)]
pub struct WebhookGenerationAdapter {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    query: &'a str,
    timestamp: String,
}

impl WebhookGenerationAdapter {
    /// Creates a new `WebhookGenerationAdapter`. Without a URL every submission fails.
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for WebhookGenerationAdapter {
    async fn submit_query(&self, query: &str) -> PortResult<Value> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| PortError::Unexpected("GENERATION_WEBHOOK_URL is not configured".to_string()))?;

        let payload = GenerationRequest {
            query,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        info!(query_len = query.len(), "Forwarding query to the generation webhook");
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "Generation webhook rejected the query");
            return Err(PortError::Unexpected(format!(
                "webhook request failed: {}",
                status.canonical_reason().unwrap_or("unknown status")
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PortError::Unexpected(format!("webhook returned invalid JSON: {}", e)))
    }
}
