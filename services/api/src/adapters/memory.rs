//! services/api/src/adapters/memory.rs
//!
//! An in-process `EndpointStore`, used when no database is configured and by tests.

use async_trait::async_trait;
use chrono::Utc;
use genapi_core::domain::EndpointRecord;
use genapi_core::ports::{EndpointStore, PortError, PortResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryEndpointStore {
    records: RwLock<HashMap<String, EndpointRecord>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record under a caller-chosen id, replacing any previous one.
    pub async fn insert(&self, record: EndpointRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn get_endpoint_by_id(&self, endpoint_id: &str) -> PortResult<EndpointRecord> {
        self.records
            .read()
            .await
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Endpoint {} not found", endpoint_id)))
    }

    async fn create_endpoint(&self, code: &str, spec: Option<&str>) -> PortResult<EndpointRecord> {
        let record = EndpointRecord {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            spec: spec.map(str::to_string),
            created_at: Utc::now(),
        };
        self.insert(record.clone()).await;
        Ok(record)
    }
}
