//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `EndpointStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genapi_core::domain::EndpointRecord;
use genapi_core::ports::{EndpointStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `EndpointStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Closes every pooled connection. Called once the server has drained.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct EndpointRow {
    id: String,
    code: String,
    spec: Option<String>,
    created_at: DateTime<Utc>,
}
impl EndpointRow {
    fn to_domain(self) -> EndpointRecord {
        EndpointRecord {
            id: self.id,
            code: self.code,
            spec: self.spec,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `EndpointStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl EndpointStore for DbAdapter {
    async fn get_endpoint_by_id(&self, endpoint_id: &str) -> PortResult<EndpointRecord> {
        let record = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, code, spec, created_at FROM endpoints WHERE id = $1",
        )
        .bind(endpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .ok_or_else(|| PortError::NotFound(format!("Endpoint {} not found", endpoint_id)))?;

        Ok(record.to_domain())
    }

    async fn create_endpoint(&self, code: &str, spec: Option<&str>) -> PortResult<EndpointRecord> {
        let record = sqlx::query_as::<_, EndpointRow>(
            "INSERT INTO endpoints (id, code, spec) VALUES ($1, $2, $3) RETURNING id, code, spec, created_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(code)
        .bind(spec)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(record.to_domain())
    }
}
