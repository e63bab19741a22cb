//! crates/genapi_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database, interpreter and webhook client.

use crate::domain::{EndpointRecord, EvaluationOutcome, RequestSnapshot};
use async_trait::async_trait;
use serde_json::Value;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Exact, case-sensitive lookup. An unknown id is `PortError::NotFound`.
    async fn get_endpoint_by_id(&self, endpoint_id: &str) -> PortResult<EndpointRecord>;

    /// Stores a new endpoint under a freshly assigned identifier.
    async fn create_endpoint(&self, code: &str, spec: Option<&str>) -> PortResult<EndpointRecord>;
}

#[async_trait]
pub trait CodeEvaluator: Send + Sync {
    /// Runs `code` against a fresh execution context built from `request`.
    ///
    /// Failures of the handler itself are reported through the outcome, never as a panic
    /// or an error value.
    async fn evaluate(&self, code: &str, request: &RequestSnapshot) -> EvaluationOutcome;
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Forwards a natural-language API description and returns the generator's reply.
    async fn submit_query(&self, query: &str) -> PortResult<Value>;
}
