//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use genapi_core::ports::{CodeEvaluator, EndpointStore, GenerationService};
use genapi_core::Dispatcher;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EndpointStore>,
    pub evaluator: Arc<dyn CodeEvaluator>,
    pub generator: Arc<dyn GenerationService>,
    pub dispatcher: Dispatcher,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the dispatcher from the store and evaluator it will serve with.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn EndpointStore>,
        evaluator: Arc<dyn CodeEvaluator>,
        generator: Arc<dyn GenerationService>,
    ) -> Self {
        let dispatcher = Dispatcher::new(store.clone(), evaluator.clone(), config.path_policy);
        Self {
            store,
            evaluator,
            generator,
            dispatcher,
            config,
        }
    }
}
