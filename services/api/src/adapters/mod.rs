pub mod db;
pub mod js_evaluator;
pub mod memory;
pub mod webhook;

pub use db::DbAdapter;
pub use js_evaluator::V8CodeEvaluator;
pub use memory::InMemoryEndpointStore;
pub use webhook::WebhookGenerationAdapter;
