pub mod dispatch;
pub mod domain;
pub mod normalize;
pub mod ports;
pub mod translate;

pub use dispatch::Dispatcher;
pub use domain::{
    unescape_sequences, EndpointRecord, EvaluationFailure, EvaluationOutcome, FailureKind,
    InboundRequest, PathPolicy, RequestSnapshot, WireResponse,
};
pub use ports::{CodeEvaluator, EndpointStore, GenerationService, PortError, PortResult};
