//! Pipeline execution engine

pub mod dispatcher;
pub mod engine;
pub mod policy;
mod runner;

pub use dispatcher::{ActionDispatcher, DispatchError, DispatchReport};
pub use engine::{
    EngineError, EventBus, EventHandler, ExecutionEvent, PipelineEngine, RunHandle, RunRequest,
};
pub use policy::{NodePolicy, RetryPolicy};
