//! uiflow - recognition-driven UI automation pipelines
//!
//! A pipeline is a graph of nodes. Each node waits until its screen
//! condition is recognized on a connected device, performs an input action,
//! then moves on to the first of its successors whose condition holds.

pub mod cli;
pub mod controller;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod recognition;

// Re-export commonly used types
pub use controller::{Controller, ControllerError, ControllerId, ControllerRegistry, Platform};
pub use core::{
    Action, EngineSettings, ErrorKind, ExecutionStatus, FinalState, NodeOutcome, PipelineGraph,
    PipelineNode, Recognition, RunResult, Target,
};
pub use execution::{ExecutionEvent, PipelineEngine, RunHandle, RunRequest};
pub use recognition::{OcrBackend, Recognizer, RecognizerAdapter};
