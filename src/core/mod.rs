//! Core domain models
//!
//! Pipeline documents, the validated node graph, and the data a run
//! produces: per-run context, state machine states and traces.

pub mod condition;
pub mod context;
pub mod document;
pub mod error;
pub mod geometry;
pub mod node;
pub mod pipeline;
pub mod settings;
pub mod state;
pub mod trace;

pub use condition::*;
pub use context::*;
pub use error::*;
pub use geometry::*;
pub use node::*;
pub use pipeline::*;
pub use settings::*;
pub use state::*;
pub use trace::*;
