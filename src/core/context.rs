//! Execution context - per-run mutable state
//!
//! One context exists per run. It is created when the run starts, owned by
//! the task driving that run, and consumed into a [`RunResult`] at the end.

use crate::controller::ControllerId;
use crate::core::{
    geometry::Rect,
    state::RunState,
    trace::{FinalState, NodeOutcome, RunResult},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub controller_id: ControllerId,
    pub entry: String,

    state: RunState,

    /// Recognition attempts made per node over the whole run
    attempts: HashMap<String, u32>,

    /// Region most recently matched by each node
    regions: HashMap<String, Rect>,

    trace: Vec<NodeOutcome>,

    /// Node visits so far
    steps: usize,

    started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(
        run_id: Uuid,
        pipeline_name: impl Into<String>,
        controller_id: impl Into<ControllerId>,
        entry: impl Into<String>,
    ) -> Self {
        let entry = entry.into();
        Self {
            run_id,
            pipeline_name: pipeline_name.into(),
            controller_id: controller_id.into(),
            state: RunState::Pending {
                node: entry.clone(),
            },
            entry,
            attempts: HashMap::new(),
            regions: HashMap::new(),
            trace: Vec::new(),
            steps: 0,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Move the state machine, logging the transition
    pub fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(&next) {
            warn!(
                "Run {}: unexpected transition {} -> {}",
                self.run_id, self.state, next
            );
        } else {
            debug!("Run {}: {} -> {}", self.run_id, self.state, next);
        }
        self.state = next;
    }

    pub fn current_node(&self) -> Option<&str> {
        self.state.node()
    }

    /// Count one more recognition attempt for `node`, returning the run-wide total
    pub fn record_attempt(&mut self, node: &str) -> u32 {
        let count = self.attempts.entry(node.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, node: &str) -> u32 {
        self.attempts.get(node).copied().unwrap_or(0)
    }

    pub fn remember_region(&mut self, node: &str, region: Rect) {
        self.regions.insert(node.to_string(), region);
    }

    pub fn region_of(&self, node: &str) -> Option<Rect> {
        self.regions.get(node).copied()
    }

    pub fn regions(&self) -> &HashMap<String, Rect> {
        &self.regions
    }

    /// Append a trace entry; entries are never modified afterwards
    pub fn push_outcome(&mut self, outcome: NodeOutcome) {
        self.trace.push(outcome);
    }

    pub fn trace(&self) -> &[NodeOutcome] {
        &self.trace
    }

    /// Count a node visit, returning the new total
    pub fn visit(&mut self) -> usize {
        self.steps += 1;
        self.steps
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Close the run
    pub fn finish(self, final_state: FinalState) -> RunResult {
        RunResult {
            run_id: self.run_id,
            pipeline_name: self.pipeline_name,
            controller_id: self.controller_id.to_string(),
            entry: self.entry,
            final_state,
            trace: self.trace,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
