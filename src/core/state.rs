//! Execution state models

use crate::core::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall run status, as kept in run history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Run reached a terminal node
    Completed,
    /// Run ended with an error
    Failed,
    /// Run was cancelled by the caller
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Completed" => Some(ExecutionStatus::Completed),
            "Failed" => Some(ExecutionStatus::Failed),
            "Cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the run state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// About to evaluate `node`
    Pending { node: String },
    /// Capturing and recognizing for `node`
    Recognizing { node: String, attempt: u32 },
    /// Recognition matched, dispatching the action
    Acting { node: String },
    /// Outcome recorded, choosing successors
    Advancing { node: String },
    Succeeded,
    Failed { node: String, kind: ErrorKind },
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed { .. } | RunState::Cancelled
        )
    }

    pub fn node(&self) -> Option<&str> {
        match self {
            RunState::Pending { node }
            | RunState::Recognizing { node, .. }
            | RunState::Acting { node }
            | RunState::Advancing { node }
            | RunState::Failed { node, .. } => Some(node),
            RunState::Succeeded | RunState::Cancelled => None,
        }
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Cancelled) => true,
            (Pending { .. }, Recognizing { .. }) => true,
            (Pending { .. }, Failed { .. }) => true,
            (Recognizing { .. }, Recognizing { .. }) => true,
            (Recognizing { .. }, Acting { .. }) => true,
            (Recognizing { .. }, Advancing { .. }) => true,
            (Recognizing { .. }, Failed { .. }) => true,
            (Acting { .. }, Advancing { .. }) => true,
            (Acting { .. }, Failed { .. }) => true,
            (Advancing { .. }, Pending { .. }) => true,
            (Advancing { .. }, Succeeded) => true,
            (Advancing { .. }, Failed { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending { node } => write!(f, "Pending({})", node),
            RunState::Recognizing { node, attempt } => {
                write!(f, "Recognizing({}, attempt {})", node, attempt)
            }
            RunState::Acting { node } => write!(f, "Acting({})", node),
            RunState::Advancing { node } => write!(f, "Advancing({})", node),
            RunState::Succeeded => f.write_str("Succeeded"),
            RunState::Failed { node, kind } => write!(f, "Failed({}, {})", node, kind),
            RunState::Cancelled => f.write_str("Cancelled"),
        }
    }
}
