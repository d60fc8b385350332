//! Run trace and result types

use crate::core::{
    error::ErrorKind,
    geometry::{Point, Rect},
    node::ActionKind,
    state::ExecutionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a successful recognition found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Bounding box in capture coordinates; `None` for DirectHit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Rect>,

    /// Detected text for OCR matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Confidence or correlation score, 1.0 for DirectHit
    pub score: f64,
}

impl Match {
    /// The unconditional match of a DirectHit node
    pub fn direct() -> Self {
        Self {
            region: None,
            text: None,
            score: 1.0,
        }
    }

    pub fn region(region: Rect, score: f64) -> Self {
        Self {
            region: Some(region),
            text: None,
            score,
        }
    }

    pub fn text(region: Rect, text: impl Into<String>, score: f64) -> Self {
        Self {
            region: Some(region),
            text: Some(text.into()),
            score,
        }
    }

    pub fn center(&self) -> Option<Point> {
        self.region.map(|r| r.center())
    }
}

/// Recognition half of a [`NodeOutcome`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    Matched {
        attempts: u32,
        #[serde(flatten)]
        found: Match,
    },
    NotMatched {
        attempts: u32,
    },
}

impl RecognitionOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, RecognitionOutcome::Matched { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RecognitionOutcome::Matched { attempts, .. }
            | RecognitionOutcome::NotMatched { attempts } => *attempts,
        }
    }

    pub fn found(&self) -> Option<&Match> {
        match self {
            RecognitionOutcome::Matched { found, .. } => Some(found),
            RecognitionOutcome::NotMatched { .. } => None,
        }
    }
}

/// Action half of a [`NodeOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Primitive calls were issued; `points` are the resolved coordinates
    Dispatched { kind: ActionKind, points: Vec<Point> },
    /// Recognition did not match, so nothing was dispatched
    Skipped,
    /// Dispatch started and failed
    Failed { kind: ActionKind },
}

impl ActionOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, ActionOutcome::Dispatched { .. })
    }
}

/// Error attached to a trace entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// One trace entry, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node: String,
    pub recognition: RecognitionOutcome,
    pub action: ActionOutcome,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl NodeOutcome {
    /// Recognition matched and the action went out
    pub fn succeeded(&self) -> bool {
        self.recognition.is_matched() && self.action.is_dispatched() && self.error.is_none()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FinalState {
    Succeeded,
    Failed {
        /// Node the failure is attributed to
        node: String,
        kind: ErrorKind,
        /// Recognition attempt at which the run ended, 0 when none was made
        attempt: u32,
        message: String,
    },
    Cancelled,
}

impl FinalState {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            FinalState::Succeeded => ExecutionStatus::Completed,
            FinalState::Failed { .. } => ExecutionStatus::Failed,
            FinalState::Cancelled => ExecutionStatus::Cancelled,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FinalState::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Everything a caller gets back from a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub controller_id: String,
    pub entry: String,
    pub final_state: FinalState,
    pub trace: Vec<NodeOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn status(&self) -> ExecutionStatus {
        self.final_state.status()
    }

    pub fn is_success(&self) -> bool {
        self.final_state == FinalState::Succeeded
    }

    /// Names of nodes in trace order
    pub fn visited(&self) -> Vec<&str> {
        self.trace.iter().map(|o| o.node.as_str()).collect()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
