//! Error taxonomy shared by documents, traces and run results

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while loading or building a pipeline graph
///
/// Any of these fails the whole load; a graph is never partially built.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Pipeline JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read pipeline document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline document must be an object keyed by node name")]
    NotAnObject,

    #[error("Pipeline document contains no nodes")]
    Empty,

    #[error("Node '{node}' references non-existent node '{target}'")]
    DanglingReference { node: String, target: String },

    #[error("Node '{node}' has unsupported {field} kind '{kind}'")]
    UnsupportedNodeKind {
        node: String,
        field: &'static str,
        kind: String,
    },

    #[error("Node '{node}' is invalid: {message}")]
    InvalidNode { node: String, message: String },
}

impl DocumentError {
    pub fn invalid(node: &str, message: impl Into<String>) -> Self {
        DocumentError::InvalidNode {
            node: node.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DocumentError::DanglingReference { .. } => Some(ErrorKind::DanglingReference),
            DocumentError::UnsupportedNodeKind { .. } => Some(ErrorKind::UnsupportedNodeKind),
            _ => None,
        }
    }
}

/// Error kinds reported in traces and run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Model or asset missing or failed to load
    ResourceUnavailable,
    /// Recognition backend crashed or returned garbage
    RecognizerBackendError,
    /// No match within the node's budget
    RecognitionFailed,
    DanglingReference,
    UnsupportedNodeKind,
    ControllerLost,
    ControllerBusy,
    ControllerUnresponsive,
    ControllerRejected,
    UnsupportedOnPlatform,
    /// A dispatched action failed; never retried
    ActionError,
    NodeTimeout,
    NoViableNext,
    /// The run visited more nodes than `max_steps`
    StepLimitExceeded,
}

impl ErrorKind {
    /// Whether the engine may absorb this error into a node's retry budget
    pub fn is_attempt_scoped(&self) -> bool {
        matches!(
            self,
            ErrorKind::RecognitionFailed
                | ErrorKind::ControllerRejected
                | ErrorKind::ControllerUnresponsive
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
