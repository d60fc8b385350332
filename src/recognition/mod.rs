//! Recognition - deciding whether a node's screen condition holds

pub mod adapter;
pub mod ocr;
pub mod template;
pub mod tesseract;

use crate::controller::Capture;
use crate::core::{ErrorKind, Match, Recognition};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use adapter::RecognizerAdapter;
pub use ocr::{OcrBackend, SharedOcrModel, TextBox};
pub use template::TemplateLibrary;
pub use tesseract::TesseractOcr;

#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    /// Model or asset missing; retrying recognition will not help
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Recognizer backend error: {0}")]
    Backend(String),

    #[error("{operation} did not finish within {}ms", .after.as_millis())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
}

impl RecognitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecognitionError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            RecognitionError::Backend(_) | RecognitionError::TimedOut { .. } => {
                ErrorKind::RecognizerBackendError
            }
        }
    }

    /// A stuck inference costs one attempt; other errors end the node
    pub fn is_attempt_scoped(&self) -> bool {
        matches!(self, RecognitionError::TimedOut { .. })
    }
}

/// Evaluates a recognition against a capture
///
/// `Ok(None)` is an ordinary miss. `capture` is `None` only for
/// recognitions that do not need one.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        recognition: &Recognition,
        capture: Option<Capture>,
    ) -> Result<Option<Match>, RecognitionError>;
}
