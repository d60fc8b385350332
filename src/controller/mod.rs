//! Controllers - capture and input on a connected target

pub mod adb;
pub mod registry;

use crate::core::{geometry::Point, ErrorKind};
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use adb::{AdbController, AdbDevice};
pub use registry::{BoundController, ControllerHandle, ControllerId, ControllerRegistry, RunLease};

/// A screen capture shared between recognition and the trace
pub type Capture = Arc<RgbaImage>;

/// Kind of automation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Android,
    Windows,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Errors from controller calls and the registry
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("Controller '{id}' is not registered")]
    NotFound { id: String },

    #[error("Controller '{id}' is already running a pipeline")]
    Busy { id: String },

    #[error("Controller lost: {message}")]
    Lost { message: String },

    #[error("Controller rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("Controller did not answer {operation} within {}ms", .after.as_millis())]
    Unresponsive {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} is not supported on {platform}")]
    Unsupported {
        operation: &'static str,
        platform: Platform,
    },
}

impl ControllerError {
    pub fn lost(message: impl Into<String>) -> Self {
        ControllerError::Lost {
            message: message.into(),
        }
    }

    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        ControllerError::Rejected {
            operation,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::NotFound { .. } | ControllerError::Lost { .. } => {
                ErrorKind::ControllerLost
            }
            ControllerError::Busy { .. } => ErrorKind::ControllerBusy,
            ControllerError::Rejected { .. } => ErrorKind::ControllerRejected,
            ControllerError::Unresponsive { .. } => ErrorKind::ControllerUnresponsive,
            ControllerError::Unsupported { .. } => ErrorKind::UnsupportedOnPlatform,
        }
    }
}

/// Capture and input primitives of one live target
///
/// Implementations talk to the transport; exclusivity, connection checks
/// and call timeouts are applied by [`BoundController`].
#[async_trait]
pub trait Controller: Send + Sync {
    fn platform(&self) -> Platform;

    /// Transport-level name, e.g. an ADB serial
    fn name(&self) -> &str;

    async fn capture(&self) -> Result<RgbaImage, ControllerError>;

    /// Press and release `button` at `point`, holding for `hold`
    async fn click(&self, point: Point, button: u8, hold: Duration) -> Result<(), ControllerError>;

    /// One continuous gesture from `begin` to `end`
    async fn swipe(&self, begin: Point, end: Point, duration: Duration)
        -> Result<(), ControllerError>;

    /// Type into the focused field
    async fn input_text(&self, text: &str) -> Result<(), ControllerError>;

    async fn press_key(&self, code: i32, hold: Duration) -> Result<(), ControllerError>;

    async fn key_down(&self, _code: i32) -> Result<(), ControllerError> {
        Err(ControllerError::Unsupported {
            operation: "key_down",
            platform: self.platform(),
        })
    }

    async fn key_up(&self, _code: i32) -> Result<(), ControllerError> {
        Err(ControllerError::Unsupported {
            operation: "key_up",
            platform: self.platform(),
        })
    }

    /// Press all keys, then release them in reverse order
    async fn key_combo(&self, codes: &[i32]) -> Result<(), ControllerError> {
        for code in codes {
            self.key_down(*code).await?;
        }
        for code in codes.iter().rev() {
            self.key_up(*code).await?;
        }
        Ok(())
    }

    /// Mouse wheel; only desktop targets have one
    async fn scroll(&self, _dx: i32, _dy: i32) -> Result<(), ControllerError> {
        Err(ControllerError::Unsupported {
            operation: "scroll",
            platform: self.platform(),
        })
    }
}
