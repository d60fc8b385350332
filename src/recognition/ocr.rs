//! OCR backends and the shared, lazily loaded OCR model

use crate::core::geometry::Rect;
use crate::recognition::RecognitionError;
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// One line of detected text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    pub region: Rect,
    /// Confidence in 0..=1
    pub score: f64,
}

/// Text detection and recognition over an image
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Make the model ready; called until it succeeds once
    async fn load(&self) -> Result<(), RecognitionError>;

    /// Detect text lines, in reading order
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<TextBox>, RecognitionError>;
}

/// One OCR model shared by every run
///
/// The model is loaded on first use. Concurrent first uses wait on the same
/// load; a failed load is not remembered, so the next use tries again.
pub struct SharedOcrModel {
    backend: Arc<dyn OcrBackend>,
    ready: OnceCell<()>,
    load_timeout: Duration,
}

impl SharedOcrModel {
    pub fn new(backend: Arc<dyn OcrBackend>, load_timeout: Duration) -> Self {
        Self {
            backend,
            ready: OnceCell::new(),
            load_timeout,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Load the model if that has not happened yet
    pub async fn ensure_ready(&self) -> Result<(), RecognitionError> {
        self.ready
            .get_or_try_init(|| async {
                info!("Loading OCR model");
                match tokio::time::timeout(self.load_timeout, self.backend.load()).await {
                    Ok(Ok(())) => {
                        info!("OCR model ready");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        warn!("OCR model failed to load: {}", e);
                        Err(e)
                    }
                    Err(_) => Err(RecognitionError::ResourceUnavailable(format!(
                        "OCR model did not load within {:?}",
                        self.load_timeout
                    ))),
                }
            })
            .await
            .map(|_| ())
    }

    pub async fn detect(&self, image: &RgbaImage) -> Result<Vec<TextBox>, RecognitionError> {
        self.ensure_ready().await?;
        self.backend.detect(image).await
    }
}
