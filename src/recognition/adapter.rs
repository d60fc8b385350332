//! Recognizer adapter - one entry point for every recognition kind

use crate::controller::Capture;
use crate::core::{
    condition::ExpectedText,
    geometry::Rect,
    node::{DEFAULT_OCR_THRESHOLD, DEFAULT_TEMPLATE_THRESHOLD},
    EngineSettings, Match, Recognition,
};
use crate::recognition::{
    template::match_template, OcrBackend, RecognitionError, Recognizer, SharedOcrModel,
    TemplateLibrary, TesseractOcr, TextBox,
};
use async_trait::async_trait;
use image::{imageops, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes each recognition kind to its backend
pub struct RecognizerAdapter {
    ocr: Arc<SharedOcrModel>,
    templates: Arc<TemplateLibrary>,
    inference_timeout: Duration,
}

impl RecognizerAdapter {
    pub fn new(ocr: Arc<SharedOcrModel>, templates: Arc<TemplateLibrary>) -> Self {
        Self {
            ocr,
            templates,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }

    /// Limit each OCR detection and template search; model loading has its own limit
    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    /// Adapter with a tesseract OCR backend configured from settings
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let backend: Arc<dyn OcrBackend> = Arc::new(TesseractOcr::new(
            settings.ocr.tesseract_path.clone(),
            settings.ocr.language.clone(),
        ));
        Self::with_backend(backend, settings)
    }

    /// Adapter over any OCR backend, sharing settings for timeouts and templates
    pub fn with_backend(backend: Arc<dyn OcrBackend>, settings: &EngineSettings) -> Self {
        Self::new(
            Arc::new(SharedOcrModel::new(backend, settings.model_load_timeout())),
            Arc::new(TemplateLibrary::new(settings.template_root())),
        )
        .with_inference_timeout(settings.recognition_timeout())
    }

    pub fn ocr_model(&self) -> &Arc<SharedOcrModel> {
        &self.ocr
    }

    pub fn templates(&self) -> &Arc<TemplateLibrary> {
        &self.templates
    }

    async fn detect(&self, image: &RgbaImage) -> Result<Vec<TextBox>, RecognitionError> {
        self.ocr.ensure_ready().await?;
        match tokio::time::timeout(self.inference_timeout, self.ocr.detect(image)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("OCR detection timed out after {:?}", self.inference_timeout);
                Err(RecognitionError::TimedOut {
                    operation: "OCR detection",
                    after: self.inference_timeout,
                })
            }
        }
    }

    /// Every text line in `capture`, optionally within `roi`, in capture coordinates
    pub async fn read_text(
        &self,
        capture: &RgbaImage,
        roi: Option<Rect>,
    ) -> Result<Vec<TextBox>, RecognitionError> {
        let roi = roi.filter(|r| !r.is_empty());
        let (boxes, offset) = match roi {
            None => (self.detect(capture).await?, (0, 0)),
            Some(roi) => match roi.clamp_to(capture.width(), capture.height()) {
                None => return Ok(Vec::new()),
                Some(area) => {
                    let cropped = imageops::crop_imm(
                        capture,
                        area.x as u32,
                        area.y as u32,
                        area.w as u32,
                        area.h as u32,
                    )
                    .to_image();
                    (self.detect(&cropped).await?, (area.x, area.y))
                }
            },
        };

        Ok(boxes
            .into_iter()
            .map(|b| TextBox {
                region: b.region.offset(offset.0, offset.1),
                ..b
            })
            .collect())
    }

    /// First text line, in reading order, that satisfies `expected`
    pub async fn recognize_ocr(
        &self,
        capture: &RgbaImage,
        roi: Option<Rect>,
        expected: &ExpectedText,
        threshold: f64,
    ) -> Result<Option<Match>, RecognitionError> {
        let boxes = self.read_text(capture, roi).await?;
        debug!("OCR found {} lines", boxes.len());

        Ok(boxes
            .into_iter()
            .find(|b| b.score >= threshold && expected.matches(&b.text))
            .map(|b| Match::text(b.region, b.text, b.score)))
    }

    /// Best location of the first of `templates` whose score reaches `threshold`
    ///
    /// Templates are searched in order; later ones are only loaded when the
    /// earlier ones miss.
    pub async fn recognize_template(
        &self,
        capture: Capture,
        roi: Option<Rect>,
        templates: &[String],
        threshold: f64,
    ) -> Result<Option<Match>, RecognitionError> {
        for template in templates {
            let template_image = self.templates.load(template)?;
            let capture = capture.clone();

            let search = tokio::task::spawn_blocking(move || {
                match_template(&capture, roi, &template_image)
            });
            let found = match tokio::time::timeout(self.inference_timeout, search).await {
                Ok(joined) => joined.map_err(|e| {
                    RecognitionError::Backend(format!("template matcher crashed: {}", e))
                })?,
                Err(_) => {
                    warn!("Template {} search timed out after {:?}", template, self.inference_timeout);
                    return Err(RecognitionError::TimedOut {
                        operation: "template search",
                        after: self.inference_timeout,
                    });
                }
            };

            match found {
                Some((region, score)) if score >= threshold => {
                    debug!("Template {} matched at {} ({:.3})", template, region, score);
                    return Ok(Some(Match::region(region, score)));
                }
                Some((_, score)) => {
                    debug!("Template {} best score {:.3} below {:.3}", template, score, threshold);
                }
                None => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Recognizer for RecognizerAdapter {
    async fn recognize(
        &self,
        recognition: &Recognition,
        capture: Option<Capture>,
    ) -> Result<Option<Match>, RecognitionError> {
        let capture = match (recognition, capture) {
            (Recognition::DirectHit, _) => return Ok(Some(Match::direct())),
            (_, Some(capture)) => capture,
            (other, None) => {
                return Err(RecognitionError::Backend(format!(
                    "{} recognition was given no capture",
                    other.kind()
                )))
            }
        };

        match recognition {
            Recognition::DirectHit => Ok(Some(Match::direct())),
            Recognition::Ocr {
                expected,
                threshold,
                ..
            } => {
                self.recognize_ocr(
                    &capture,
                    recognition.roi(),
                    expected,
                    threshold.unwrap_or(DEFAULT_OCR_THRESHOLD),
                )
                .await
            }
            Recognition::TemplateMatch {
                templates,
                threshold,
                ..
            } => {
                self.recognize_template(
                    capture,
                    recognition.roi(),
                    templates,
                    threshold.unwrap_or(DEFAULT_TEMPLATE_THRESHOLD),
                )
                .await
            }
        }
    }
}
