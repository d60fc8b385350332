//! OCR backend that shells out to the `tesseract` command line tool

use crate::core::geometry::Rect;
use crate::recognition::{OcrBackend, RecognitionError, TextBox};
use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Tesseract CLI client
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    tesseract_path: PathBuf,
    /// Tesseract language list, e.g. `eng` or `eng+chi_sim`
    language: String,
}

impl TesseractOcr {
    pub fn new(tesseract_path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            tesseract_path: tesseract_path.into(),
            language: language.into(),
        }
    }

    fn missing_languages(&self, installed: &str) -> Vec<String> {
        let installed: Vec<&str> = installed
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        self.language
            .split('+')
            .filter(|lang| !installed.contains(lang))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl OcrBackend for TesseractOcr {
    async fn load(&self) -> Result<(), RecognitionError> {
        let output = Command::new(&self.tesseract_path)
            .arg("--list-langs")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RecognitionError::ResourceUnavailable(format!(
                    "failed to run {}: {}",
                    self.tesseract_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(RecognitionError::ResourceUnavailable(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let missing = self.missing_languages(&String::from_utf8_lossy(&output.stdout));
        if !missing.is_empty() {
            return Err(RecognitionError::ResourceUnavailable(format!(
                "tesseract language data not installed: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    async fn detect(&self, image: &RgbaImage) -> Result<Vec<TextBox>, RecognitionError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RecognitionError::Backend(format!("failed to encode capture: {}", e)))?;

        let mut child = Command::new(&self.tesseract_path)
            .args(["stdin", "stdout", "-l", &self.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognitionError::Backend(format!("failed to run tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| RecognitionError::Backend(format!("failed to feed tesseract: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RecognitionError::Backend(format!("tesseract did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("tesseract exited with {:?}: {}", output.status.code(), stderr.trim());
            return Err(RecognitionError::Backend(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        let lines = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract detected {} lines", lines.len());
        Ok(lines)
    }
}

/// Group word rows of tesseract TSV output into lines
fn parse_tsv(tsv: &str) -> Vec<TextBox> {
    struct Line {
        key: (u32, u32, u32, u32),
        words: Vec<String>,
        bounds: (i32, i32, i32, i32),
        confidence: f64,
    }

    let mut lines: Vec<Line> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        let conf: f64 = cols[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].parse::<i64>().unwrap_or(0);
        let key = (num(1) as u32, num(2) as u32, num(3) as u32, num(4) as u32);
        let (left, top) = (num(6) as i32, num(7) as i32);
        let (right, bottom) = (left + num(8) as i32, top + num(9) as i32);

        match lines.last_mut() {
            Some(line) if line.key == key => {
                line.words.push(text.to_string());
                line.bounds.0 = line.bounds.0.min(left);
                line.bounds.1 = line.bounds.1.min(top);
                line.bounds.2 = line.bounds.2.max(right);
                line.bounds.3 = line.bounds.3.max(bottom);
                line.confidence += conf;
            }
            _ => lines.push(Line {
                key,
                words: vec![text.to_string()],
                bounds: (left, top, right, bottom),
                confidence: conf,
            }),
        }
    }

    lines
        .into_iter()
        .map(|line| {
            let (x0, y0, x1, y1) = line.bounds;
            TextBox {
                score: line.confidence / line.words.len() as f64 / 100.0,
                text: line.words.join(" "),
                region: Rect::new(x0, y0, x1 - x0, y1 - y0),
            }
        })
        .collect()
}
