//! Template matching by normalized cross-correlation
//!
//! Scores are zero-mean normalized correlation coefficients in `-1..=1`,
//! compared against the node threshold. Large templates are searched on a
//! downscaled copy first and refined at full resolution around the best
//! coarse hits.

use crate::core::geometry::Rect;
use crate::recognition::RecognitionError;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Coarse search keeps this many candidates for refinement
const COARSE_CANDIDATES: usize = 3;

/// Templates loaded from disk, cached by path
pub struct TemplateLibrary {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<GrayImage>>>,
}

impl TemplateLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Grayscale template for `name`, relative to the library root
    pub fn load(&self, name: &str) -> Result<Arc<GrayImage>, RecognitionError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(template) = cache.get(name) {
            return Ok(template.clone());
        }

        let path = self.root.join(name);
        let image = image::open(&path).map_err(|e| {
            RecognitionError::ResourceUnavailable(format!(
                "template {} could not be loaded: {}",
                path.display(),
                e
            ))
        })?;
        let template = Arc::new(image.to_luma8());
        debug!(
            "Loaded template {} ({}x{})",
            path.display(),
            template.width(),
            template.height()
        );
        cache.insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Insert a template without touching the filesystem
    pub fn insert(&self, name: impl Into<String>, template: GrayImage) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Arc::new(template));
    }
}

/// Sums over the search image for constant-time window statistics
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }

        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let at = |t: &[f64]| t[(y + h) * s + x + w] - t[y * s + x + w] - t[(y + h) * s + x] + t[y * s + x];
        (at(&self.sum), at(&self.sq))
    }
}

struct Prepared {
    width: usize,
    height: usize,
    zero_mean: Vec<f64>,
    energy: f64,
}

impl Prepared {
    fn new(template: &GrayImage) -> Self {
        let raw = template.as_raw();
        let n = raw.len().max(1) as f64;
        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
        let zero_mean: Vec<f64> = raw.iter().map(|&v| v as f64 - mean).collect();
        let energy = zero_mean.iter().map(|v| v * v).sum();
        Self {
            width: template.width() as usize,
            height: template.height() as usize,
            zero_mean,
            energy,
        }
    }
}

fn score_at(image: &GrayImage, integral: &Integral, t: &Prepared, x: usize, y: usize) -> f64 {
    let width = image.width() as usize;
    let raw = image.as_raw();

    let mut num = 0.0;
    for j in 0..t.height {
        let row = (y + j) * width + x;
        let trow = j * t.width;
        for i in 0..t.width {
            num += raw[row + i] as f64 * t.zero_mean[trow + i];
        }
    }

    let n = (t.width * t.height) as f64;
    let (s, sq) = integral.window(x, y, t.width, t.height);
    let variance = sq - s * s / n;
    let den = (variance * t.energy).sqrt();
    if den <= f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

/// Best positions within `xs` x `ys`, highest score first
fn search(
    image: &GrayImage,
    integral: &Integral,
    t: &Prepared,
    xs: std::ops::RangeInclusive<usize>,
    ys: std::ops::RangeInclusive<usize>,
    keep: usize,
) -> Vec<(usize, usize, f64)> {
    let mut best: Vec<(usize, usize, f64)> = Vec::with_capacity(keep + 1);
    for y in ys {
        for x in xs.clone() {
            let score = score_at(image, integral, t, x, y);
            if best.len() < keep || score > best[best.len() - 1].2 {
                let pos = best.iter().position(|b| score > b.2).unwrap_or(best.len());
                best.insert(pos, (x, y, score));
                best.truncate(keep);
            }
        }
    }
    best
}

/// Find `template` in `capture`, restricted to `roi` when given
///
/// Returns the matched rectangle in capture coordinates and its score.
pub fn match_template(
    capture: &RgbaImage,
    roi: Option<Rect>,
    template: &GrayImage,
) -> Option<(Rect, f64)> {
    let area = match roi {
        Some(roi) => roi.clamp_to(capture.width(), capture.height())?,
        None => Rect::new(0, 0, capture.width() as i32, capture.height() as i32),
    };
    let (tw, th) = (template.width(), template.height());
    if tw == 0 || th == 0 || tw > area.w as u32 || th > area.h as u32 {
        return None;
    }

    let cropped = imageops::crop_imm(
        capture,
        area.x as u32,
        area.y as u32,
        area.w as u32,
        area.h as u32,
    )
    .to_image();
    let gray = imageops::grayscale(&cropped);
    let integral = Integral::new(&gray);
    let prepared = Prepared::new(template);
    let max_x = (area.w as u32 - tw) as usize;
    let max_y = (area.h as u32 - th) as usize;

    let factor = (tw.min(th) / 12).clamp(1, 4);
    let (x, y, score) = if factor == 1 {
        search(&gray, &integral, &prepared, 0..=max_x, 0..=max_y, 1)
            .into_iter()
            .next()?
    } else {
        let small = imageops::resize(
            &gray,
            (gray.width() / factor).max(1),
            (gray.height() / factor).max(1),
            FilterType::Triangle,
        );
        let small_template = imageops::resize(
            template,
            (tw / factor).max(1),
            (th / factor).max(1),
            FilterType::Triangle,
        );
        let small_prepared = Prepared::new(&small_template);
        let small_integral = Integral::new(&small);
        let small_max_x = small.width().checked_sub(small_template.width())? as usize;
        let small_max_y = small.height().checked_sub(small_template.height())? as usize;

        let coarse = search(
            &small,
            &small_integral,
            &small_prepared,
            0..=small_max_x,
            0..=small_max_y,
            COARSE_CANDIDATES,
        );

        let f = factor as usize;
        let radius = 2 * f;
        coarse
            .into_iter()
            .filter_map(|(cx, cy, _)| {
                let (fx, fy) = (cx * f, cy * f);
                let xs = fx.saturating_sub(radius)..=(fx + radius).min(max_x);
                let ys = fy.saturating_sub(radius)..=(fy + radius).min(max_y);
                search(&gray, &integral, &prepared, xs, ys, 1).into_iter().next()
            })
            .max_by(|a, b| a.2.total_cmp(&b.2))?
    };

    Some((
        Rect::new(area.x + x as i32, area.y + y as i32, tw as i32, th as i32),
        score,
    ))
}
