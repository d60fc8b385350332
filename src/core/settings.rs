//! Engine settings from YAML
//!
//! Every field has a default, so an empty document (or no file at all) is a
//! valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine-wide defaults and limits, all durations in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Recognition budget for nodes without `timeout`
    pub default_timeout_ms: u64,

    /// Interval between recognition attempts for nodes without `rate_limit`
    pub default_rate_limit_ms: u64,

    /// Ceiling on the attempt count derived from timeout and interval
    pub max_attempts: u32,

    pub default_pre_delay_ms: u64,

    pub default_post_delay_ms: u64,

    /// Node visits allowed per run, bounds cycles in the graph
    pub max_steps: usize,

    /// Hard limit on any single controller call
    pub controller_call_timeout_ms: u64,

    /// Limit on OCR model initialization
    pub model_load_timeout_ms: u64,

    /// Limit on one recognition inference, model loading excluded
    pub recognition_timeout_ms: u64,

    pub click_hold_ms: u64,

    pub double_click_interval_ms: u64,

    /// LongPress hold time when the node has no `duration`
    pub long_press_ms: u64,

    pub key_hold_ms: u64,

    pub long_key_hold_ms: u64,

    /// Root for `template` paths
    pub template_dir: Option<PathBuf>,

    pub ocr: OcrSettings,

    pub adb: AdbSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            default_rate_limit_ms: 1_000,
            max_attempts: 100,
            default_pre_delay_ms: 200,
            default_post_delay_ms: 200,
            max_steps: 1_000,
            controller_call_timeout_ms: 10_000,
            model_load_timeout_ms: 120_000,
            recognition_timeout_ms: 30_000,
            click_hold_ms: 50,
            double_click_interval_ms: 100,
            long_press_ms: 1_000,
            key_hold_ms: 50,
            long_key_hold_ms: 1_000,
            template_dir: None,
            ocr: OcrSettings::default(),
            adb: AdbSettings::default(),
        }
    }
}

/// Tesseract backend options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub tesseract_path: PathBuf,
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
        }
    }
}

/// ADB transport options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbSettings {
    pub adb_path: PathBuf,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
        }
    }
}

impl EngineSettings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: EngineSettings = if yaml.trim().is_empty() {
            EngineSettings::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.default_rate_limit_ms == 0 {
            anyhow::bail!("default_rate_limit_ms must be greater than zero");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.max_steps == 0 {
            anyhow::bail!("max_steps must be at least 1");
        }
        if self.controller_call_timeout_ms == 0 {
            anyhow::bail!("controller_call_timeout_ms must be greater than zero");
        }
        if self.recognition_timeout_ms == 0 {
            anyhow::bail!("recognition_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn controller_call_timeout(&self) -> Duration {
        Duration::from_millis(self.controller_call_timeout_ms)
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_millis(self.model_load_timeout_ms)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    /// Template root, falling back to the current directory
    pub fn template_root(&self) -> PathBuf {
        self.template_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
