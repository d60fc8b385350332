//! Android controller over the `adb` command line tool

use crate::controller::{Controller, ControllerError, Platform};
use crate::core::geometry::Point;
use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Holds shorter than this are sent as a plain tap
const TAP_HOLD_LIMIT: Duration = Duration::from_millis(100);

/// Key holds at least this long are sent as a long press
const LONG_KEY_HOLD: Duration = Duration::from_millis(500);

/// A line of `adb devices` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl AdbDevice {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Controller for one Android device, identified by serial
#[derive(Debug, Clone)]
pub struct AdbController {
    adb_path: PathBuf,
    serial: String,
}

impl AdbController {
    pub fn new(adb_path: impl Into<PathBuf>, serial: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
        }
    }

    /// Open a controller for `serial`, checking that the device is online
    ///
    /// Serials of the form `host:port` are `adb connect`ed first.
    pub async fn connect(adb_path: &Path, serial: &str) -> Result<Self, ControllerError> {
        if serial.contains(':') {
            let output = run_adb(adb_path, &["connect", serial]).await?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("failed") || stdout.contains("unable") {
                return Err(ControllerError::lost(stdout.trim().to_string()));
            }
        }

        let devices = Self::devices(adb_path).await?;
        match devices.iter().find(|d| d.serial == serial) {
            Some(device) if device.is_online() => Ok(Self::new(adb_path, serial)),
            Some(device) => Err(ControllerError::lost(format!(
                "device {} is {}",
                serial, device.state
            ))),
            None => Err(ControllerError::NotFound {
                id: serial.to_string(),
            }),
        }
    }

    /// List devices known to the adb server
    pub async fn devices(adb_path: &Path) -> Result<Vec<AdbDevice>, ControllerError> {
        let output = run_adb(adb_path, &["devices"]).await?;
        check_status("devices", &output)?;
        Ok(parse_devices(&String::from_utf8_lossy(&output.stdout)))
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn adb(&self, operation: &'static str, args: &[&str]) -> Result<Vec<u8>, ControllerError> {
        let mut full = vec!["-s", self.serial.as_str()];
        full.extend_from_slice(args);
        let output = run_adb(&self.adb_path, &full).await?;
        check_status(operation, &output)?;
        Ok(output.stdout)
    }

    async fn shell_input(&self, operation: &'static str, args: &[String]) -> Result<(), ControllerError> {
        let mut full: Vec<&str> = vec!["shell", "input"];
        full.extend(args.iter().map(String::as_str));
        self.adb(operation, &full).await.map(|_| ())
    }
}

async fn run_adb(adb_path: &Path, args: &[&str]) -> Result<Output, ControllerError> {
    debug!("Running {} {}", adb_path.display(), args.join(" "));
    Command::new(adb_path)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ControllerError::lost(format!("failed to run {}: {}", adb_path.display(), e)))
}

fn check_status(operation: &'static str, output: &Output) -> Result<(), ControllerError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let exit_code = output.status.code().unwrap_or(-1);
    warn!("adb {} exited with code {}: {}", operation, exit_code, stderr);

    if is_connection_error(stderr) {
        Err(ControllerError::lost(stderr.to_string()))
    } else {
        Err(ControllerError::rejected(
            operation,
            format!("adb exited with code {}: {}", exit_code, stderr),
        ))
    }
}

fn is_connection_error(stderr: &str) -> bool {
    ["not found", "offline", "no devices", "device unauthorized", "closed"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

fn parse_devices(stdout: &str) -> Vec<AdbDevice> {
    stdout
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AdbDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Escape text for `adb shell input text`
fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str("%s"),
            '\'' | '"' | '\\' | '&' | '|' | '<' | '>' | ';' | '(' | ')' | '$' | '`' | '*'
            | '?' | '~' | '#' | '!' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl Controller for AdbController {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn name(&self) -> &str {
        &self.serial
    }

    async fn capture(&self) -> Result<RgbaImage, ControllerError> {
        let png = self.adb("capture", &["exec-out", "screencap", "-p"]).await?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png).map_err(|e| {
            ControllerError::rejected("capture", format!("screencap returned no image: {}", e))
        })?;
        Ok(image.to_rgba8())
    }

    async fn click(&self, point: Point, _button: u8, hold: Duration) -> Result<(), ControllerError> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        if hold < TAP_HOLD_LIMIT {
            self.shell_input("click", &["tap".to_string(), x, y]).await
        } else {
            let ms = hold.as_millis().to_string();
            self.shell_input("click", &["swipe".to_string(), x.clone(), y.clone(), x, y, ms])
                .await
        }
    }

    async fn swipe(&self, begin: Point, end: Point, duration: Duration) -> Result<(), ControllerError> {
        let args = [
            "swipe".to_string(),
            begin.x.to_string(),
            begin.y.to_string(),
            end.x.to_string(),
            end.y.to_string(),
            duration.as_millis().to_string(),
        ];
        self.shell_input("swipe", &args).await
    }

    async fn input_text(&self, text: &str) -> Result<(), ControllerError> {
        self.shell_input("input_text", &["text".to_string(), escape_input_text(text)])
            .await
    }

    async fn press_key(&self, code: i32, hold: Duration) -> Result<(), ControllerError> {
        let mut args = vec!["keyevent".to_string()];
        if hold >= LONG_KEY_HOLD {
            args.push("--longpress".to_string());
        }
        args.push(code.to_string());
        self.shell_input("press_key", &args).await
    }

    async fn key_combo(&self, codes: &[i32]) -> Result<(), ControllerError> {
        let mut args = vec!["keycombination".to_string()];
        args.extend(codes.iter().map(i32::to_string));
        self.shell_input("key_combo", &args).await
    }
}
