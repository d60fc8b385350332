//! CLI command definitions

use crate::core::geometry::Rect;
use clap::Args;
use std::path::PathBuf;

/// Device selection shared by device-facing commands
#[derive(Debug, Args, Clone)]
pub struct DeviceArgs {
    /// ADB serial or host:port; defaults to the only online device
    #[arg(short, long)]
    pub device: Option<String>,
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline JSON file
    #[arg(short, long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Node to start from; defaults to the node no other node points at
    #[arg(short, long)]
    pub entry: Option<String>,

    /// Name recorded in history; defaults to the file stem
    #[arg(short, long)]
    pub name: Option<String>,

    /// Print the full run result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline JSON file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Print the normalized document
    #[arg(long)]
    pub json: bool,
}

/// Save a pipeline document
#[derive(Debug, Args, Clone)]
pub struct SaveCommand {
    /// Pipeline JSON file to save
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output file or directory; defaults to the pipeline store
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Name used for generated file names
    #[arg(short, long)]
    pub name: Option<String>,

    /// Fail instead of replacing an existing file
    #[arg(long)]
    pub no_overwrite: bool,

    /// Save even if the document does not validate
    #[arg(long)]
    pub skip_validation: bool,
}

/// List ADB devices
#[derive(Debug, Args, Clone)]
pub struct DevicesCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Save a screenshot
#[derive(Debug, Args, Clone)]
pub struct ScreencapCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Output PNG path
    #[arg(short, long, default_value = "screen.png")]
    pub output: PathBuf,
}

/// Read screen text
#[derive(Debug, Args, Clone)]
pub struct OcrCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Region to read as x,y,w,h
    #[arg(long, value_parser = parse_rect)]
    pub roi: Option<Rect>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Tap a point
#[derive(Debug, Args, Clone)]
pub struct ClickCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    pub x: i32,

    pub y: i32,

    /// Hold time in milliseconds; long holds become a long press
    #[arg(long)]
    pub hold: Option<u64>,
}

/// Double-tap a point
#[derive(Debug, Args, Clone)]
pub struct DoubleClickCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    pub x: i32,

    pub y: i32,
}

/// Swipe between two points
#[derive(Debug, Args, Clone)]
pub struct SwipeCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    pub x1: i32,

    pub y1: i32,

    pub x2: i32,

    pub y2: i32,

    /// Gesture time in milliseconds
    #[arg(long, default_value_t = 300)]
    pub duration: u64,
}

/// Scroll the wheel; negative dy scrolls down
#[derive(Debug, Args, Clone)]
pub struct ScrollCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[arg(allow_negative_numbers = true)]
    pub dx: i32,

    #[arg(allow_negative_numbers = true)]
    pub dy: i32,
}

/// Type text
#[derive(Debug, Args, Clone)]
pub struct TextCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    pub text: String,
}

/// Press a key
#[derive(Debug, Args, Clone)]
pub struct KeyCommand {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Android key code, e.g. 4 for BACK
    pub code: i32,

    /// Long press
    #[arg(long)]
    pub long: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// List pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// List saved documents in the pipeline store instead
    #[arg(long)]
    pub saved: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse `x,y,w,h`
pub fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Invalid rectangle '{}': {}", s, e))?;

    match parts.as_slice() {
        [x, y, w, h] if *w >= 0 && *h >= 0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err(format!("Rectangle '{}' has a negative size", s)),
        _ => Err(format!("Expected x,y,w,h, got '{}'", s)),
    }
}
