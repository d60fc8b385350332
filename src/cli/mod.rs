//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    ClickCommand, DevicesCommand, DoubleClickCommand, HistoryCommand, KeyCommand, ListCommand,
    OcrCommand, RunCommand, SaveCommand, ScreencapCommand, ScrollCommand, SwipeCommand,
    TextCommand, ValidateCommand,
};
use std::ffi::OsString;
use std::path::PathBuf;

/// Screen-recognition pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "uiflow")]
#[command(version)]
#[command(about = "Run recognition-driven UI automation pipelines on Android devices", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine settings (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep run history in memory only
    #[arg(long, global = true)]
    pub no_history: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline document on a device
    Run(RunCommand),

    /// Validate a pipeline document
    Validate(ValidateCommand),

    /// Save a pipeline document to the pipeline store
    Save(SaveCommand),

    /// List ADB devices
    Devices(DevicesCommand),

    /// Save a screenshot of a device
    Screencap(ScreencapCommand),

    /// Read the text on a device screen
    Ocr(OcrCommand),

    /// Tap a point
    Click(ClickCommand),

    /// Double-tap a point
    DoubleClick(DoubleClickCommand),

    /// Swipe between two points
    Swipe(SwipeCommand),

    /// Scroll the mouse wheel (desktop controllers only)
    Scroll(ScrollCommand),

    /// Type text into the focused field
    Text(TextCommand),

    /// Press a key
    Key(KeyCommand),

    /// Show run history
    History(HistoryCommand),

    /// List pipelines with recorded runs or saved documents
    List(ListCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
