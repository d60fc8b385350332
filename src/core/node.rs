//! Pipeline node domain model

use crate::core::{
    condition::ExpectedText,
    geometry::{Point, Rect},
};
use std::fmt;
use std::str::FromStr;

/// Default OCR confidence threshold
pub const DEFAULT_OCR_THRESHOLD: f64 = 0.3;

/// Default template correlation threshold
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 0.7;

/// A single vertex of a pipeline graph
///
/// The node name is the key in [`PipelineGraph`](crate::core::PipelineGraph)
/// and is not repeated here.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    /// Screen condition that must hold before the action runs
    pub recognition: Recognition,

    /// What to do once recognized
    pub action: Action,

    /// Candidate successors, tried in order; empty means terminal
    pub next: Vec<String>,

    /// Per-node wait and retry budget
    pub timing: NodeTiming,
}

impl PipelineNode {
    pub fn new(recognition: Recognition, action: Action) -> Self {
        Self {
            recognition,
            action,
            next: Vec::new(),
            timing: NodeTiming::default(),
        }
    }

    pub fn with_next<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next = next.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timing.timeout = Some(timeout_ms);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit_ms: u64) -> Self {
        self.timing.rate_limit = Some(rate_limit_ms);
        self
    }

    pub fn with_pre_delay(mut self, delay_ms: u64) -> Self {
        self.timing.pre_delay = Some(delay_ms);
        self
    }

    pub fn with_post_delay(mut self, delay_ms: u64) -> Self {
        self.timing.post_delay = Some(delay_ms);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_empty()
    }
}

/// Timing fields as written in the document, in milliseconds
///
/// Unset fields fall back to [`EngineSettings`](crate::core::EngineSettings).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTiming {
    /// Recognition budget
    pub timeout: Option<u64>,
    /// Interval between recognition attempts
    pub rate_limit: Option<u64>,
    /// Wait between recognition and action
    pub pre_delay: Option<u64>,
    /// Wait after the action, before the next node is recognized
    pub post_delay: Option<u64>,
}

/// Recognition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionKind {
    DirectHit,
    Ocr,
    TemplateMatch,
}

impl RecognitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionKind::DirectHit => "DirectHit",
            RecognitionKind::Ocr => "OCR",
            RecognitionKind::TemplateMatch => "TemplateMatch",
        }
    }
}

impl FromStr for RecognitionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DirectHit" => Ok(RecognitionKind::DirectHit),
            "OCR" => Ok(RecognitionKind::Ocr),
            "TemplateMatch" => Ok(RecognitionKind::TemplateMatch),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for RecognitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen condition of a node
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// Always matches without looking at the screen
    DirectHit,

    /// Text detection, optionally restricted to a region of interest
    Ocr {
        expected: ExpectedText,
        roi: Option<Rect>,
        threshold: Option<f64>,
    },

    /// Reference image correlation
    TemplateMatch {
        /// Paths relative to the template directory, tried in order
        templates: Vec<String>,
        roi: Option<Rect>,
        threshold: Option<f64>,
    },
}

impl Recognition {
    /// OCR recognition with a single substring pattern
    pub fn ocr(expected: impl Into<String>) -> Self {
        Recognition::Ocr {
            expected: ExpectedText::simple(expected),
            roi: None,
            threshold: None,
        }
    }

    pub fn kind(&self) -> RecognitionKind {
        match self {
            Recognition::DirectHit => RecognitionKind::DirectHit,
            Recognition::Ocr { .. } => RecognitionKind::Ocr,
            Recognition::TemplateMatch { .. } => RecognitionKind::TemplateMatch,
        }
    }

    /// Whether a successful match carries a screen region
    pub fn yields_region(&self) -> bool {
        !matches!(self, Recognition::DirectHit)
    }

    /// Whether recognition needs a capture at all
    pub fn needs_capture(&self) -> bool {
        !matches!(self, Recognition::DirectHit)
    }

    /// Region of interest, `None` for the whole capture
    pub fn roi(&self) -> Option<Rect> {
        match self {
            Recognition::DirectHit => None,
            Recognition::Ocr { roi, .. } | Recognition::TemplateMatch { roi, .. } => {
                roi.filter(|r| !r.is_empty())
            }
        }
    }
}

/// Where a coordinate-bearing action lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Centre of the region matched by this node's recognition
    MatchRegion,
    /// A fixed point
    Point(Point),
    /// Centre of a fixed rectangle
    Region(Rect),
    /// Centre of the region most recently matched by the named node
    Node(String),
}

impl Default for Target {
    fn default() -> Self {
        Target::MatchRegion
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::MatchRegion => f.write_str("match"),
            Target::Point(p) => write!(f, "{}", p),
            Target::Region(r) => write!(f, "{}", r),
            Target::Node(name) => write!(f, "@{}", name),
        }
    }
}

/// Action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ActionKind {
    DoNothing,
    Click,
    DoubleClick,
    LongPress,
    Swipe,
    InputText,
    PressKey,
    KeyCombo,
    Scroll,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DoNothing => "DoNothing",
            ActionKind::Click => "Click",
            ActionKind::DoubleClick => "DoubleClick",
            ActionKind::LongPress => "LongPress",
            ActionKind::Swipe => "Swipe",
            ActionKind::InputText => "InputText",
            ActionKind::PressKey => "PressKey",
            ActionKind::KeyCombo => "KeyCombo",
            ActionKind::Scroll => "Scroll",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DoNothing" => Ok(ActionKind::DoNothing),
            "Click" => Ok(ActionKind::Click),
            "DoubleClick" => Ok(ActionKind::DoubleClick),
            "LongPress" => Ok(ActionKind::LongPress),
            "Swipe" => Ok(ActionKind::Swipe),
            "InputText" => Ok(ActionKind::InputText),
            "PressKey" => Ok(ActionKind::PressKey),
            "KeyCombo" => Ok(ActionKind::KeyCombo),
            "Scroll" => Ok(ActionKind::Scroll),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Follow-up action of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Pure routing node
    DoNothing,
    Click {
        target: Target,
        button: u8,
    },
    DoubleClick {
        target: Target,
        button: u8,
    },
    LongPress {
        target: Target,
        button: u8,
        /// Hold time in milliseconds
        duration: Option<u64>,
    },
    /// One continuous gesture from `begin` to `end`
    Swipe {
        begin: Target,
        end: Target,
        /// Gesture time in milliseconds
        duration: u64,
    },
    /// Types into whatever currently has focus
    InputText {
        text: String,
    },
    PressKey {
        key: i32,
        long: bool,
    },
    /// Keys pressed together, released in reverse order
    KeyCombo {
        keys: Vec<i32>,
    },
    /// Mouse wheel; desktop targets only
    Scroll {
        dx: i32,
        dy: i32,
    },
}

impl Action {
    /// Click the centre of the matched region with the primary button
    pub fn click() -> Self {
        Action::Click {
            target: Target::MatchRegion,
            button: 0,
        }
    }

    pub fn click_at(x: i32, y: i32) -> Self {
        Action::Click {
            target: Target::Point(Point::new(x, y)),
            button: 0,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::DoNothing => ActionKind::DoNothing,
            Action::Click { .. } => ActionKind::Click,
            Action::DoubleClick { .. } => ActionKind::DoubleClick,
            Action::LongPress { .. } => ActionKind::LongPress,
            Action::Swipe { .. } => ActionKind::Swipe,
            Action::InputText { .. } => ActionKind::InputText,
            Action::PressKey { .. } => ActionKind::PressKey,
            Action::KeyCombo { .. } => ActionKind::KeyCombo,
            Action::Scroll { .. } => ActionKind::Scroll,
        }
    }

    /// All coordinate targets this action resolves
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Action::Click { target, .. }
            | Action::DoubleClick { target, .. }
            | Action::LongPress { target, .. } => vec![target],
            Action::Swipe { begin, end, .. } => vec![begin, end],
            Action::DoNothing
            | Action::InputText { .. }
            | Action::PressKey { .. }
            | Action::KeyCombo { .. }
            | Action::Scroll { .. } => Vec::new(),
        }
    }
}
