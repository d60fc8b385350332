//! Pipeline JSON document mapping
//!
//! A document is a JSON object keyed by node name. Each node object is a
//! flat bag of fields; which fields matter depends on the `recognition` and
//! `action` kinds. [`NodeDocument`] is that raw shape, and converting it into
//! a [`PipelineNode`] is where kind names and required fields are checked.

use crate::core::{
    condition::ExpectedText,
    error::DocumentError,
    geometry::{Point, Rect},
    node::{Action, ActionKind, NodeTiming, PipelineNode, Recognition, RecognitionKind, Target},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A field that may be written as a single value or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Target as written in a document: `true`, `[x, y]`, `[x, y, w, h]` or a node name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDocument {
    Flag(bool),
    Node(String),
    Coords(Vec<i32>),
}

impl TargetDocument {
    fn into_target(self, node: &str, field: &str) -> Result<Target, DocumentError> {
        match self {
            TargetDocument::Flag(true) => Ok(Target::MatchRegion),
            TargetDocument::Flag(false) => Err(DocumentError::invalid(
                node,
                format!("'{}' cannot be false", field),
            )),
            TargetDocument::Node(name) => Ok(Target::Node(name)),
            TargetDocument::Coords(coords) => match coords.as_slice() {
                [x, y] => Ok(Target::Point(Point::new(*x, *y))),
                [x, y, w, h] => Ok(Target::Region(Rect::new(*x, *y, *w, *h))),
                _ => Err(DocumentError::invalid(
                    node,
                    format!("'{}' must be [x, y] or [x, y, w, h]", field),
                )),
            },
        }
    }

    fn from_target(target: &Target) -> Self {
        match target {
            Target::MatchRegion => TargetDocument::Flag(true),
            Target::Point(p) => TargetDocument::Coords(vec![p.x, p.y]),
            Target::Region(r) => TargetDocument::Coords(vec![r.x, r.y, r.w, r.h]),
            Target::Node(name) => TargetDocument::Node(name.clone()),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Raw node object as it appears in pipeline JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub use_regex: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<Rect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<TargetDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TargetDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(default, alias = "input_text", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub long: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<i32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_delay: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_delay: Option<u64>,

    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeDocument {
    /// Convert into a domain node, checking kinds and required fields
    pub fn into_node(self, name: &str) -> Result<PipelineNode, DocumentError> {
        if !self.extra.is_empty() {
            let fields: Vec<&String> = self.extra.keys().collect();
            warn!("Node '{}' has unrecognised fields {:?}; ignoring them", name, fields);
        }

        let recognition_kind = match &self.recognition {
            None => RecognitionKind::DirectHit,
            Some(kind) => kind.parse().map_err(|kind| DocumentError::UnsupportedNodeKind {
                node: name.to_string(),
                field: "recognition",
                kind,
            })?,
        };

        let action_kind = match &self.action {
            None => ActionKind::DoNothing,
            Some(kind) => kind.parse().map_err(|kind| DocumentError::UnsupportedNodeKind {
                node: name.to_string(),
                field: "action",
                kind,
            })?,
        };

        let recognition = match recognition_kind {
            RecognitionKind::DirectHit => Recognition::DirectHit,
            RecognitionKind::Ocr => {
                let values = self
                    .expected
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default();
                if values.is_empty() || values.iter().any(|v| v.is_empty()) {
                    return Err(DocumentError::invalid(name, "OCR requires non-empty 'expected'"));
                }
                let expected = ExpectedText::new(values, self.use_regex).map_err(|e| {
                    DocumentError::invalid(name, format!("invalid 'expected' pattern: {}", e))
                })?;
                Recognition::Ocr {
                    expected,
                    roi: self.roi,
                    threshold: self.threshold,
                }
            }
            RecognitionKind::TemplateMatch => {
                let templates = self
                    .template
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default();
                if templates.is_empty() || templates.iter().any(|t| t.is_empty()) {
                    return Err(DocumentError::invalid(name, "TemplateMatch requires 'template'"));
                }
                Recognition::TemplateMatch {
                    templates,
                    roi: self.roi,
                    threshold: self.threshold,
                }
            }
        };

        let target = |doc: Option<TargetDocument>, field: &str| -> Result<Target, DocumentError> {
            doc.map(|t| t.into_target(name, field))
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let required_target =
            |doc: Option<TargetDocument>, field: &str| -> Result<Target, DocumentError> {
                doc.ok_or_else(|| {
                    DocumentError::invalid(name, format!("{} requires '{}'", action_kind, field))
                })?
                .into_target(name, field)
            };

        let button = self.button.unwrap_or(0);
        let action = match action_kind {
            ActionKind::DoNothing => Action::DoNothing,
            ActionKind::Click => Action::Click {
                target: target(self.target, "target")?,
                button,
            },
            ActionKind::DoubleClick => Action::DoubleClick {
                target: target(self.target, "target")?,
                button,
            },
            ActionKind::LongPress => Action::LongPress {
                target: target(self.target, "target")?,
                button,
                duration: self.duration,
            },
            ActionKind::Swipe => Action::Swipe {
                begin: required_target(self.begin, "begin")?,
                end: required_target(self.end, "end")?,
                duration: self
                    .duration
                    .ok_or_else(|| DocumentError::invalid(name, "Swipe requires 'duration'"))?,
            },
            ActionKind::InputText => Action::InputText {
                text: self
                    .text
                    .ok_or_else(|| DocumentError::invalid(name, "InputText requires 'text'"))?,
            },
            ActionKind::PressKey => Action::PressKey {
                key: self
                    .key
                    .ok_or_else(|| DocumentError::invalid(name, "PressKey requires 'key'"))?,
                long: self.long,
            },
            ActionKind::KeyCombo => Action::KeyCombo {
                keys: self
                    .keys
                    .ok_or_else(|| DocumentError::invalid(name, "KeyCombo requires 'keys'"))?,
            },
            ActionKind::Scroll => Action::Scroll {
                dx: self.dx.unwrap_or(0),
                dy: self.dy.unwrap_or(0),
            },
        };

        Ok(PipelineNode {
            recognition,
            action,
            next: self.next.map(OneOrMany::into_vec).unwrap_or_default(),
            timing: NodeTiming {
                timeout: self.timeout,
                rate_limit: self.rate_limit,
                pre_delay: self.pre_delay,
                post_delay: self.post_delay,
            },
        })
    }

    /// Build the document form of a node
    pub fn from_node(node: &PipelineNode) -> Self {
        let mut doc = NodeDocument {
            recognition: Some(node.recognition.kind().as_str().to_string()),
            action: Some(node.action.kind().as_str().to_string()),
            next: Some(OneOrMany::Many(node.next.clone())),
            timeout: node.timing.timeout,
            rate_limit: node.timing.rate_limit,
            pre_delay: node.timing.pre_delay,
            post_delay: node.timing.post_delay,
            ..NodeDocument::default()
        };

        match &node.recognition {
            Recognition::DirectHit => {}
            Recognition::Ocr {
                expected,
                roi,
                threshold,
            } => {
                doc.expected = Some(OneOrMany::Many(expected.values()));
                doc.use_regex = expected.uses_regex();
                doc.roi = *roi;
                doc.threshold = *threshold;
            }
            Recognition::TemplateMatch {
                templates,
                roi,
                threshold,
            } => {
                doc.template = Some(OneOrMany::Many(templates.clone()));
                doc.roi = *roi;
                doc.threshold = *threshold;
            }
        }

        let button = |b: u8| if b == 0 { None } else { Some(b) };
        match &node.action {
            Action::DoNothing => {}
            Action::Click { target, button: b } | Action::DoubleClick { target, button: b } => {
                doc.target = Some(TargetDocument::from_target(target));
                doc.button = button(*b);
            }
            Action::LongPress {
                target,
                button: b,
                duration,
            } => {
                doc.target = Some(TargetDocument::from_target(target));
                doc.button = button(*b);
                doc.duration = *duration;
            }
            Action::Swipe {
                begin,
                end,
                duration,
            } => {
                doc.begin = Some(TargetDocument::from_target(begin));
                doc.end = Some(TargetDocument::from_target(end));
                doc.duration = Some(*duration);
            }
            Action::InputText { text } => doc.text = Some(text.clone()),
            Action::PressKey { key, long } => {
                doc.key = Some(*key);
                doc.long = *long;
            }
            Action::KeyCombo { keys } => doc.keys = Some(keys.clone()),
            Action::Scroll { dx, dy } => {
                doc.dx = Some(*dx);
                doc.dy = Some(*dy);
            }
        }

        doc
    }
}
