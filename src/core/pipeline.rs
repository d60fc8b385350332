//! Pipeline graph
//!
//! A [`PipelineGraph`] is an immutable, validated set of named nodes. Every
//! `next` entry and every node-name target resolves to a node in the same
//! graph; loading fails as a whole otherwise.

use crate::core::{
    document::NodeDocument,
    error::DocumentError,
    node::{Action, PipelineNode, Recognition, Target},
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A validated pipeline definition
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineGraph {
    nodes: BTreeMap<String, PipelineNode>,
}

impl PipelineGraph {
    /// Build a graph from nodes, validating references and per-node consistency
    pub fn new(nodes: BTreeMap<String, PipelineNode>) -> Result<Self, DocumentError> {
        let graph = Self { nodes };
        graph.validate()?;
        Ok(graph)
    }

    /// Build from `(name, node)` pairs
    pub fn from_nodes<I, S>(nodes: I) -> Result<Self, DocumentError>
    where
        I: IntoIterator<Item = (S, PipelineNode)>,
        S: Into<String>,
    {
        Self::new(nodes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Parse a pipeline document
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build from an already parsed document
    pub fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        let object = match value {
            serde_json::Value::Object(object) => object,
            _ => return Err(DocumentError::NotAnObject),
        };
        if object.is_empty() {
            return Err(DocumentError::Empty);
        }

        let mut nodes = BTreeMap::new();
        for (name, body) in object {
            if !body.is_object() {
                return Err(DocumentError::invalid(&name, "node must be a JSON object"));
            }
            let doc = NodeDocument::deserialize(body)
                .map_err(|e| DocumentError::invalid(&name, e.to_string()))?;
            let node = doc.into_node(&name)?;
            nodes.insert(name, node);
        }

        Self::new(nodes)
    }

    /// Load a pipeline document from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Document form of the graph
    pub fn to_value(&self) -> serde_json::Value {
        let object: serde_json::Map<String, serde_json::Value> = self
            .nodes
            .iter()
            .map(|(name, node)| {
                let doc = NodeDocument::from_node(node);
                let value = serde_json::to_value(doc).unwrap_or(serde_json::Value::Null);
                (name.clone(), value)
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Pretty-printed pipeline document
    pub fn to_json(&self) -> String {
        // Serializing a `Value` cannot fail
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_default()
    }

    pub fn node(&self, name: &str) -> Option<&PipelineNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &PipelineNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The only node no `next` list points at, if there is exactly one
    pub fn default_entry(&self) -> Option<&str> {
        let referenced: BTreeSet<&str> = self
            .nodes
            .values()
            .flat_map(|node| node.next.iter().map(String::as_str))
            .collect();

        let mut roots = self.node_names().filter(|name| !referenced.contains(name));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => None,
        }
    }

    /// Check references and per-node consistency
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.nodes.is_empty() {
            return Err(DocumentError::Empty);
        }

        for (name, node) in &self.nodes {
            if name.is_empty() {
                return Err(DocumentError::invalid(name, "node name cannot be empty"));
            }

            for target in &node.next {
                if !self.nodes.contains_key(target) {
                    return Err(DocumentError::DanglingReference {
                        node: name.clone(),
                        target: target.clone(),
                    });
                }
            }

            for target in node.action.targets() {
                match target {
                    Target::Node(other) if !self.nodes.contains_key(other) => {
                        return Err(DocumentError::DanglingReference {
                            node: name.clone(),
                            target: other.clone(),
                        });
                    }
                    Target::MatchRegion if !node.recognition.yields_region() => {
                        return Err(DocumentError::invalid(
                            name,
                            format!(
                                "{} targets the matched region but {} recognition yields none",
                                node.action.kind(),
                                node.recognition.kind()
                            ),
                        ));
                    }
                    _ => {}
                }
            }

            Self::validate_node(name, node)?;
        }

        Ok(())
    }

    fn validate_node(name: &str, node: &PipelineNode) -> Result<(), DocumentError> {
        match &node.recognition {
            Recognition::DirectHit => {}
            Recognition::Ocr {
                expected, threshold, ..
            } => {
                if expected.is_empty() {
                    return Err(DocumentError::invalid(name, "OCR requires non-empty 'expected'"));
                }
                check_threshold(name, *threshold)?;
            }
            Recognition::TemplateMatch {
                templates,
                threshold,
                ..
            } => {
                if templates.is_empty() || templates.iter().any(String::is_empty) {
                    return Err(DocumentError::invalid(name, "TemplateMatch requires 'template'"));
                }
                check_threshold(name, *threshold)?;
            }
        }

        match &node.action {
            Action::KeyCombo { keys } if keys.is_empty() => {
                Err(DocumentError::invalid(name, "KeyCombo requires at least one key"))
            }
            Action::Scroll { dx: 0, dy: 0 } => {
                Err(DocumentError::invalid(name, "Scroll requires a non-zero 'dx' or 'dy'"))
            }
            Action::Click { button, .. }
            | Action::DoubleClick { button, .. }
            | Action::LongPress { button, .. }
                if *button > 2 =>
            {
                Err(DocumentError::invalid(
                    name,
                    format!("button must be 0, 1 or 2, got {}", button),
                ))
            }
            _ => Ok(()),
        }
    }
}

fn check_threshold(node: &str, threshold: Option<f64>) -> Result<(), DocumentError> {
    match threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => Err(DocumentError::invalid(
            node,
            format!("threshold must be within 0..=1, got {}", t),
        )),
        _ => Ok(()),
    }
}
