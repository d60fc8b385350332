//! Text conditions for OCR recognition

use regex::Regex;

/// Pattern for matching detected text
#[derive(Debug, Clone)]
pub enum TextPattern {
    /// Substring match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl TextPattern {
    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextPattern::Simple(pattern) => text.contains(pattern.as_str()),
            TextPattern::Regex(regex) => regex.is_match(text),
        }
    }

    /// The pattern as written in the document
    pub fn as_str(&self) -> &str {
        match self {
            TextPattern::Simple(s) => s,
            TextPattern::Regex(r) => r.as_str(),
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, TextPattern::Regex(_))
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.is_regex() == other.is_regex() && self.as_str() == other.as_str()
    }
}

/// The `expected` field of an OCR node: one or more alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedText {
    patterns: Vec<TextPattern>,
}

impl ExpectedText {
    /// Build from document values; every value is compiled when `use_regex` is set
    pub fn new(values: Vec<String>, use_regex: bool) -> Result<Self, regex::Error> {
        let patterns = values
            .into_iter()
            .map(|value| {
                if use_regex {
                    Regex::new(&value).map(TextPattern::Regex)
                } else {
                    Ok(TextPattern::Simple(value))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// A single substring alternative
    pub fn simple(value: impl Into<String>) -> Self {
        Self {
            patterns: vec![TextPattern::Simple(value.into())],
        }
    }

    /// True when any alternative matches
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn uses_regex(&self) -> bool {
        self.patterns.iter().any(TextPattern::is_regex)
    }

    pub fn values(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }

    pub fn patterns(&self) -> &[TextPattern] {
        &self.patterns
    }
}
