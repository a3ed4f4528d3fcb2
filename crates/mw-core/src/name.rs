//! Names of definitions and references.
//!
//! A [`Name`] is a possibly multi-part, dot separated identifier such as
//! `page.header.title`.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Name {
    segments: Vec<String>,
}

impl Name {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn parse(text: &str) -> Self {
        Self {
            segments: text
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments.iter().take(len).cloned().collect(),
        }
    }

    pub fn starts_with(&self, other: &Name) -> bool {
        self.segments.len() >= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    pub fn joined(&self) -> String {
        self.segments.iter().join(".")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.iter().join("."))
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::parse(text)
    }
}

/// Identifiers that name a position in the definition graph or context
/// rather than a definition, recognized before the lookup cascade runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialName {
    This,
    Def,
    Owner,
    Container,
    Super,
    Sub,
    Site,
    Core,
}

impl SpecialName {
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "this" => Some(SpecialName::This),
            "def" => Some(SpecialName::Def),
            "owner" => Some(SpecialName::Owner),
            "container" => Some(SpecialName::Container),
            "super" => Some(SpecialName::Super),
            "sub" => Some(SpecialName::Sub),
            "site" => Some(SpecialName::Site),
            "core" => Some(SpecialName::Core),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpecialName::This => "this",
            SpecialName::Def => "def",
            SpecialName::Owner => "owner",
            SpecialName::Container => "container",
            SpecialName::Super => "super",
            SpecialName::Sub => "sub",
            SpecialName::Site => "site",
            SpecialName::Core => "core",
        }
    }

    /// `this` and `def` construct a live object bound to the current context.
    pub fn is_self_reference(self) -> bool {
        matches!(self, SpecialName::This | SpecialName::Def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_dotted_names() {
        let name = Name::parse("page.header.title");
        assert_eq!(name.len(), 3);
        assert_eq!(name.first(), Some("page"));
        assert_eq!(name.last(), Some("title"));
        assert_eq!(name.to_string(), "page.header.title");
    }

    #[test]
    fn prefix_and_starts_with_agree() {
        let name = Name::parse("a.b.c");
        assert!(name.starts_with(&name.prefix(2)));
        assert!(!name.prefix(2).starts_with(&name));
    }

    #[test]
    fn special_names_are_recognized() {
        assert_eq!(SpecialName::parse("super"), Some(SpecialName::Super));
        assert_eq!(SpecialName::parse("superb"), None);
        assert!(SpecialName::This.is_self_reference());
    }
}
