//! Network element model.
//!
//! Network elements are the capacity-limited pieces of infrastructure a
//! train occupies while it runs: plain tracks, junctions, and platforms.
//! Each has a kind and a capacity (maximum simultaneous trains).

use serde::{Deserialize, Serialize};

/// A piece of rail infrastructure with limited capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkElement {
    /// Unique element identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Element classification.
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: ElementKind,
    /// Maximum number of trains occupying the element at any instant (>= 1).
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    1
}

/// Element classification.
///
/// Determines the minimum traversal duration used by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Open line between two points.
    #[default]
    Track,
    /// Switch area where routes cross or merge.
    Junction,
    /// Station platform (dwell location).
    Platform,
}

impl ElementKind {
    /// Lower-case label used in payloads and messages.
    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Track => "track",
            ElementKind::Junction => "junction",
            ElementKind::Platform => "platform",
        }
    }
}

impl NetworkElement {
    /// Creates a single-capacity element of the given kind.
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind,
            capacity: 1,
        }
    }

    pub fn track(id: impl Into<String>) -> Self {
        Self::new(id, ElementKind::Track)
    }

    pub fn junction(id: impl Into<String>) -> Self {
        Self::new(id, ElementKind::Junction)
    }

    pub fn platform(id: impl Into<String>) -> Self {
        Self::new(id, ElementKind::Platform)
    }

    /// Sets the element name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Whether trains must be totally ordered on this element.
    #[inline]
    pub fn is_exclusive(&self) -> bool {
        self.capacity == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_builder() {
        let e = NetworkElement::platform("P5")
            .with_name("Platform 5")
            .with_capacity(2);

        assert_eq!(e.id, "P5");
        assert_eq!(e.name, "Platform 5");
        assert_eq!(e.kind, ElementKind::Platform);
        assert_eq!(e.capacity, 2);
        assert!(!e.is_exclusive());
    }

    #[test]
    fn test_element_kinds() {
        assert_eq!(NetworkElement::track("A").kind, ElementKind::Track);
        assert_eq!(NetworkElement::junction("J").kind, ElementKind::Junction);
        assert!(NetworkElement::track("A").is_exclusive());
        assert_eq!(ElementKind::Junction.label(), "junction");
    }

    #[test]
    fn test_element_payload_shape() {
        let json = r#"{"id":"B","capacity":2,"type":"platform"}"#;
        let e: NetworkElement = serde_json::from_str(json).unwrap();
        assert_eq!(e.kind, ElementKind::Platform);
        assert_eq!(e.capacity, 2);

        let defaulted: NetworkElement = serde_json::from_str(r#"{"id":"C"}"#).unwrap();
        assert_eq!(defaulted.kind, ElementKind::Track);
        assert_eq!(defaulted.capacity, 1);
    }
}
