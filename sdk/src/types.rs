//! Document types shared between the engine and store implementations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A document returned by a similarity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievedDocument {
    /// Full document text
    pub text: String,

    /// Free-form metadata (e.g. `source`)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RetrievedDocument {
    /// Create a document without metadata
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the `source` metadata entry, if any
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builder() {
        let doc = RetrievedDocument::new("body").with_metadata("source", "guide.md");
        assert_eq!(doc.text, "body");
        assert_eq!(doc.source(), Some("guide.md"));
    }

    #[test]
    fn test_metadata_defaults_when_missing() {
        let doc: RetrievedDocument = serde_json::from_str(r#"{"text": "only text"}"#).unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.source(), None);
    }
}
