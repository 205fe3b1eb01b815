//! TextSegment: a verbatim span of contract text stored under one category

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The relationship type linking a segment to its category.
pub const BELONGS_TO: &str = "BELONGS_TO";

/// Unique identifier for a segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Create a new random SegmentId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a SegmentId from an existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A span of contract text, its embedding, and the category it BELONGS_TO.
///
/// Segments are append-only: stores never update text, embedding or
/// category after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub id: SegmentId,
    /// Target of the BELONGS_TO relationship
    pub category: String,
    /// Verbatim contract text
    pub text: String,
    pub embedding: Vec<f32>,
    /// Per-contract insertion order; defines "storage order"
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl TextSegment {
    pub fn new(
        category: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        sequence: u64,
    ) -> Self {
        Self {
            id: SegmentId::new(),
            category: category.into(),
            text: text.into(),
            embedding,
            sequence,
            created_at: Utc::now(),
        }
    }

    /// Dimensionality of the stored embedding
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// A segment returned by a similarity query, with its cosine score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment {
    pub segment: TextSegment,
    pub score: f32,
}

/// Join segment texts with a blank line, in the order given.
pub fn join_segment_text(segments: &[TextSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_ids_are_unique() {
        let a = TextSegment::new("Termination", "text", vec![1.0], 0);
        let b = TextSegment::new("Termination", "text", vec![1.0], 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn join_uses_blank_line_separator() {
        let segments = vec![
            TextSegment::new("Benefits", "First.", vec![1.0], 0),
            TextSegment::new("Benefits", "Second.", vec![1.0], 1),
        ];
        assert_eq!(join_segment_text(&segments), "First.\n\nSecond.");
    }

    #[test]
    fn join_of_nothing_is_empty() {
        assert_eq!(join_segment_text(&[]), "");
    }
}
