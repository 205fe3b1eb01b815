//! Storage trait definitions

use crate::embedding::cosine_similarity;
use crate::graph::{ContractId, ScoredSegment, SegmentId, TextSegment};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Embedding dimension mismatch: contract uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Refusing to store an empty embedding")]
    EmptyEmbedding,

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Graph-shaped persistence for categories and segments.
///
/// Holds `Category ←BELONGS_TO← TextSegment` per contract plus a
/// similarity index over segment embeddings. Every operation is scoped by
/// `ContractId`; partitions never see each other's data.
///
/// Implementations must be thread-safe (Send + Sync) and must make a write
/// visible to every read issued after it returns.
pub trait CategoryStore: Send + Sync {
    // === Category Operations ===

    /// Create the category if the name is unseen. Returns true when created.
    fn upsert_category(&self, contract: &ContractId, name: &str) -> StorageResult<bool>;

    /// All category names, sorted by name.
    fn list_category_names(&self, contract: &ContractId) -> StorageResult<Vec<String>>;

    /// Number of categories in the contract.
    fn category_count(&self, contract: &ContractId) -> StorageResult<usize>;

    // === Segment Operations ===

    /// Create a segment linked BELONGS_TO an existing category.
    fn create_segment(
        &self,
        contract: &ContractId,
        category: &str,
        text: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<TextSegment>;

    /// Segments of one category in storage order.
    fn list_segments_for_category(
        &self,
        contract: &ContractId,
        category: &str,
    ) -> StorageResult<Vec<TextSegment>>;

    /// The `k` segments most similar to `query`, best first.
    fn nearest_segments(
        &self,
        contract: &ContractId,
        query: &[f32],
        k: usize,
    ) -> StorageResult<Vec<ScoredSegment>>;

    /// Name of the category a segment BELONGS_TO.
    fn category_of(
        &self,
        contract: &ContractId,
        segment: &SegmentId,
    ) -> StorageResult<Option<String>>;

    /// Number of segments in the contract.
    fn segment_count(&self, contract: &ContractId) -> StorageResult<usize>;

    // === Partition Operations ===

    /// Remove every category and segment of a contract.
    fn clear_contract(&self, contract: &ContractId) -> StorageResult<bool>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: CategoryStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Validate an embedding against the contract's established dimensionality.
pub(crate) fn check_dimensions(expected: Option<usize>, embedding: &[f32]) -> StorageResult<()> {
    if embedding.is_empty() {
        return Err(StorageError::EmptyEmbedding);
    }
    match expected {
        Some(expected) if expected != embedding.len() => Err(StorageError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        }),
        _ => Ok(()),
    }
}

/// Exhaustive cosine ranking: score every segment, keep the best `k`.
///
/// Sorting is stable, so equal scores keep storage order.
pub(crate) fn rank_segments(
    segments: impl IntoIterator<Item = TextSegment>,
    query: &[f32],
    k: usize,
) -> Vec<ScoredSegment> {
    if k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<ScoredSegment> = segments
        .into_iter()
        .map(|segment| {
            let score = cosine_similarity(query, &segment.embedding);
            ScoredSegment { segment, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_by_descending_score() {
        let segments = vec![
            TextSegment::new("A", "far", vec![0.0, 1.0], 0),
            TextSegment::new("B", "near", vec![1.0, 0.1], 1),
            TextSegment::new("C", "mid", vec![1.0, 1.0], 2),
        ];
        let ranked = rank_segments(segments, &[1.0, 0.0], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].segment.text, "near");
        assert_eq!(ranked[1].segment.text, "mid");
    }

    #[test]
    fn rank_with_zero_k_is_empty() {
        let segments = vec![TextSegment::new("A", "x", vec![1.0], 0)];
        assert!(rank_segments(segments, &[1.0], 0).is_empty());
    }

    #[test]
    fn dimension_check() {
        assert!(check_dimensions(None, &[1.0, 2.0]).is_ok());
        assert!(check_dimensions(Some(2), &[1.0, 2.0]).is_ok());
        assert!(matches!(
            check_dimensions(Some(3), &[1.0, 2.0]),
            Err(StorageError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            check_dimensions(None, &[]),
            Err(StorageError::EmptyEmbedding)
        ));
    }
}
