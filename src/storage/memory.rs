//! In-memory storage backend

use super::traits::{check_dimensions, rank_segments, CategoryStore, StorageError, StorageResult};
use crate::graph::{Category, ContractId, ScoredSegment, SegmentId, TextSegment};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// One contract's categories and segments.
#[derive(Debug, Default)]
struct Partition {
    /// Keyed by name; BTreeMap keeps names sorted
    categories: BTreeMap<String, Category>,
    /// Append-only, in storage order
    segments: Vec<TextSegment>,
}

impl Partition {
    fn dimensions(&self) -> Option<usize> {
        self.segments.first().map(TextSegment::dimensions)
    }
}

/// In-memory category store.
///
/// Thread-safe via DashMap, one entry per contract so writers to different
/// contracts never contend. Nothing survives the process; use
/// `SqliteStore` for anything a later `ask` must see.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    partitions: DashMap<ContractId, Partition>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CategoryStore for InMemoryStore {
    fn upsert_category(&self, contract: &ContractId, name: &str) -> StorageResult<bool> {
        let mut partition = self.partitions.entry(contract.clone()).or_default();
        if partition.categories.contains_key(name) {
            return Ok(false);
        }
        partition
            .categories
            .insert(name.to_string(), Category::new(name));
        Ok(true)
    }

    fn list_category_names(&self, contract: &ContractId) -> StorageResult<Vec<String>> {
        Ok(self
            .partitions
            .get(contract)
            .map(|p| p.categories.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn category_count(&self, contract: &ContractId) -> StorageResult<usize> {
        Ok(self
            .partitions
            .get(contract)
            .map_or(0, |p| p.categories.len()))
    }

    fn create_segment(
        &self,
        contract: &ContractId,
        category: &str,
        text: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<TextSegment> {
        let mut partition = self
            .partitions
            .get_mut(contract)
            .ok_or_else(|| StorageError::CategoryNotFound(category.to_string()))?;
        if !partition.categories.contains_key(category) {
            return Err(StorageError::CategoryNotFound(category.to_string()));
        }
        check_dimensions(partition.dimensions(), &embedding)?;

        let sequence = partition.segments.len() as u64;
        let segment = TextSegment::new(category, text, embedding, sequence);
        partition.segments.push(segment.clone());
        Ok(segment)
    }

    fn list_segments_for_category(
        &self,
        contract: &ContractId,
        category: &str,
    ) -> StorageResult<Vec<TextSegment>> {
        Ok(self
            .partitions
            .get(contract)
            .map(|p| {
                p.segments
                    .iter()
                    .filter(|s| s.category == category)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn nearest_segments(
        &self,
        contract: &ContractId,
        query: &[f32],
        k: usize,
    ) -> StorageResult<Vec<ScoredSegment>> {
        let Some(partition) = self.partitions.get(contract) else {
            return Ok(Vec::new());
        };
        if let Some(expected) = partition.dimensions() {
            check_dimensions(Some(expected), query)?;
        }
        Ok(rank_segments(partition.segments.iter().cloned(), query, k))
    }

    fn category_of(
        &self,
        contract: &ContractId,
        segment: &SegmentId,
    ) -> StorageResult<Option<String>> {
        Ok(self.partitions.get(contract).and_then(|p| {
            p.segments
                .iter()
                .find(|s| &s.id == segment)
                .map(|s| s.category.clone())
        }))
    }

    fn segment_count(&self, contract: &ContractId) -> StorageResult<usize> {
        Ok(self.partitions.get(contract).map_or(0, |p| p.segments.len()))
    }

    fn clear_contract(&self, contract: &ContractId) -> StorageResult<bool> {
        Ok(self
            .partitions
            .remove(contract)
            .map_or(false, |(_, p)| !p.categories.is_empty()))
    }
}
