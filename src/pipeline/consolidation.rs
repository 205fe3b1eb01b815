//! Entity consolidation: incremental category extraction across chunks
//!
//! A sequential state machine over chunks. Chunk 0 asks the model for broad
//! categories with no context; every later chunk first re-reads the full
//! category list from the store and asks the model to map onto it. Each
//! chunk's writes complete before the next chunk's read, so the list a chunk
//! sees always contains every category created before it.
//!
//! The category cap is enforced here rather than trusted to the model: a
//! new name proposed once the contract is at the cap is re-homed to the
//! category of the most similar stored segment.

use super::decode::{decode_extraction, ExtractedPair};
use super::prompts;
use crate::config::DEFAULT_MAX_CATEGORIES;
use crate::embedding::Embedder;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::graph::ContractId;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::storage::CategoryStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which consolidation strategy applies to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkState {
    pub index: usize,
    pub first_chunk: bool,
}

impl ChunkState {
    pub fn for_index(index: usize) -> Self {
        Self {
            index,
            first_chunk: index == 0,
        }
    }
}

/// What happened to one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkReport {
    pub index: usize,
    pub first_chunk: bool,
    /// Categories offered to the model as context (empty for chunk 0)
    pub context_categories: Vec<String>,
    /// Segments stored
    pub segments: usize,
    /// Categories created by this chunk
    pub created: Vec<String>,
    /// (proposed, resolved) names re-homed because of the cap
    pub rehomed: Vec<(String, String)>,
    /// Pairs with a blank name or text
    pub skipped: usize,
}

/// Where a proposed category name ends up.
#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Existing(String),
    New(String),
    Rehomed { proposed: String, into: String },
}

impl Resolution {
    fn name(&self) -> &str {
        match self {
            Resolution::Existing(name) | Resolution::New(name) => name,
            Resolution::Rehomed { into, .. } => into,
        }
    }
}

pub struct ConsolidationEngine {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CategoryStore>,
    max_categories: usize,
    temperature: f32,
}

impl ConsolidationEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CategoryStore>,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            max_categories: DEFAULT_MAX_CATEGORIES,
            temperature: 0.1,
        }
    }

    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Process every chunk in order; the first failure aborts the run.
    pub async fn run(
        &self,
        contract: &ContractId,
        chunks: &[String],
    ) -> AnalyzerResult<Vec<ChunkReport>> {
        let mut reports = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let report = self
                .process_chunk(contract, ChunkState::for_index(index), chunk)
                .await?;
            info!(
                contract = %contract,
                chunk = index,
                segments = report.segments,
                created = report.created.len(),
                rehomed = report.rehomed.len(),
                "chunk consolidated"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// One model round-trip plus its store writes.
    pub async fn process_chunk(
        &self,
        contract: &ContractId,
        state: ChunkState,
        chunk: &str,
    ) -> AnalyzerResult<ChunkReport> {
        let mut report = ChunkReport {
            index: state.index,
            first_chunk: state.first_chunk,
            ..Default::default()
        };

        let system = if state.first_chunk {
            prompts::initial_extraction(self.max_categories)
        } else {
            // Re-read every time: the store, not this engine, owns the list.
            report.context_categories = self.store.list_category_names(contract)?;
            prompts::subsequent_extraction(&report.context_categories, self.max_categories)
        };

        let request = CompletionRequest::new(system, chunk, self.temperature).expecting_json();
        let response = self.llm.complete(&request).await?;
        let pairs = decode_extraction(&response)?;
        debug!(chunk = state.index, pairs = pairs.len(), "extraction decoded");

        for pair in pairs {
            self.persist_pair(contract, chunk, pair, &mut report).await?;
        }
        Ok(report)
    }

    async fn persist_pair(
        &self,
        contract: &ContractId,
        chunk: &str,
        pair: ExtractedPair,
        report: &mut ChunkReport,
    ) -> AnalyzerResult<()> {
        if pair.entity_name.trim().is_empty() || pair.relevant_text.trim().is_empty() {
            debug!(chunk = report.index, "skipping pair with blank category or text");
            report.skipped += 1;
            return Ok(());
        }
        if !chunk.contains(pair.relevant_text.as_str()) {
            debug!(
                chunk = report.index,
                category = %pair.entity_name,
                "relevant_text is not a verbatim substring of the chunk"
            );
        }

        let embedding = self.embedder.embed(&pair.relevant_text).await?;
        let resolution = self.resolve_category(contract, &pair.entity_name, &embedding)?;
        let category = resolution.name().to_string();

        if self.store.upsert_category(contract, &category)? {
            report.created.push(category.clone());
        }
        self.store
            .create_segment(contract, &category, &pair.relevant_text, embedding)?;
        report.segments += 1;

        match resolution {
            Resolution::Rehomed { proposed, into } => {
                warn!(
                    contract = %contract,
                    proposed = %proposed,
                    into = %into,
                    max = self.max_categories,
                    "category cap reached, consolidated into existing category"
                );
                report.rehomed.push((proposed, into));
            }
            Resolution::New(name) => debug!(category = %name, "new category"),
            Resolution::Existing(_) => {}
        }
        Ok(())
    }

    /// Map a proposed name onto the store's categories, honouring the cap.
    fn resolve_category(
        &self,
        contract: &ContractId,
        proposed: &str,
        embedding: &[f32],
    ) -> AnalyzerResult<Resolution> {
        let known = self.store.list_category_names(contract)?;
        if known.iter().any(|name| name == proposed) {
            return Ok(Resolution::Existing(proposed.to_string()));
        }
        if known.len() < self.max_categories {
            return Ok(Resolution::New(proposed.to_string()));
        }

        let nearest = self.store.nearest_segments(contract, embedding, 1)?;
        match nearest.into_iter().next() {
            Some(hit) => Ok(Resolution::Rehomed {
                proposed: proposed.to_string(),
                into: hit.segment.category,
            }),
            None => Err(AnalyzerError::CategoryCap {
                proposed: proposed.to_string(),
                max: self.max_categories,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::llm::MockLanguageModel;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;

    /// Embeds by counting a few legal keywords.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let lower = text.to_lowercase();
            Ok(["salary", "vacation", "terminate", "law"]
                .iter()
                .map(|k| lower.matches(k).count() as f32)
                .chain(std::iter::once(0.01))
                .collect())
        }
    }

    fn engine(llm: Arc<MockLanguageModel>, store: Arc<InMemoryStore>) -> ConsolidationEngine {
        ConsolidationEngine::new(llm, Arc::new(KeywordEmbedder), store)
    }

    #[test]
    fn chunk_state_marks_only_first() {
        assert!(ChunkState::for_index(0).first_chunk);
        assert!(!ChunkState::for_index(3).first_chunk);
    }

    #[tokio::test]
    async fn first_chunk_creates_categories_without_context() {
        let llm = Arc::new(MockLanguageModel::new().with_response(
            r#"{"entities": [
                {"entity_name": "Compensation", "relevant_text": "salary of $60,000"},
                {"entity_name": "Benefits", "relevant_text": "20 days vacation"}
            ]}"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let contract = ContractId::from_string("c");

        let report = engine(llm.clone(), store.clone())
            .process_chunk(&contract, ChunkState::for_index(0), "salary of $60,000. 20 days vacation.")
            .await
            .unwrap();

        assert_eq!(report.segments, 2);
        assert_eq!(report.created, vec!["Compensation", "Benefits"]);
        assert!(report.context_categories.is_empty());
        assert!(!llm.requests()[0].system.contains("Existing categories"));
        assert_eq!(
            store.list_category_names(&contract).unwrap(),
            vec!["Benefits", "Compensation"]
        );
    }

    #[tokio::test]
    async fn later_chunks_see_all_previous_categories() {
        let llm = Arc::new(
            MockLanguageModel::new()
                .with_response(r#"[{"entity_name": "Compensation", "relevant_text": "salary"}]"#)
                .with_response(r#"[{"entity_name": "Termination", "relevant_text": "terminate"}]"#)
                .with_response(r#"[{"entity_name": "Governing Law", "relevant_text": "law"}]"#),
        );
        let store = Arc::new(InMemoryStore::new());
        let contract = ContractId::from_string("c");
        let chunks = vec!["salary".to_string(), "terminate".to_string(), "law".to_string()];

        let reports = engine(llm.clone(), store).run(&contract, &chunks).await.unwrap();

        assert_eq!(reports[1].context_categories, vec!["Compensation"]);
        assert_eq!(reports[2].context_categories, vec!["Compensation", "Termination"]);
        let requests = llm.requests();
        assert!(requests[2].system.contains("Existing categories: Compensation, Termination"));
        assert_eq!(requests[2].user, "law");
    }

    #[tokio::test]
    async fn cap_rehomes_new_names_to_nearest_category() {
        let llm = Arc::new(
            MockLanguageModel::new()
                .with_response(
                    r#"[{"entity_name": "Compensation", "relevant_text": "salary"},
                        {"entity_name": "Benefits", "relevant_text": "vacation"}]"#,
                )
                .with_response(r#"[{"entity_name": "Salary", "relevant_text": "annual salary review"}]"#),
        );
        let store = Arc::new(InMemoryStore::new());
        let contract = ContractId::from_string("c");
        let chunks = vec!["salary vacation".to_string(), "annual salary review".to_string()];

        let reports = engine(llm, store.clone())
            .with_max_categories(2)
            .run(&contract, &chunks)
            .await
            .unwrap();

        assert_eq!(
            reports[1].rehomed,
            vec![("Salary".to_string(), "Compensation".to_string())]
        );
        assert_eq!(store.category_count(&contract).unwrap(), 2);
        let comp = store.list_segments_for_category(&contract, "Compensation").unwrap();
        assert_eq!(comp.len(), 2);
        assert_eq!(comp[1].text, "annual salary review");
    }

    #[tokio::test]
    async fn cap_of_zero_with_empty_store_is_an_error() {
        let llm = Arc::new(
            MockLanguageModel::new()
                .with_response(r#"[{"entity_name": "Benefits", "relevant_text": "vacation"}]"#),
        );
        let store = Arc::new(InMemoryStore::new());
        let err = engine(llm, store)
            .with_max_categories(0)
            .process_chunk(&ContractId::from_string("c"), ChunkState::for_index(0), "vacation")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::CategoryCap { max: 0, .. }));
    }

    #[tokio::test]
    async fn blank_pairs_are_skipped() {
        let llm = Arc::new(MockLanguageModel::new().with_response(
            r#"[{"entity_name": " ", "relevant_text": "salary"},
                {"entity_name": "Compensation", "relevant_text": ""},
                {"entity_name": "Compensation", "relevant_text": "salary"}]"#,
        ));
        let store = Arc::new(InMemoryStore::new());
        let contract = ContractId::from_string("c");
        let report = engine(llm, store.clone())
            .process_chunk(&contract, ChunkState::for_index(0), "salary")
            .await
            .unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.segments, 1);
        assert_eq!(store.segment_count(&contract).unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_output_aborts_the_run() {
        let llm = Arc::new(
            MockLanguageModel::new()
                .with_response(r#"[{"entity_name": "Compensation", "relevant_text": "salary"}]"#)
                .with_response("Sorry, I cannot help with that."),
        );
        let store = Arc::new(InMemoryStore::new());
        let chunks = vec!["salary".to_string(), "more".to_string(), "never read".to_string()];

        let err = engine(llm.clone(), store)
            .run(&ContractId::from_string("c"), &chunks)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::ModelParse(_)));
        assert_eq!(llm.call_count(), 2);
    }
}
