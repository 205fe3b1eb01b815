//! Contract analyzer facade
//!
//! Binds the pipeline stages to one contract partition of a store. The
//! three operations exposed to callers are [`ContractAnalyzer::process_contract`],
//! [`ContractAnalyzer::answer_question`] and
//! [`ContractAnalyzer::draft_negotiation_email`].

use crate::config::AnalyzerConfig;
use crate::embedding::Embedder;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::graph::{ContractExplanation, ContractId};
use crate::llm::LanguageModel;
use crate::pipeline::{
    self, chunk_text, ChunkReport, ConsolidationEngine, ExplanationSynthesizer, RetrievalEngine,
    RetrievalOutcome,
};
use crate::storage::CategoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A category and how many segments it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub segments: usize,
}

/// Category names with their segment counts, sorted by name.
///
/// Reads the store only, so it needs no model or embedder.
pub fn category_summaries(
    store: &dyn CategoryStore,
    contract: &ContractId,
) -> AnalyzerResult<Vec<CategorySummary>> {
    let names = store.list_category_names(contract)?;
    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let segments = store.list_segments_for_category(contract, &name)?.len();
        summaries.push(CategorySummary { name, segments });
    }
    Ok(summaries)
}

pub struct ContractAnalyzer {
    contract: ContractId,
    config: AnalyzerConfig,
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CategoryStore>,
}

impl ContractAnalyzer {
    pub fn new(
        contract: ContractId,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CategoryStore>,
    ) -> Self {
        Self {
            contract,
            config: AnalyzerConfig::default(),
            llm,
            embedder,
            store,
        }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Chunk, consolidate and explain a contract.
    ///
    /// Categories and segments accumulate in the bound partition; clear it
    /// first to re-ingest from scratch. Explanations are ordered by name.
    pub async fn process_contract(&self, text: &str) -> AnalyzerResult<Vec<ContractExplanation>> {
        let reports = self.consolidate(text).await?;
        let created: usize = reports.iter().map(|r| r.created.len()).sum();
        let rehomed: usize = reports.iter().map(|r| r.rehomed.len()).sum();
        info!(
            contract = %self.contract,
            chunks = reports.len(),
            created,
            rehomed,
            "consolidation finished"
        );

        ExplanationSynthesizer::new(self.llm.clone(), self.store.clone())
            .with_temperature(self.config.explanation_temperature)
            .explain_all(&self.contract)
            .await
    }

    /// Run only the chunking and consolidation stages.
    pub async fn consolidate(&self, text: &str) -> AnalyzerResult<Vec<ChunkReport>> {
        if text.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput("contract text is empty".into()));
        }

        let chunks = chunk_text(text, self.config.chunk_size);
        info!(
            contract = %self.contract,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "processing contract"
        );

        ConsolidationEngine::new(self.llm.clone(), self.embedder.clone(), self.store.clone())
            .with_max_categories(self.config.max_categories)
            .with_temperature(self.config.extraction_temperature)
            .run(&self.contract, &chunks)
            .await
    }

    /// Answer a question from the stored contract, or return the fixed
    /// advisory when nothing relevant is stored.
    pub async fn answer_question(&self, question: &str) -> AnalyzerResult<String> {
        self.retrieval_engine().answer(&self.contract, question).await
    }

    /// The retrieval step of [`Self::answer_question`] without the model call.
    pub async fn retrieve(&self, question: &str) -> AnalyzerResult<RetrievalOutcome> {
        self.retrieval_engine().retrieve(&self.contract, question).await
    }

    pub async fn draft_negotiation_email(
        &self,
        accepted: &str,
        rejected: &str,
        countered: &str,
    ) -> AnalyzerResult<String> {
        pipeline::draft_negotiation_email(
            self.llm.as_ref(),
            accepted,
            rejected,
            countered,
            self.config.email_temperature,
        )
        .await
    }

    /// Category names with their segment counts, sorted by name.
    pub fn categories(&self) -> AnalyzerResult<Vec<CategorySummary>> {
        category_summaries(self.store.as_ref(), &self.contract)
    }

    /// Drop every category and segment of the bound contract.
    pub fn clear(&self) -> AnalyzerResult<bool> {
        Ok(self.store.clear_contract(&self.contract)?)
    }

    fn retrieval_engine(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.llm.clone(), self.embedder.clone(), self.store.clone())
            .with_temperature(self.config.answer_temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::llm::MockLanguageModel;
    use crate::pipeline::NO_MATCH_ANSWER;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, text.len() as f32 / 100.0])
        }
    }

    fn analyzer(llm: Arc<MockLanguageModel>, store: Arc<InMemoryStore>) -> ContractAnalyzer {
        ContractAnalyzer::new(ContractId::from_string("lease"), llm, Arc::new(LengthEmbedder), store)
    }

    #[tokio::test]
    async fn process_contract_returns_explanations_by_name() {
        let llm = Arc::new(
            MockLanguageModel::new()
                .with_response(
                    r#"[{"entity_name": "Rent", "relevant_text": "Rent is $1,000 per month."},
                        {"entity_name": "Deposit", "relevant_text": "A deposit of $2,000."}]"#,
                )
                .with_response(r#"{"meaning": "Deposit terms.", "counters": []}"#)
                .with_response(r#"{"meaning": "Rent terms.", "counters": ["Lower rent"]}"#),
        );
        let store = Arc::new(InMemoryStore::new());
        let analyzer = analyzer(llm.clone(), store);

        let explanations = analyzer
            .process_contract("Rent is $1,000 per month. A deposit of $2,000.")
            .await
            .unwrap();
        let clauses: Vec<&str> = explanations.iter().map(|e| e.clause.as_str()).collect();
        assert_eq!(clauses, vec!["Deposit", "Rent"]);
        assert_eq!(llm.call_count(), 3);

        let summary = analyzer.categories().unwrap();
        assert_eq!(
            summary,
            vec![
                CategorySummary { name: "Deposit".into(), segments: 1 },
                CategorySummary { name: "Rent".into(), segments: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn blank_contract_is_invalid_input() {
        let llm = Arc::new(MockLanguageModel::new());
        let err = analyzer(llm.clone(), Arc::new(InMemoryStore::new()))
            .process_contract("  \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidInput(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn question_before_processing_gets_advisory() {
        let llm = Arc::new(MockLanguageModel::new());
        let answer = analyzer(llm.clone(), Arc::new(InMemoryStore::new()))
            .answer_question("When is rent due?")
            .await
            .unwrap();
        assert_eq!(answer, NO_MATCH_ANSWER);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn email_uses_configured_temperature() {
        let llm = Arc::new(MockLanguageModel::new().with_response("Dear [Recipient]"));
        let config = AnalyzerConfig {
            email_temperature: 0.7,
            ..AnalyzerConfig::default()
        };
        let analyzer = analyzer(llm.clone(), Arc::new(InMemoryStore::new())).with_config(config);

        analyzer.draft_negotiation_email("Rent: $1,000", "", "").await.unwrap();
        assert!((llm.requests()[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn summaries_need_only_the_store() {
        let store = InMemoryStore::new();
        let contract = ContractId::from_string("lease");
        store.upsert_category(&contract, "Rent").unwrap();
        store.upsert_category(&contract, "Deposit").unwrap();
        store.create_segment(&contract, "Rent", "Rent is $1,000.", vec![1.0]).unwrap();

        let summaries = category_summaries(&store, &contract).unwrap();
        assert_eq!(
            summaries,
            vec![
                CategorySummary { name: "Deposit".into(), segments: 0 },
                CategorySummary { name: "Rent".into(), segments: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn clear_empties_the_partition() {
        let store = Arc::new(InMemoryStore::new());
        let contract = ContractId::from_string("lease");
        store.upsert_category(&contract, "Rent").unwrap();
        let analyzer = analyzer(Arc::new(MockLanguageModel::new()), store.clone());

        assert!(analyzer.clear().unwrap());
        assert_eq!(store.category_count(&contract).unwrap(), 0);
    }
}
