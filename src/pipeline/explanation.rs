//! Per-category clause explanation

use super::decode::decode_explanation;
use super::prompts;
use crate::error::AnalyzerResult;
use crate::graph::{join_segment_text, ClauseExplanation, ContractExplanation, ContractId};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::storage::CategoryStore;
use std::sync::Arc;
use tracing::debug;

/// Counters kept per explanation; extras are dropped.
pub const MAX_COUNTERS: usize = 3;

/// Produces one explanation per category, in name order, with exactly one
/// model call per category.
pub struct ExplanationSynthesizer {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn CategoryStore>,
    temperature: f32,
}

impl ExplanationSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn CategoryStore>) -> Self {
        Self {
            llm,
            store,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Explain every category of the contract.
    pub async fn explain_all(&self, contract: &ContractId) -> AnalyzerResult<Vec<ContractExplanation>> {
        let names = self.store.list_category_names(contract)?;
        let mut explanations = Vec::with_capacity(names.len());
        for name in names {
            if let Some(explanation) = self.explain_category(contract, &name).await? {
                explanations.push(ContractExplanation {
                    clause: name,
                    explanation,
                });
            }
        }
        Ok(explanations)
    }

    /// Explain one category; `None` if it has no segments.
    pub async fn explain_category(
        &self,
        contract: &ContractId,
        category: &str,
    ) -> AnalyzerResult<Option<ClauseExplanation>> {
        let segments = self.store.list_segments_for_category(contract, category)?;
        if segments.is_empty() {
            debug!(category = %category, "category has no segments, nothing to explain");
            return Ok(None);
        }

        let text = join_segment_text(&segments);
        let request = CompletionRequest::new(
            prompts::explanation(category, &text),
            prompts::EXPLANATION_REQUEST,
            self.temperature,
        )
        .expecting_json();
        let response = self.llm.complete(&request).await?;

        let mut explanation = decode_explanation(&response)?;
        if explanation.counters.len() > MAX_COUNTERS {
            debug!(
                category = %category,
                returned = explanation.counters.len(),
                "truncating counters"
            );
            explanation.counters.truncate(MAX_COUNTERS);
        }
        Ok(Some(explanation))
    }
}
