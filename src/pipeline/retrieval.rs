//! Retrieval QA: nearest segment, expanded to its whole category

use super::prompts;
use crate::embedding::Embedder;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::graph::{join_segment_text, ContractId, ScoredSegment, TextSegment};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::storage::CategoryStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Returned when the store has nothing similar to the question.
pub const NO_MATCH_ANSWER: &str = "I couldn't find specific information about this in the contract. Please try rephrasing your question or ask about a different aspect of the contract.";

/// Outcome of the retrieval step.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// Nothing stored is similar to the question
    NoMatch,
    /// The best match and every segment of its category, in storage order
    Context {
        category: String,
        matched: ScoredSegment,
        segments: Vec<TextSegment>,
    },
}

pub struct RetrievalEngine {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CategoryStore>,
    temperature: f32,
}

impl RetrievalEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CategoryStore>,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Find the top-1 segment and expand to its category's segments.
    pub async fn retrieve(
        &self,
        contract: &ContractId,
        question: &str,
    ) -> AnalyzerResult<RetrievalOutcome> {
        if question.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput("question is empty".into()));
        }

        let query = self.embedder.embed(question).await?;
        let Some(matched) = self.store.nearest_segments(contract, &query, 1)?.into_iter().next()
        else {
            return Ok(RetrievalOutcome::NoMatch);
        };

        let Some(category) = self.store.category_of(contract, &matched.segment.id)? else {
            return Ok(RetrievalOutcome::NoMatch);
        };
        let segments = self.store.list_segments_for_category(contract, &category)?;
        if segments.is_empty() {
            return Ok(RetrievalOutcome::NoMatch);
        }

        debug!(
            category = %category,
            score = matched.score,
            expanded = segments.len(),
            "retrieved context"
        );
        Ok(RetrievalOutcome::Context {
            category,
            matched,
            segments,
        })
    }

    /// Answer from retrieved context, or the fixed advisory when nothing matches.
    pub async fn answer(&self, contract: &ContractId, question: &str) -> AnalyzerResult<String> {
        let segments = match self.retrieve(contract, question).await? {
            RetrievalOutcome::NoMatch => {
                info!(contract = %contract, "no similar segment for question");
                return Ok(NO_MATCH_ANSWER.to_string());
            }
            RetrievalOutcome::Context { segments, .. } => segments,
        };

        let context = join_segment_text(&segments);
        let request = CompletionRequest::new(prompts::answer(&context), question, self.temperature);
        Ok(self.llm.complete(&request).await?)
    }
}
