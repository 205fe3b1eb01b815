//! Errors surfaced by the public analyzer operations

use crate::embedding::EmbeddingError;
use crate::llm::LlmError;
use crate::pipeline::ModelParseError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that abort `process_contract`, `answer_question` or
/// `draft_negotiation_email`.
///
/// "No relevant content" is not an error: `answer_question` returns a fixed
/// advisory string instead.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model output could not be parsed: {0}")]
    ModelParse(#[from] ModelParseError),

    #[error("Store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Language model error: {0}")]
    Model(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Category cap of {max} reached and no existing category to consolidate '{proposed}' into")]
    CategoryCap { proposed: String, max: usize },
}

/// Result type for analyzer operations
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
