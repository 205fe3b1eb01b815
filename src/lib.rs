//! Clausegraph: Contract Knowledge Graph Pipeline
//!
//! Turns an unstructured legal contract into a small, consolidated set of
//! clause categories, explains each one in plain language, and answers
//! questions grounded in the contract's own text.
//!
//! # Core Concepts
//!
//! - **Categories**: Clause types (e.g. "Compensation"), capped per contract
//! - **Segments**: Verbatim contract excerpts with an embedding, each
//!   BELONGS_TO exactly one category
//! - **Contracts**: Partitions of the store; nothing is shared between them
//!
//! # Example
//!
//! ```
//! use clausegraph::{CategoryStore, ContractId, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! let contract = ContractId::from_string("employment-2024");
//! assert!(store.upsert_category(&contract, "Compensation").unwrap());
//! assert_eq!(store.list_category_names(&contract).unwrap(), vec!["Compensation"]);
//! ```

pub mod analyzer;
pub mod config;
pub mod embedding;
pub mod error;
mod graph;
pub mod llm;
pub mod pipeline;
pub mod storage;

pub use analyzer::{category_summaries, CategorySummary, ContractAnalyzer};
pub use config::{AnalyzerConfig, ConfigError};
pub use embedding::{cosine_similarity, Embedder, EmbeddingError, OpenAiEmbedder};
#[cfg(feature = "embeddings")]
pub use embedding::{FastEmbedEmbedder, LOCAL_EMBEDDING_DIMENSIONS};
pub use error::{AnalyzerError, AnalyzerResult};
pub use graph::{
    join_segment_text, Category, ClauseExplanation, ContractExplanation, ContractId,
    ScoredSegment, SegmentId, TextSegment, BELONGS_TO,
};
pub use llm::{CompletionRequest, LanguageModel, LlmError, MockLanguageModel, OpenAiChatClient};
pub use pipeline::{
    ChunkReport, ClauseDecision, NegotiationBrief, RetrievalOutcome, NO_MATCH_ANSWER,
};
pub use storage::{CategoryStore, InMemoryStore, OpenStore, SqliteStore, StorageError, StorageResult};
#[cfg(feature = "embeddings")]
pub use storage::SqliteVecStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
