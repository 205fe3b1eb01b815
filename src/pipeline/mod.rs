//! Contract analysis pipeline
//!
//! Chunking, incremental category consolidation, per-category explanation,
//! retrieval QA and negotiation email drafting. Every model interaction goes
//! through [`crate::llm::LanguageModel`]; every vector through
//! [`crate::embedding::Embedder`].

mod chunker;
mod consolidation;
mod decode;
mod explanation;
mod negotiation;
pub mod prompts;
mod retrieval;

pub use chunker::{chunk_text, DEFAULT_CHUNK_SIZE};
pub use consolidation::{ChunkReport, ChunkState, ConsolidationEngine};
pub use decode::{decode_explanation, decode_extraction, ExtractedPair, ModelParseError};
pub use explanation::{ExplanationSynthesizer, MAX_COUNTERS};
pub use negotiation::{draft_negotiation_email, ClauseDecision, NegotiationBrief};
pub use retrieval::{RetrievalEngine, RetrievalOutcome, NO_MATCH_ANSWER};
